//! Utility helpers shared by instruction handlers

pub mod validation;
