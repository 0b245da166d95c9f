//! Shared validation helpers for instruction handlers

use crate::errors::CoordinationError;
use crate::instructions::constants::{MAX_ENDPOINT_LEN, MAX_METADATA_URI_LEN};
use crate::state::capability;
use crate::utils::validation::{fits_max_len, validate_string_input};
use anchor_lang::prelude::*;

/// Validates an agent endpoint URL.
///
/// - Must be non-empty
/// - Must start with "http://" or "https://"
/// - Printable ASCII only, at most 128 bytes
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    require!(!endpoint.is_empty(), CoordinationError::InvalidEndpoint);
    require!(
        endpoint.starts_with("http://") || endpoint.starts_with("https://"),
        CoordinationError::InvalidEndpoint
    );
    require!(
        validate_string_input(endpoint),
        CoordinationError::InvalidEndpoint
    );
    require!(
        fits_max_len(endpoint, MAX_ENDPOINT_LEN),
        CoordinationError::StringTooLong
    );
    Ok(())
}

/// Metadata URIs are optional; an empty string clears the field.
pub fn validate_metadata_uri(uri: &str) -> Result<()> {
    require!(
        fits_max_len(uri, MAX_METADATA_URI_LEN),
        CoordinationError::StringTooLong
    );
    require!(validate_string_input(uri), CoordinationError::InvalidInput);
    Ok(())
}

/// Agent capability sets must be non-empty and only use defined flags.
pub fn validate_capabilities(capabilities: u64) -> Result<()> {
    require!(
        capabilities != 0 && capability::is_defined(capabilities),
        CoordinationError::InvalidCapabilities
    );
    Ok(())
}
