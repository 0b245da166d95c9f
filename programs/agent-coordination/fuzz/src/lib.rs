//! Property-based fuzz testing library for the agent coordination protocol
//!
//! Drives the program's own state functions through an in-memory ledger
//! and checks the protocol invariants after every step.
//!
//! # Usage
//!
//! ```bash
//! # Run all property-based tests
//! cargo test --release
//!
//! # Run the fuzz test runner
//! cargo run --release
//!
//! # Replay a runner failure, with more iterations
//! FUZZ_SEED=1234 FUZZ_ITERATIONS=5000 cargo run --release
//! ```

pub mod arbitrary;
pub mod invariants;
pub mod ledger;
pub mod scenarios;

pub use arbitrary::*;
pub use invariants::*;
pub use ledger::*;
pub use scenarios::*;

// Include fuzz targets as test modules
#[cfg(test)]
#[path = "../fuzz_targets/claim_task.rs"]
mod claim_task_tests;

#[cfg(test)]
#[path = "../fuzz_targets/complete_task.rs"]
mod complete_task_tests;

#[cfg(test)]
#[path = "../fuzz_targets/task_lifecycle.rs"]
mod task_lifecycle_tests;

#[cfg(test)]
#[path = "../fuzz_targets/vote_dispute.rs"]
mod vote_dispute_tests;

#[cfg(test)]
#[path = "../fuzz_targets/dispute_lifecycle.rs"]
mod dispute_lifecycle_tests;
