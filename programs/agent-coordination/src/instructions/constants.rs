//! Shared constants for instruction handlers

/// Divisor for basis points calculations (100% = 10000 bps)
pub const BASIS_POINTS_DIVISOR: u64 = 10000;

/// Maximum protocol fee in basis points (10% = 1000 bps)
pub const MAX_PROTOCOL_FEE_BPS: u16 = 1000;

/// Reputation every agent starts with
pub const INITIAL_REPUTATION: u16 = 100;

/// Reputation points awarded per paid task completion
pub const REPUTATION_PER_COMPLETION: u16 = 100;

/// Maximum reputation an agent can accumulate
pub const MAX_REPUTATION: u16 = 10000;

/// Maximum open claims a single agent may hold
pub const MAX_ACTIVE_TASKS: u8 = 10;

/// Dispute voting window in seconds (24 hours)
pub const DISPUTE_VOTING_PERIOD: i64 = 24 * 60 * 60;

/// Maximum endpoint length in bytes
pub const MAX_ENDPOINT_LEN: usize = 128;

/// Maximum metadata URI length in bytes
pub const MAX_METADATA_URI_LEN: usize = 128;
