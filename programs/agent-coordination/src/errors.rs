//! Error codes for the agent coordination protocol
//!
//! Codes are assigned in declaration order starting at 6000, so variants are
//! only ever appended.

use anchor_lang::error::Error;
use anchor_lang::prelude::*;

#[error_code]
pub enum CoordinationError {
    // Agent errors
    #[msg("Agent is already registered")]
    AlreadyRegistered,

    #[msg("Agent not found")]
    AgentNotFound,

    #[msg("Agent is not active")]
    AgentNotActive,

    #[msg("Agent id must match the registering authority")]
    InvalidAgentId,

    #[msg("Capabilities must be non-zero and use only defined bits")]
    InvalidCapabilities,

    #[msg("Endpoint must be a non-empty http(s) URL")]
    InvalidEndpoint,

    #[msg("Agent has active tasks and cannot be deregistered")]
    ActiveTasksRemaining,

    #[msg("Agent has reached maximum active tasks")]
    MaxActiveTasksReached,

    #[msg("Agent is suspended")]
    AgentSuspended,

    #[msg("Agent is not suspended")]
    AgentNotSuspended,

    #[msg("Signer is not authorized for this action")]
    Unauthorized,

    // Task errors
    #[msg("Task not found")]
    TaskNotFound,

    #[msg("Task id cannot be all zeroes")]
    InvalidTaskId,

    #[msg("Reward must be greater than zero")]
    InvalidReward,

    #[msg("Deadline must be zero or in the future")]
    InvalidDeadline,

    #[msg("Invalid max workers for task type")]
    InvalidMaxWorkers,

    #[msg("Invalid task type")]
    InvalidTaskType,

    #[msg("Agent lacks a required capability")]
    CapabilityMismatch,

    #[msg("Task has reached maximum workers")]
    TaskFull,

    #[msg("Task is not open for claims")]
    TaskNotClaimable,

    #[msg("Task has expired")]
    TaskExpired,

    #[msg("Task is not in progress")]
    TaskNotInProgress,

    #[msg("Task cannot be cancelled in its current state")]
    TaskNotCancellable,

    #[msg("Invalid task status transition")]
    InvalidStatusTransition,

    // Claim errors
    #[msg("Worker has already claimed this task")]
    AlreadyClaimed,

    #[msg("Worker has not claimed this task")]
    NotClaimed,

    #[msg("Claim is already completed")]
    AlreadyCompleted,

    #[msg("Claim accounts do not match the task's open claims")]
    InvalidClaimAccounts,

    // Escrow errors
    #[msg("Escrow holds less than the requested payout")]
    InsufficientEscrowBalance,

    #[msg("Escrow is closed")]
    EscrowClosed,

    #[msg("Insufficient funds")]
    InsufficientFunds,

    #[msg("Treasury does not match protocol config")]
    InvalidTreasury,

    #[msg("Creator does not match task")]
    InvalidCreator,

    // Dispute errors
    #[msg("Dispute not found")]
    DisputeNotFound,

    #[msg("Dispute is not active")]
    DisputeNotActive,

    #[msg("Signer is not a participant of this task")]
    NotTaskParticipant,

    #[msg("Voting period has ended")]
    VotingEnded,

    #[msg("Voting period has not ended")]
    VotingNotEnded,

    #[msg("Agent lacks the verification capability")]
    NotArbiter,

    #[msg("Arbiter has already voted on this dispute")]
    AlreadyVoted,

    #[msg("Arbiter stake is below the protocol minimum")]
    InsufficientStake,

    #[msg("Dispute participants cannot vote on their own dispute")]
    ArbiterIsDisputeParticipant,

    #[msg("Invalid resolution type")]
    InvalidResolutionType,

    #[msg("Dispute already reached quorum")]
    DisputeQuorumReached,

    // Protocol errors
    #[msg("Protocol fee exceeds maximum")]
    InvalidProtocolFee,

    #[msg("Dispute threshold must be at least one vote")]
    InvalidDisputeThreshold,

    #[msg("String exceeds maximum length")]
    StringTooLong,

    #[msg("Invalid input parameter")]
    InvalidInput,

    #[msg("Account is not owned by this program")]
    InvalidAccountOwner,

    #[msg("Arithmetic overflow")]
    ArithmeticOverflow,

    #[msg("Address already holds a record")]
    AddressInUse,
}

/// Returns true when `err` carries the given protocol error code.
pub fn error_matches(err: &Error, expected: CoordinationError) -> bool {
    match err {
        Error::AnchorError(e) => e.error_code_number == u32::from(expected),
        _ => false,
    }
}
