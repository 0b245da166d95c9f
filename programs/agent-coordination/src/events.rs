//! Events emitted by the agent coordination protocol
//!
//! Indexers subscribe to program logs and decode these to follow
//! registrations, task progress and dispute outcomes without scanning accounts.

use anchor_lang::prelude::*;

/// Emitted once when the protocol singleton is created
#[event]
pub struct ProtocolInitialized {
    pub authority: Pubkey,
    pub treasury: Pubkey,
    pub dispute_threshold: u8,
    pub protocol_fee_bps: u16,
    pub min_arbiter_stake: u64,
    pub timestamp: i64,
}

/// Emitted when a new agent registers
#[event]
pub struct AgentRegistered {
    pub agent_id: [u8; 32],
    pub authority: Pubkey,
    pub capabilities: u64,
    pub endpoint: String,
    pub timestamp: i64,
}

/// Emitted when an agent updates its registration
#[event]
pub struct AgentUpdated {
    pub agent_id: [u8; 32],
    pub capabilities: u64,
    pub status: u8,
    pub timestamp: i64,
}

/// Emitted when an agent deregisters
#[event]
pub struct AgentDeregistered {
    pub agent_id: [u8; 32],
    pub authority: Pubkey,
    pub timestamp: i64,
}

#[event]
pub struct AgentSuspended {
    pub agent_id: [u8; 32],
    pub authority: Pubkey,
    pub timestamp: i64,
}

#[event]
pub struct AgentUnsuspended {
    pub agent_id: [u8; 32],
    pub authority: Pubkey,
    pub timestamp: i64,
}

/// Emitted when a new task is created and its escrow funded
#[event]
pub struct TaskCreated {
    pub task_id: [u8; 32],
    pub creator: Pubkey,
    pub required_capabilities: u64,
    pub reward_amount: u64,
    pub max_workers: u8,
    pub task_type: u8,
    pub deadline: i64,
    pub timestamp: i64,
}

/// Emitted when an agent claims a task
#[event]
pub struct TaskClaimed {
    pub task_id: [u8; 32],
    pub worker: Pubkey,
    pub current_workers: u8,
    pub max_workers: u8,
    pub timestamp: i64,
}

/// Emitted for every recorded completion, paid or not
#[event]
pub struct TaskCompleted {
    pub task_id: [u8; 32],
    pub worker: Pubkey,
    pub proof_hash: [u8; 32],
    pub reward_paid: u64,
    pub completions: u8,
    pub required_completions: u8,
    pub timestamp: i64,
}

/// Emitted when a task is cancelled and its escrow refunded
#[event]
pub struct TaskCancelled {
    pub task_id: [u8; 32],
    pub creator: Pubkey,
    pub refund_amount: u64,
    pub released_workers: u8,
    pub timestamp: i64,
}

/// Emitted whenever escrow funds move to a worker and the treasury
#[event]
pub struct RewardDistributed {
    pub task_id: [u8; 32],
    pub recipient: Pubkey,
    pub amount: u64,
    pub protocol_fee: u64,
    pub timestamp: i64,
}

#[event]
pub struct DisputeInitiated {
    pub dispute_id: [u8; 32],
    pub task_id: [u8; 32],
    pub initiator: Pubkey,
    pub claimant: Pubkey,
    pub resolution_type: u8,
    pub voting_deadline: i64,
    pub timestamp: i64,
}

#[event]
pub struct DisputeVoteCast {
    pub dispute_id: [u8; 32],
    pub voter: Pubkey,
    pub approved: bool,
    pub votes_for: u8,
    pub votes_against: u8,
    pub timestamp: i64,
}

/// Emitted when a dispute reaches quorum and escrow is settled
#[event]
pub struct DisputeResolved {
    pub dispute_id: [u8; 32],
    /// Resolution actually applied; a rejected or tied vote applies Refund
    pub applied_resolution: u8,
    pub votes_for: u8,
    pub votes_against: u8,
    pub to_creator: u64,
    pub to_worker: u64,
    pub protocol_fee: u64,
    pub timestamp: i64,
}

#[event]
pub struct DisputeExpired {
    pub dispute_id: [u8; 32],
    pub task_id: [u8; 32],
    pub votes_for: u8,
    pub votes_against: u8,
    pub timestamp: i64,
}
