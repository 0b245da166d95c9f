//! Account state structures for the agent coordination protocol
//!
//! Field order of every `#[account]` struct is part of the wire format.
//! Clients filter records with byte-offset comparisons (see
//! [`TaskClaim::WORKER_OFFSET`]), so new fields are only ever appended.

use anchor_lang::prelude::*;

use crate::errors::CoordinationError;

/// Agent capability flags (bitmask).
///
/// Capabilities are represented as a 64-bit bitmask where each bit indicates
/// a specific capability the agent possesses. Tasks specify required capabilities
/// and only agents holding every required bit can claim them.
///
/// | Bit | Constant       | Description                                 |
/// |-----|----------------|---------------------------------------------|
/// |  0  | `COMPUTE`      | General computation tasks                   |
/// |  1  | `INFERENCE`    | Machine learning inference                  |
/// |  2  | `STORAGE`      | Data storage and retrieval                  |
/// |  3  | `VERIFICATION` | Result verification, dispute voting rights  |
///
/// Bits 4-63 are undefined and rejected at registration.
///
/// ```ignore
/// use agent_coordination::state::capability;
///
/// let ml_agent = capability::COMPUTE | capability::INFERENCE;
/// assert!(capability::has_all(ml_agent, capability::COMPUTE));
/// assert!(!capability::has_all(ml_agent, capability::COMPUTE | capability::STORAGE));
/// ```
pub mod capability {
    /// General computation tasks
    pub const COMPUTE: u64 = 1 << 0;
    /// Machine learning inference
    pub const INFERENCE: u64 = 1 << 1;
    /// Data storage and retrieval
    pub const STORAGE: u64 = 1 << 2;
    /// Result verification; required to vote on disputes
    pub const VERIFICATION: u64 = 1 << 3;

    /// Bitmask covering all defined capabilities (bits 0-3)
    pub const ALL_DEFINED: u64 = (1 << 4) - 1;

    const NAMED: [(u64, &str); 4] = [
        (COMPUTE, "COMPUTE"),
        (INFERENCE, "INFERENCE"),
        (STORAGE, "STORAGE"),
        (VERIFICATION, "VERIFICATION"),
    ];

    /// Superset check: `agent` must hold every bit in `required`.
    /// Overlap alone is not enough.
    #[inline]
    pub fn has_all(agent: u64, required: u64) -> bool {
        agent & required == required
    }

    /// True when `mask` only uses defined bits.
    #[inline]
    pub fn is_defined(mask: u64) -> bool {
        mask & !ALL_DEFINED == 0
    }

    /// Names of the defined flags set in `mask`, lowest bit first.
    pub fn names(mask: u64) -> Vec<&'static str> {
        NAMED
            .iter()
            .filter(|(bit, _)| mask & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

/// Agent status
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Default, InitSpace,
)]
#[repr(u8)]
pub enum AgentStatus {
    #[default]
    Inactive = 0,
    Active = 1,
    Busy = 2,
    Suspended = 3,
}

/// Task status
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Default, InitSpace,
)]
#[repr(u8)]
pub enum TaskStatus {
    #[default]
    Open = 0,
    InProgress = 1,
    PendingValidation = 2,
    Completed = 3,
    Cancelled = 4,
    Disputed = 5,
}

impl TaskStatus {
    /// Validates whether a status transition is allowed.
    ///
    /// Valid transitions:
    /// - Open → InProgress (last free slot claimed)
    /// - Open → Completed (competitive or collaborative work finished before every slot filled)
    /// - Open → Cancelled (creator cancels)
    /// - InProgress → Completed | Cancelled | Disputed | PendingValidation
    /// - PendingValidation → Completed | Disputed
    /// - Disputed → Completed (dispute resolved as Complete)
    /// - Disputed → Cancelled (dispute resolved as Refund or Split)
    /// - Disputed → InProgress (dispute expired without quorum)
    ///
    /// Terminal states (Completed, Cancelled) cannot transition to any other state.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, new_status),
            // From Open
            (Open, InProgress) | (Open, Completed) | (Open, Cancelled) |
            // From InProgress
            (InProgress, Completed) | (InProgress, Cancelled) |
            (InProgress, Disputed) | (InProgress, PendingValidation) |
            // From PendingValidation
            (PendingValidation, Completed) | (PendingValidation, Disputed) |
            // From Disputed
            (Disputed, Completed) | (Disputed, Cancelled) | (Disputed, InProgress)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

/// Task type enumeration
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Default, InitSpace,
)]
#[repr(u8)]
pub enum TaskType {
    /// Single worker, full reward
    #[default]
    Exclusive = 0,
    /// Multiple workers, reward split equally
    Collaborative = 1,
    /// Multiple claimants, first completer takes the reward
    Competitive = 2,
}

impl TryFrom<u8> for TaskType {
    type Error = anchor_lang::error::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(TaskType::Exclusive),
            1 => Ok(TaskType::Collaborative),
            2 => Ok(TaskType::Competitive),
            _ => err!(CoordinationError::InvalidTaskType),
        }
    }
}

/// Dispute status
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Default, InitSpace,
)]
#[repr(u8)]
pub enum DisputeStatus {
    #[default]
    Active = 0,
    Resolved = 1,
    Expired = 2,
}

/// Outcome requested by a dispute initiator
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Default, InitSpace,
)]
#[repr(u8)]
pub enum ResolutionType {
    /// Return the escrow remainder to the creator
    #[default]
    Refund = 0,
    /// Pay the claimant as a normal completion
    Complete = 1,
    /// Halve the escrow remainder between claimant and creator
    Split = 2,
}

impl TryFrom<u8> for ResolutionType {
    type Error = anchor_lang::error::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ResolutionType::Refund),
            1 => Ok(ResolutionType::Complete),
            2 => Ok(ResolutionType::Split),
            _ => err!(CoordinationError::InvalidResolutionType),
        }
    }
}

/// Protocol configuration account
/// PDA seeds: ["protocol"]
#[account]
#[derive(InitSpace, Default)]
pub struct ProtocolConfig {
    /// Protocol authority; the only signer allowed to suspend agents
    pub authority: Pubkey,
    /// Treasury address for protocol fees
    pub treasury: Pubkey,
    /// Number of arbiter votes that settles a dispute
    pub dispute_threshold: u8,
    /// Protocol fee in basis points (1/100th of a percent)
    pub protocol_fee_bps: u16,
    /// Minimum stake required to vote on disputes
    pub min_arbiter_stake: u64,
    /// Total registered agents (monotonic)
    pub total_agents: u64,
    /// Total tasks created
    pub total_tasks: u64,
    /// Total tasks completed
    pub completed_tasks: u64,
    /// Total value distributed to workers and treasury (lamports)
    pub total_value_distributed: u64,
    /// Bump seed for PDA
    pub bump: u8,
    /// Total disputes initiated
    pub total_disputes: u64,
}

impl ProtocolConfig {
    pub const SIZE: usize = 8 + // discriminator
        32 + // authority
        32 + // treasury
        1 +  // dispute_threshold
        2 +  // protocol_fee_bps
        8 +  // min_arbiter_stake
        8 +  // total_agents
        8 +  // total_tasks
        8 +  // completed_tasks
        8 +  // total_value_distributed
        1 +  // bump
        8; // total_disputes
}

/// Agent registration account
/// PDA seeds: ["agent", agent_id]
#[account]
#[derive(InitSpace, Default)]
pub struct AgentRegistration {
    /// Agent identifier; the owning authority's public key bytes
    pub agent_id: [u8; 32],
    /// Agent's signing authority
    pub authority: Pubkey,
    /// Agent capabilities as a bitmask. See [`capability`].
    ///
    /// Agents can only claim tasks where they have all required capabilities:
    /// `(agent.capabilities & task.required_capabilities) == task.required_capabilities`
    pub capabilities: u64,
    /// Agent status
    pub status: AgentStatus,
    /// Network endpoint (max 128 chars)
    #[max_len(128)]
    pub endpoint: String,
    /// Extended metadata URI (max 128 chars)
    #[max_len(128)]
    pub metadata_uri: String,
    /// Registration timestamp
    pub registered_at: i64,
    /// Last activity timestamp
    pub last_active: i64,
    /// Total tasks completed
    pub tasks_completed: u64,
    /// Total rewards earned
    pub total_earned: u64,
    /// Agent reputation score (0-10000), starts at 100
    pub reputation: u16,
    /// Open claims held by this agent
    pub active_tasks: u8,
    /// One of the open claims is on an Exclusive task. Survives suspension
    /// so unsuspending can restore Busy.
    pub holds_exclusive: bool,
    /// Reserved stake amount. Not funded by any instruction yet.
    pub stake: u64,
    /// Bump seed
    pub bump: u8,
}

impl AgentRegistration {
    pub const SIZE: usize = 8 + // discriminator
        32 + // agent_id
        32 + // authority
        8 +  // capabilities
        1 +  // status
        4 + 128 + // endpoint (string)
        4 + 128 + // metadata_uri (string)
        8 +  // registered_at
        8 +  // last_active
        8 +  // tasks_completed
        8 +  // total_earned
        2 +  // reputation
        1 +  // active_tasks
        1 +  // holds_exclusive
        8 +  // stake
        1; // bump

    /// True once the record has been written by registration.
    pub fn is_registered(&self) -> bool {
        self.authority != Pubkey::default()
    }
}

/// Task account
/// PDA seeds: ["task", creator, task_id]
#[account]
#[derive(InitSpace)]
pub struct Task {
    /// Unique task identifier
    pub task_id: [u8; 32],
    /// Task creator (paying party)
    pub creator: Pubkey,
    /// Required capabilities bitmask
    pub required_capabilities: u64,
    /// Task description or instruction hash
    pub description: [u8; 64],
    /// Reward amount in lamports
    pub reward_amount: u64,
    /// Maximum workers allowed
    pub max_workers: u8,
    /// Claims recorded so far; never decremented
    pub current_workers: u8,
    /// Task status
    pub status: TaskStatus,
    /// Task type
    pub task_type: TaskType,
    /// Creation timestamp
    pub created_at: i64,
    /// Deadline timestamp (0 = no deadline)
    pub deadline: i64,
    /// Completion timestamp
    pub completed_at: i64,
    /// Escrow account for reward
    pub escrow: Pubkey,
    /// Result data of the final completion
    pub result: [u8; 64],
    /// Number of completions recorded
    pub completions: u8,
    /// Required completions for task completion
    pub required_completions: u8,
    /// Bump seed
    pub bump: u8,
    /// Protocol fee in basis points, locked at creation
    pub protocol_fee_bps: u16,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            task_id: [0u8; 32],
            creator: Pubkey::default(),
            required_capabilities: 0,
            description: [0u8; 64],
            reward_amount: 0,
            max_workers: 1,
            current_workers: 0,
            status: TaskStatus::default(),
            task_type: TaskType::default(),
            created_at: 0,
            deadline: 0,
            completed_at: 0,
            escrow: Pubkey::default(),
            result: [0u8; 64],
            completions: 0,
            required_completions: 1,
            bump: 0,
            protocol_fee_bps: 0,
        }
    }
}

impl Task {
    pub const SIZE: usize = 8 + // discriminator
        32 + // task_id
        32 + // creator
        8 +  // required_capabilities
        64 + // description
        8 +  // reward_amount
        1 +  // max_workers
        1 +  // current_workers
        1 +  // status
        1 +  // task_type
        8 +  // created_at
        8 +  // deadline
        8 +  // completed_at
        32 + // escrow
        64 + // result
        1 +  // completions
        1 +  // required_completions
        1 +  // bump
        2; // protocol_fee_bps

    /// A deadline of 0 never expires. Otherwise the task is expired strictly
    /// after the deadline timestamp.
    pub fn is_expired(&self, now: i64) -> bool {
        self.deadline != 0 && now > self.deadline
    }

    pub fn has_free_slot(&self) -> bool {
        self.current_workers < self.max_workers
    }
}

/// Task escrow account
/// PDA seeds: ["escrow", task]
#[account]
#[derive(InitSpace, Default)]
pub struct TaskEscrow {
    /// Task this escrow belongs to
    pub task: Pubkey,
    /// Total amount deposited
    pub amount: u64,
    /// Amount paid out so far
    pub distributed: u64,
    /// Set once the escrow has been fully settled
    pub is_closed: bool,
    /// Bump seed
    pub bump: u8,
}

impl TaskEscrow {
    pub const SIZE: usize = 8 + // discriminator
        32 + // task
        8 +  // amount
        8 +  // distributed
        1 +  // is_closed
        1; // bump

    /// Lamports still owed to someone.
    pub fn remaining(&self) -> Result<u64> {
        self.amount
            .checked_sub(self.distributed)
            .ok_or_else(|| error!(CoordinationError::InsufficientEscrowBalance))
    }
}

/// Worker's claim on a task
/// PDA seeds: ["claim", task, worker_agent]
#[account]
#[derive(InitSpace, Debug)]
pub struct TaskClaim {
    /// Task being claimed
    pub task: Pubkey,
    /// Worker agent address
    pub worker: Pubkey,
    /// Claim timestamp
    pub claimed_at: i64,
    /// Completion timestamp
    pub completed_at: i64,
    /// Proof of work hash
    pub proof_hash: [u8; 32],
    /// Result data
    pub result_data: [u8; 64],
    /// Whether the claim has been completed
    pub is_completed: bool,
    /// Whether the completion was paid
    pub is_validated: bool,
    /// Reward paid to this worker
    pub reward_paid: u64,
    /// Bump seed
    pub bump: u8,
}

impl Default for TaskClaim {
    fn default() -> Self {
        Self {
            task: Pubkey::default(),
            worker: Pubkey::default(),
            claimed_at: 0,
            completed_at: 0,
            proof_hash: [0u8; 32],
            result_data: [0u8; 64],
            is_completed: false,
            is_validated: false,
            reward_paid: 0,
            bump: 0,
        }
    }
}

impl TaskClaim {
    pub const SIZE: usize = 8 + // discriminator
        32 + // task
        32 + // worker
        8 +  // claimed_at
        8 +  // completed_at
        32 + // proof_hash
        64 + // result_data
        1 +  // is_completed
        1 +  // is_validated
        8 +  // reward_paid
        1; // bump

    /// Byte offset of `task` within the serialized account (after discriminator)
    pub const TASK_OFFSET: usize = 8;
    /// Byte offset of `worker` within the serialized account
    pub const WORKER_OFFSET: usize = 8 + 32;

    /// True once the record has been written by a claim.
    pub fn is_initialized(&self) -> bool {
        self.task != Pubkey::default()
    }
}

/// Dispute account
/// PDA seeds: ["dispute", dispute_id]
#[account]
#[derive(InitSpace, Default, Debug)]
pub struct Dispute {
    /// Dispute identifier
    pub dispute_id: [u8; 32],
    /// Related task
    pub task: Pubkey,
    /// Signer that opened the dispute
    pub initiator: Pubkey,
    /// Evidence hash
    pub evidence_hash: [u8; 32],
    /// Proposed resolution type
    pub resolution_type: ResolutionType,
    /// Dispute status
    pub status: DisputeStatus,
    /// Creation timestamp
    pub created_at: i64,
    /// Resolution timestamp
    pub resolved_at: i64,
    /// Votes for approval
    pub votes_for: u8,
    /// Votes against
    pub votes_against: u8,
    /// Total arbiters who voted
    pub total_voters: u8,
    /// Voting deadline
    pub voting_deadline: i64,
    /// Bump seed
    pub bump: u8,
    /// Worker agent whose claim is disputed
    pub claimant: Pubkey,
}

impl Dispute {
    pub const SIZE: usize = 8 + // discriminator
        32 + // dispute_id
        32 + // task
        32 + // initiator
        32 + // evidence_hash
        1 +  // resolution_type
        1 +  // status
        8 +  // created_at
        8 +  // resolved_at
        1 +  // votes_for
        1 +  // votes_against
        1 +  // total_voters
        8 +  // voting_deadline
        1 +  // bump
        32; // claimant

    /// Strict majority; a tie does not approve.
    pub fn is_approved(&self) -> bool {
        self.votes_for > self.votes_against
    }
}

/// Vote on a dispute
/// PDA seeds: ["vote", dispute, arbiter_agent]
#[account]
#[derive(InitSpace, Default, Debug)]
pub struct DisputeVote {
    /// Dispute being voted on
    pub dispute: Pubkey,
    /// Arbiter agent address
    pub voter: Pubkey,
    /// Vote (true = approve resolution)
    pub approved: bool,
    /// Vote timestamp
    pub voted_at: i64,
    /// Bump seed
    pub bump: u8,
}

impl DisputeVote {
    pub const SIZE: usize = 8 + // discriminator
        32 + // dispute
        32 + // voter
        1 +  // approved
        8 +  // voted_at
        1; // bump

    pub fn is_initialized(&self) -> bool {
        self.dispute != Pubkey::default()
    }
}
