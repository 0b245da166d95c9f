#![allow(unexpected_cfgs)]
//! Agent Coordination Protocol
//!
//! On-ledger coordination between autonomous worker agents and task
//! creators. Agents register capabilities, creators post escrow-funded
//! tasks, agents claim and complete them for payment, and disputes are
//! settled by capability-gated arbiter voting.

use anchor_lang::prelude::*;

declare_id!("EopUaCV2svxj9j4hd7KjbrWfdjkspmm2BCBe7jGpKzKZ");

pub mod errors;
pub mod events;
pub mod instructions;
pub mod pda;
pub mod state;
pub mod utils;

use instructions::*;

#[program]
pub mod agent_coordination {
    use super::*;

    /// Initialize the protocol configuration.
    /// Called once; the signer becomes the protocol authority.
    ///
    /// # Arguments
    /// * `dispute_threshold` - Votes needed before a dispute settles (at least 1)
    /// * `protocol_fee_bps` - Fee taken from each reward, at most 1000 bps
    /// * `min_arbiter_stake` - Stake an arbiter must hold to vote
    pub fn initialize_protocol(
        ctx: Context<InitializeProtocol>,
        dispute_threshold: u8,
        protocol_fee_bps: u16,
        min_arbiter_stake: u64,
    ) -> Result<()> {
        instructions::initialize_protocol::handler(
            ctx,
            dispute_threshold,
            protocol_fee_bps,
            min_arbiter_stake,
        )
    }

    /// Register a new agent on-chain with its capabilities and metadata.
    /// Creates a unique PDA for the agent that serves as its on-chain identity.
    ///
    /// # Arguments
    /// * `ctx` - Context containing agent account and signer
    /// * `agent_id` - The signer's public key bytes
    /// * `capabilities` - Bitmask of agent capabilities (see `state::capability`)
    /// * `endpoint` - Network endpoint for off-chain communication
    /// * `metadata_uri` - Optional URI to extended metadata (IPFS/Arweave)
    pub fn register_agent(
        ctx: Context<RegisterAgent>,
        agent_id: [u8; 32],
        capabilities: u64,
        endpoint: String,
        metadata_uri: Option<String>,
    ) -> Result<()> {
        instructions::register_agent::handler(ctx, agent_id, capabilities, endpoint, metadata_uri)
    }

    /// Update an existing agent's registration data.
    /// Only the agent's authority can modify its registration; status is not editable.
    pub fn update_agent(
        ctx: Context<UpdateAgent>,
        capabilities: Option<u64>,
        endpoint: Option<String>,
        metadata_uri: Option<String>,
    ) -> Result<()> {
        instructions::update_agent::handler(ctx, capabilities, endpoint, metadata_uri)
    }

    /// Deregister an agent and reclaim rent.
    /// Agent must have no active tasks.
    pub fn deregister_agent(ctx: Context<DeregisterAgent>) -> Result<()> {
        instructions::deregister_agent::handler(ctx)
    }

    /// Suspend an agent (protocol authority only).
    pub fn suspend_agent(ctx: Context<SuspendAgent>) -> Result<()> {
        instructions::suspend_agent::handler(ctx)
    }

    /// Lift an agent's suspension (protocol authority only).
    pub fn unsuspend_agent(ctx: Context<UnsuspendAgent>) -> Result<()> {
        instructions::unsuspend_agent::handler(ctx)
    }

    /// Create a new task and fund its escrow with the full reward.
    /// Tasks are stored in a PDA derived from the creator and task ID.
    ///
    /// # Arguments
    /// * `ctx` - Context with task, escrow and creator
    /// * `task_id` - Unique identifier for the task
    /// * `required_capabilities` - Bitmask of required agent capabilities
    /// * `description` - Task description or instruction hash
    /// * `reward_amount` - Lamports locked in escrow
    /// * `max_workers` - Maximum number of agents that can work on this task
    /// * `deadline` - Unix timestamp deadline (0 = no deadline)
    /// * `task_type` - 0=exclusive, 1=collaborative, 2=competitive
    #[allow(clippy::too_many_arguments)]
    pub fn create_task(
        ctx: Context<CreateTask>,
        task_id: [u8; 32],
        required_capabilities: u64,
        description: [u8; 64],
        reward_amount: u64,
        max_workers: u8,
        deadline: i64,
        task_type: u8,
    ) -> Result<()> {
        instructions::create_task::handler(
            ctx,
            task_id,
            required_capabilities,
            description,
            reward_amount,
            max_workers,
            deadline,
            task_type,
        )
    }

    /// Claim a task to signal intent to work on it.
    /// Agent must have required capabilities and task must be claimable.
    pub fn claim_task(ctx: Context<ClaimTask>) -> Result<()> {
        instructions::claim_task::handler(ctx)
    }

    /// Submit proof of work and collect this worker's share.
    /// For collaborative tasks, multiple completions may be needed.
    ///
    /// # Arguments
    /// * `ctx` - Context with task, worker claim, and reward accounts
    /// * `proof_hash` - 32-byte hash of the proof of work
    /// * `result_data` - Optional result data or pointer
    pub fn complete_task(
        ctx: Context<CompleteTask>,
        proof_hash: [u8; 32],
        result_data: Option<[u8; 64]>,
    ) -> Result<()> {
        instructions::complete_task::handler(ctx, proof_hash, result_data)
    }

    /// Cancel an unclaimed or expired task and refund the escrow remainder.
    /// Pass every claim on the task as `(claim, worker_agent)` remaining accounts.
    pub fn cancel_task(ctx: Context<CancelTask>) -> Result<()> {
        instructions::cancel_task::handler(ctx)
    }

    /// Open a dispute over a worker's claim on an in-progress task.
    ///
    /// # Arguments
    /// * `ctx` - Context with dispute, task and the disputed claim
    /// * `dispute_id` - Unique identifier for the dispute
    /// * `evidence_hash` - Hash of evidence supporting the dispute
    /// * `resolution_type` - 0=refund, 1=complete, 2=split
    pub fn initiate_dispute(
        ctx: Context<InitiateDispute>,
        dispute_id: [u8; 32],
        evidence_hash: [u8; 32],
        resolution_type: u8,
    ) -> Result<()> {
        instructions::initiate_dispute::handler(ctx, dispute_id, evidence_hash, resolution_type)
    }

    /// Vote on a dispute resolution.
    /// Arbiters must be active agents with the VERIFICATION capability.
    /// The vote that reaches the threshold also settles the escrow.
    pub fn vote_dispute(ctx: Context<VoteDispute>, approve: bool) -> Result<()> {
        instructions::vote_dispute::handler(ctx, approve)
    }

    /// Expire a dispute that missed quorum before its voting deadline.
    pub fn resolve_expired_dispute(ctx: Context<ResolveExpiredDispute>) -> Result<()> {
        instructions::resolve_expired_dispute::handler(ctx)
    }
}
