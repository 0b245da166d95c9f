//! Vote on a dispute resolution, settling the escrow once quorum is reached

use crate::errors::CoordinationError;
use crate::events::{DisputeResolved, DisputeVoteCast, RewardDistributed};
use crate::instructions::claim_accounts::release_claimants;
use crate::instructions::completion_helpers::update_protocol_stats;
use crate::instructions::dispute_helpers::{has_quorum, settle_dispute};
use crate::instructions::lamport_transfer::transfer_lamports;
use crate::state::{
    capability, AgentRegistration, AgentStatus, Dispute, DisputeStatus, DisputeVote,
    ProtocolConfig, Task, TaskClaim, TaskEscrow, TaskType,
};
use anchor_lang::prelude::*;

/// remaining_accounts: only read on the quorum vote, one `(claim, worker_agent)`
/// pair for every claim on the task other than the claimant's
#[derive(Accounts)]
pub struct VoteDispute<'info> {
    #[account(
        mut,
        seeds = [b"dispute", dispute.dispute_id.as_ref()],
        bump = dispute.bump,
        has_one = task @ CoordinationError::TaskNotFound
    )]
    pub dispute: Box<Account<'info, Dispute>>,

    #[account(
        mut,
        seeds = [b"task", task.creator.as_ref(), task.task_id.as_ref()],
        bump = task.bump
    )]
    pub task: Box<Account<'info, Task>>,

    #[account(
        mut,
        seeds = [b"escrow", task.key().as_ref()],
        bump = escrow.bump,
        constraint = task.escrow == escrow.key() @ CoordinationError::InvalidInput
    )]
    pub escrow: Box<Account<'info, TaskEscrow>>,

    /// One vote per (dispute, arbiter); a second vote finds the record initialized
    #[account(
        init_if_needed,
        payer = authority,
        space = DisputeVote::SIZE,
        seeds = [b"vote", dispute.key().as_ref(), arbiter.key().as_ref()],
        bump
    )]
    pub vote: Box<Account<'info, DisputeVote>>,

    #[account(
        mut,
        seeds = [b"agent", arbiter.agent_id.as_ref()],
        bump = arbiter.bump,
        has_one = authority @ CoordinationError::Unauthorized
    )]
    pub arbiter: Box<Account<'info, AgentRegistration>>,

    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Box<Account<'info, ProtocolConfig>>,

    /// CHECK: Treasury receives protocol fees; validated against protocol config
    #[account(
        mut,
        constraint = treasury.key() == protocol_config.treasury @ CoordinationError::InvalidTreasury
    )]
    pub treasury: UncheckedAccount<'info>,

    /// CHECK: Receives refunds; must be the task creator
    #[account(
        mut,
        constraint = creator.key() == task.creator @ CoordinationError::InvalidCreator
    )]
    pub creator: UncheckedAccount<'info>,

    #[account(
        mut,
        seeds = [b"claim", task.key().as_ref(), claimant_agent.key().as_ref()],
        bump = claimant_claim.bump
    )]
    pub claimant_claim: Box<Account<'info, TaskClaim>>,

    #[account(
        mut,
        seeds = [b"agent", claimant_agent.agent_id.as_ref()],
        bump = claimant_agent.bump,
        constraint = claimant_agent.key() == dispute.claimant @ CoordinationError::InvalidInput
    )]
    pub claimant_agent: Box<Account<'info, AgentRegistration>>,

    /// CHECK: Receives the claimant's payout; must own the claimant agent
    #[account(
        mut,
        constraint = claimant_authority.key() == claimant_agent.authority @ CoordinationError::Unauthorized
    )]
    pub claimant_authority: UncheckedAccount<'info>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// The arbiter and the parties it must be independent of.
pub struct Ballot {
    pub dispute: Pubkey,
    pub arbiter: Pubkey,
    pub task_creator: Pubkey,
    pub approve: bool,
}

/// Validates and records one arbiter vote. Returns whether the dispute now
/// has quorum.
#[allow(clippy::too_many_arguments)]
pub fn cast_vote(
    dispute: &mut Dispute,
    vote: &mut DisputeVote,
    vote_bump: u8,
    arbiter: &mut AgentRegistration,
    ballot: &Ballot,
    min_arbiter_stake: u64,
    dispute_threshold: u8,
    now: i64,
) -> Result<bool> {
    require!(!vote.is_initialized(), CoordinationError::AlreadyVoted);
    require!(
        dispute.status == DisputeStatus::Active,
        CoordinationError::DisputeNotActive
    );
    require!(
        now < dispute.voting_deadline,
        CoordinationError::VotingEnded
    );

    require!(
        arbiter.status == AgentStatus::Active,
        CoordinationError::AgentNotActive
    );
    require!(
        capability::has_all(arbiter.capabilities, capability::VERIFICATION),
        CoordinationError::NotArbiter
    );
    require!(
        arbiter.stake >= min_arbiter_stake,
        CoordinationError::InsufficientStake
    );
    require!(
        arbiter.authority != ballot.task_creator
            && arbiter.authority != dispute.initiator
            && ballot.arbiter != dispute.claimant,
        CoordinationError::ArbiterIsDisputeParticipant
    );

    vote.dispute = ballot.dispute;
    vote.voter = ballot.arbiter;
    vote.approved = ballot.approve;
    vote.voted_at = now;
    vote.bump = vote_bump;

    if ballot.approve {
        dispute.votes_for = dispute
            .votes_for
            .checked_add(1)
            .ok_or(CoordinationError::ArithmeticOverflow)?;
    } else {
        dispute.votes_against = dispute
            .votes_against
            .checked_add(1)
            .ok_or(CoordinationError::ArithmeticOverflow)?;
    }
    dispute.total_voters = dispute
        .total_voters
        .checked_add(1)
        .ok_or(CoordinationError::ArithmeticOverflow)?;

    arbiter.last_active = now;

    Ok(has_quorum(dispute, dispute_threshold))
}

pub fn handler(ctx: Context<VoteDispute>, approve: bool) -> Result<()> {
    let clock = Clock::get()?;
    let ballot = Ballot {
        dispute: ctx.accounts.dispute.key(),
        arbiter: ctx.accounts.arbiter.key(),
        task_creator: ctx.accounts.task.creator,
        approve,
    };
    let min_arbiter_stake = ctx.accounts.protocol_config.min_arbiter_stake;
    let dispute_threshold = ctx.accounts.protocol_config.dispute_threshold;

    let quorum = cast_vote(
        &mut ctx.accounts.dispute,
        &mut ctx.accounts.vote,
        ctx.bumps.vote,
        &mut ctx.accounts.arbiter,
        &ballot,
        min_arbiter_stake,
        dispute_threshold,
        clock.unix_timestamp,
    )?;

    emit!(DisputeVoteCast {
        dispute_id: ctx.accounts.dispute.dispute_id,
        voter: ballot.arbiter,
        approved: approve,
        votes_for: ctx.accounts.dispute.votes_for,
        votes_against: ctx.accounts.dispute.votes_against,
        timestamp: clock.unix_timestamp,
    });

    if !quorum {
        return Ok(());
    }

    let settlement = settle_dispute(
        &mut ctx.accounts.dispute,
        &mut ctx.accounts.task,
        &mut ctx.accounts.escrow,
        &mut ctx.accounts.claimant_claim,
        &mut ctx.accounts.claimant_agent,
        clock.unix_timestamp,
    )?;
    let payout = settlement.payout;

    let escrow_info = ctx.accounts.escrow.to_account_info();
    transfer_lamports(
        &escrow_info,
        &ctx.accounts.claimant_authority.to_account_info(),
        payout.to_worker,
    )?;
    transfer_lamports(
        &escrow_info,
        &ctx.accounts.treasury.to_account_info(),
        payout.to_treasury,
    )?;
    transfer_lamports(
        &escrow_info,
        &ctx.accounts.creator.to_account_info(),
        payout.to_creator,
    )?;

    let task_key = ctx.accounts.task.key();
    let other_claims = (ctx.accounts.task.current_workers as usize).saturating_sub(1);
    let arbiter_holds_claim = ctx
        .remaining_accounts
        .iter()
        .any(|info| info.key == &ballot.arbiter);
    release_claimants(
        ctx.remaining_accounts,
        task_key,
        ctx.accounts.task.task_type == TaskType::Exclusive,
        other_claims,
        Some(ctx.accounts.dispute.claimant),
        clock.unix_timestamp,
    )?;
    if arbiter_holds_claim {
        // Released through the raw account data; pick that up before exit
        // serializes the arbiter again.
        ctx.accounts.arbiter.reload()?;
        ctx.accounts.arbiter.last_active = clock.unix_timestamp;
    }

    let to_workers = payout
        .to_worker
        .checked_add(payout.to_treasury)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    update_protocol_stats(
        &mut ctx.accounts.protocol_config,
        to_workers,
        settlement.task_completed,
    )?;

    let dispute = &ctx.accounts.dispute;
    msg!(
        "Dispute reached quorum: {} for, {} against, applied {:?}",
        dispute.votes_for,
        dispute.votes_against,
        settlement.applied
    );

    if to_workers > 0 {
        emit!(RewardDistributed {
            task_id: ctx.accounts.task.task_id,
            recipient: ctx.accounts.claimant_authority.key(),
            amount: payout.to_worker,
            protocol_fee: payout.to_treasury,
            timestamp: clock.unix_timestamp,
        });
    }

    emit!(DisputeResolved {
        dispute_id: dispute.dispute_id,
        applied_resolution: settlement.applied as u8,
        votes_for: dispute.votes_for,
        votes_against: dispute.votes_against,
        to_creator: payout.to_creator,
        to_worker: payout.to_worker,
        protocol_fee: payout.to_treasury,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;
    use crate::state::ResolutionType;

    const DISPUTE: Pubkey = Pubkey::new_from_array([1u8; 32]);
    const ARBITER: Pubkey = Pubkey::new_from_array([2u8; 32]);
    const ARBITER_AUTHORITY: Pubkey = Pubkey::new_from_array([3u8; 32]);
    const CREATOR: Pubkey = Pubkey::new_from_array([4u8; 32]);
    const CLAIMANT: Pubkey = Pubkey::new_from_array([5u8; 32]);

    fn active_dispute() -> Dispute {
        Dispute {
            resolution_type: ResolutionType::Complete,
            status: DisputeStatus::Active,
            voting_deadline: 1_000,
            initiator: CREATOR,
            claimant: CLAIMANT,
            ..Dispute::default()
        }
    }

    fn arbiter() -> AgentRegistration {
        AgentRegistration {
            authority: ARBITER_AUTHORITY,
            capabilities: capability::VERIFICATION,
            status: AgentStatus::Active,
            ..AgentRegistration::default()
        }
    }

    fn ballot(approve: bool) -> Ballot {
        Ballot {
            dispute: DISPUTE,
            arbiter: ARBITER,
            task_creator: CREATOR,
            approve,
        }
    }

    fn vote(
        dispute: &mut Dispute,
        arbiter: &mut AgentRegistration,
        ballot: &Ballot,
        threshold: u8,
        now: i64,
    ) -> Result<(bool, DisputeVote)> {
        let mut record = DisputeVote::default();
        let quorum = cast_vote(dispute, &mut record, 254, arbiter, ballot, 0, threshold, now)?;
        Ok((quorum, record))
    }

    #[test]
    fn test_vote_recorded() {
        let mut dispute = active_dispute();
        let mut arbiter = arbiter();

        let (quorum, record) = vote(&mut dispute, &mut arbiter, &ballot(true), 3, 10).unwrap();

        assert!(!quorum);
        assert_eq!(record.dispute, DISPUTE);
        assert_eq!(record.voter, ARBITER);
        assert!(record.approved);
        assert_eq!(dispute.votes_for, 1);
        assert_eq!(dispute.total_voters, 1);
        assert_eq!(arbiter.last_active, 10);
    }

    #[test]
    fn test_quorum_reported_at_threshold() {
        let mut dispute = active_dispute();
        dispute.votes_for = 1;
        dispute.votes_against = 1;
        dispute.total_voters = 2;
        let (quorum, _) = vote(&mut dispute, &mut arbiter(), &ballot(false), 3, 0).unwrap();
        assert!(quorum);
        assert_eq!(dispute.votes_against, 2);
    }

    #[test]
    fn test_double_vote_rejected() {
        let mut dispute = active_dispute();
        let mut arbiter = arbiter();
        let (_, mut record) = vote(&mut dispute, &mut arbiter, &ballot(true), 3, 0).unwrap();

        let err = cast_vote(
            &mut dispute,
            &mut record,
            254,
            &mut arbiter,
            &ballot(false),
            0,
            3,
            0,
        )
        .unwrap_err();
        assert!(error_matches(&err, CoordinationError::AlreadyVoted));
        assert_eq!(dispute.total_voters, 1);
    }

    #[test]
    fn test_voting_window() {
        let mut dispute = active_dispute();
        let err = vote(&mut dispute, &mut arbiter(), &ballot(true), 3, 1_000).unwrap_err();
        assert!(error_matches(&err, CoordinationError::VotingEnded));
        assert!(vote(&mut dispute, &mut arbiter(), &ballot(true), 3, 999).is_ok());
    }

    #[test]
    fn test_resolved_dispute_rejects_votes() {
        let mut dispute = active_dispute();
        dispute.status = DisputeStatus::Resolved;
        let err = vote(&mut dispute, &mut arbiter(), &ballot(true), 3, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::DisputeNotActive));
    }

    #[test]
    fn test_requires_verification_capability() {
        let mut dispute = active_dispute();
        let mut arbiter = arbiter();
        arbiter.capabilities = capability::COMPUTE | capability::STORAGE;
        let err = vote(&mut dispute, &mut arbiter, &ballot(true), 3, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::NotArbiter));
    }

    #[test]
    fn test_suspended_arbiter_rejected() {
        let mut dispute = active_dispute();
        let mut arbiter = arbiter();
        arbiter.status = AgentStatus::Suspended;
        let err = vote(&mut dispute, &mut arbiter, &ballot(true), 3, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::AgentNotActive));
    }

    #[test]
    fn test_stake_requirement() {
        let mut dispute = active_dispute();
        let mut arbiter = arbiter();
        let mut record = DisputeVote::default();
        let err = cast_vote(
            &mut dispute,
            &mut record,
            0,
            &mut arbiter,
            &ballot(true),
            1,
            3,
            0,
        )
        .unwrap_err();
        assert!(error_matches(&err, CoordinationError::InsufficientStake));
    }

    #[test]
    fn test_participants_cannot_arbitrate() {
        let mut dispute = active_dispute();

        let mut creator_arbiter = arbiter();
        creator_arbiter.authority = CREATOR;
        let err = vote(&mut dispute, &mut creator_arbiter, &ballot(true), 3, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::ArbiterIsDisputeParticipant));

        let claimant_ballot = Ballot {
            arbiter: CLAIMANT,
            ..ballot(true)
        };
        let err = vote(&mut dispute, &mut arbiter(), &claimant_ballot, 3, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::ArbiterIsDisputeParticipant));
        assert_eq!(dispute.total_voters, 0);
    }
}
