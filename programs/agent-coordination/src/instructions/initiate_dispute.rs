//! Initiate a dispute over a worker's claim on a task

use crate::errors::CoordinationError;
use crate::events::DisputeInitiated;
use crate::instructions::constants::DISPUTE_VOTING_PERIOD;
use crate::state::{
    AgentRegistration, Dispute, DisputeStatus, ProtocolConfig, ResolutionType, Task, TaskClaim,
    TaskStatus,
};
use anchor_lang::prelude::*;

#[derive(Accounts)]
#[instruction(dispute_id: [u8; 32])]
pub struct InitiateDispute<'info> {
    #[account(
        init,
        payer = authority,
        space = Dispute::SIZE,
        seeds = [b"dispute", dispute_id.as_ref()],
        bump
    )]
    pub dispute: Account<'info, Dispute>,

    #[account(
        mut,
        seeds = [b"task", task.creator.as_ref(), task.task_id.as_ref()],
        bump = task.bump
    )]
    pub task: Account<'info, Task>,

    /// Claim under dispute
    #[account(
        seeds = [b"claim", task.key().as_ref(), claimant_agent.key().as_ref()],
        bump = claimant_claim.bump
    )]
    pub claimant_claim: Account<'info, TaskClaim>,

    #[account(
        seeds = [b"agent", claimant_agent.agent_id.as_ref()],
        bump = claimant_agent.bump
    )]
    pub claimant_agent: Account<'info, AgentRegistration>,

    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    /// Task creator or the claimant's authority
    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// Identities taking part in a new dispute.
pub struct DisputeParties {
    pub task: Pubkey,
    pub claimant: Pubkey,
    pub claimant_authority: Pubkey,
    pub initiator: Pubkey,
}

/// Validates the dispute against the task and claim and opens it.
///
/// Moves the task to Disputed and starts the voting window.
#[allow(clippy::too_many_arguments)]
pub fn open_dispute(
    dispute: &mut Dispute,
    dispute_id: [u8; 32],
    task: &mut Task,
    claim: &TaskClaim,
    parties: &DisputeParties,
    evidence_hash: [u8; 32],
    resolution_type: u8,
    bump: u8,
    now: i64,
) -> Result<()> {
    let resolution_type = ResolutionType::try_from(resolution_type)?;

    require!(
        task.status == TaskStatus::InProgress,
        CoordinationError::TaskNotInProgress
    );
    require!(!task.is_expired(now), CoordinationError::TaskExpired);
    require!(
        claim.task == parties.task && claim.worker == parties.claimant,
        CoordinationError::NotClaimed
    );
    require!(!claim.is_completed, CoordinationError::AlreadyCompleted);
    require!(
        parties.initiator == task.creator || parties.initiator == parties.claimant_authority,
        CoordinationError::NotTaskParticipant
    );

    let voting_deadline = now
        .checked_add(DISPUTE_VOTING_PERIOD)
        .ok_or(CoordinationError::ArithmeticOverflow)?;

    dispute.dispute_id = dispute_id;
    dispute.task = parties.task;
    dispute.initiator = parties.initiator;
    dispute.evidence_hash = evidence_hash;
    dispute.resolution_type = resolution_type;
    dispute.status = DisputeStatus::Active;
    dispute.created_at = now;
    dispute.resolved_at = 0;
    dispute.votes_for = 0;
    dispute.votes_against = 0;
    dispute.total_voters = 0;
    dispute.voting_deadline = voting_deadline;
    dispute.bump = bump;
    dispute.claimant = parties.claimant;

    task.status = TaskStatus::Disputed;
    Ok(())
}

pub fn increment_total_disputes(config: &mut ProtocolConfig) -> Result<()> {
    config.total_disputes = config
        .total_disputes
        .checked_add(1)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    Ok(())
}

pub fn handler(
    ctx: Context<InitiateDispute>,
    dispute_id: [u8; 32],
    evidence_hash: [u8; 32],
    resolution_type: u8,
) -> Result<()> {
    let clock = Clock::get()?;
    let parties = DisputeParties {
        task: ctx.accounts.task.key(),
        claimant: ctx.accounts.claimant_agent.key(),
        claimant_authority: ctx.accounts.claimant_agent.authority,
        initiator: ctx.accounts.authority.key(),
    };
    let dispute = &mut ctx.accounts.dispute;
    let task = &mut ctx.accounts.task;

    open_dispute(
        dispute,
        dispute_id,
        task,
        &ctx.accounts.claimant_claim,
        &parties,
        evidence_hash,
        resolution_type,
        ctx.bumps.dispute,
        clock.unix_timestamp,
    )?;
    increment_total_disputes(&mut ctx.accounts.protocol_config)?;

    emit!(DisputeInitiated {
        dispute_id,
        task_id: task.task_id,
        initiator: parties.initiator,
        claimant: parties.claimant,
        resolution_type,
        voting_deadline: dispute.voting_deadline,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;

    const TASK: Pubkey = Pubkey::new_from_array([1u8; 32]);
    const CREATOR: Pubkey = Pubkey::new_from_array([2u8; 32]);
    const CLAIMANT: Pubkey = Pubkey::new_from_array([3u8; 32]);
    const CLAIMANT_AUTHORITY: Pubkey = Pubkey::new_from_array([4u8; 32]);
    const STRANGER: Pubkey = Pubkey::new_from_array([5u8; 32]);

    fn in_progress_task() -> Task {
        Task {
            creator: CREATOR,
            status: TaskStatus::InProgress,
            current_workers: 1,
            reward_amount: 1_000,
            ..Task::default()
        }
    }

    fn claim() -> TaskClaim {
        TaskClaim {
            task: TASK,
            worker: CLAIMANT,
            ..TaskClaim::default()
        }
    }

    fn parties(initiator: Pubkey) -> DisputeParties {
        DisputeParties {
            task: TASK,
            claimant: CLAIMANT,
            claimant_authority: CLAIMANT_AUTHORITY,
            initiator,
        }
    }

    fn open(task: &mut Task, claim: &TaskClaim, initiator: Pubkey, now: i64) -> Result<Dispute> {
        let mut dispute = Dispute::default();
        open_dispute(
            &mut dispute,
            [9u8; 32],
            task,
            claim,
            &parties(initiator),
            [7u8; 32],
            ResolutionType::Complete as u8,
            250,
            now,
        )?;
        Ok(dispute)
    }

    #[test]
    fn test_creator_opens_dispute() {
        let mut task = in_progress_task();
        let dispute = open(&mut task, &claim(), CREATOR, 100).unwrap();

        assert_eq!(task.status, TaskStatus::Disputed);
        assert_eq!(dispute.status, DisputeStatus::Active);
        assert_eq!(dispute.resolution_type, ResolutionType::Complete);
        assert_eq!(dispute.voting_deadline, 100 + DISPUTE_VOTING_PERIOD);
        assert_eq!(dispute.claimant, CLAIMANT);
        assert_eq!(dispute.initiator, CREATOR);
        assert_eq!(dispute.total_voters, 0);
    }

    #[test]
    fn test_claimant_opens_dispute() {
        let mut task = in_progress_task();
        assert!(open(&mut task, &claim(), CLAIMANT_AUTHORITY, 0).is_ok());
    }

    #[test]
    fn test_outsider_rejected() {
        let mut task = in_progress_task();
        let err = open(&mut task, &claim(), STRANGER, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::NotTaskParticipant));
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_requires_in_progress() {
        for status in [TaskStatus::Open, TaskStatus::Disputed, TaskStatus::Completed] {
            let mut task = in_progress_task();
            task.status = status;
            let err = open(&mut task, &claim(), CREATOR, 0).unwrap_err();
            assert!(error_matches(&err, CoordinationError::TaskNotInProgress));
        }
    }

    #[test]
    fn test_expired_task_rejected() {
        let mut task = in_progress_task();
        task.deadline = 50;
        let err = open(&mut task, &claim(), CREATOR, 51).unwrap_err();
        assert!(error_matches(&err, CoordinationError::TaskExpired));
    }

    #[test]
    fn test_completed_claim_rejected() {
        let mut task = in_progress_task();
        let done = TaskClaim {
            is_completed: true,
            ..claim()
        };
        let err = open(&mut task, &done, CREATOR, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::AlreadyCompleted));
    }

    #[test]
    fn test_unknown_resolution_type() {
        let mut task = in_progress_task();
        let mut dispute = Dispute::default();
        let err = open_dispute(
            &mut dispute,
            [9u8; 32],
            &mut task,
            &claim(),
            &parties(CREATOR),
            [0u8; 32],
            3,
            0,
            0,
        )
        .unwrap_err();
        assert!(error_matches(&err, CoordinationError::InvalidResolutionType));
    }
}
