//! Complete a claimed task and collect the reward

use crate::errors::CoordinationError;
use crate::events::{RewardDistributed, TaskCompleted};
use crate::instructions::completion_helpers::{
    finish_task, release_worker, settle_completion_share, update_protocol_stats,
};
use crate::instructions::lamport_transfer::{transfer_lamports, EscrowPayout};
use crate::state::{
    AgentRegistration, ProtocolConfig, Task, TaskClaim, TaskEscrow, TaskStatus, TaskType,
};
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct CompleteTask<'info> {
    #[account(
        mut,
        seeds = [b"task", task.creator.as_ref(), task.task_id.as_ref()],
        bump = task.bump
    )]
    pub task: Account<'info, Task>,

    #[account(
        mut,
        seeds = [b"claim", task.key().as_ref(), worker.key().as_ref()],
        bump = claim.bump,
        constraint = claim.task == task.key() @ CoordinationError::NotClaimed
    )]
    pub claim: Account<'info, TaskClaim>,

    #[account(
        mut,
        seeds = [b"escrow", task.key().as_ref()],
        bump = escrow.bump,
        constraint = task.escrow == escrow.key() @ CoordinationError::InvalidInput
    )]
    pub escrow: Account<'info, TaskEscrow>,

    #[account(
        mut,
        seeds = [b"agent", worker.agent_id.as_ref()],
        bump = worker.bump,
        has_one = authority @ CoordinationError::Unauthorized
    )]
    pub worker: Account<'info, AgentRegistration>,

    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    /// CHECK: Treasury receives protocol fees; validated against protocol config
    #[account(
        mut,
        constraint = treasury.key() == protocol_config.treasury @ CoordinationError::InvalidTreasury
    )]
    pub treasury: UncheckedAccount<'info>,

    /// Worker authority; receives the reward
    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// What a completion changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub payout: EscrowPayout,
    /// The completion reached `required_completions` and closed the task
    pub task_completed: bool,
}

/// Records a completion for `claim` and computes the escrow payout.
///
/// Competitive tasks pay only the first completer. Later completers of an
/// already won competitive task are recorded unpaid (`is_validated` stays
/// false) and released, regardless of the deadline.
#[allow(clippy::too_many_arguments)]
pub fn record_completion(
    task: &mut Task,
    escrow: &mut TaskEscrow,
    claim: &mut TaskClaim,
    worker: &mut AgentRegistration,
    proof_hash: [u8; 32],
    result_data: Option<[u8; 64]>,
    now: i64,
) -> Result<CompletionOutcome> {
    require!(claim.is_initialized(), CoordinationError::NotClaimed);
    require!(!claim.is_completed, CoordinationError::AlreadyCompleted);

    let result = result_data.unwrap_or([0u8; 64]);

    if task.task_type == TaskType::Competitive && task.completions >= task.required_completions {
        claim.proof_hash = proof_hash;
        claim.result_data = result;
        claim.is_completed = true;
        claim.is_validated = false;
        claim.completed_at = now;
        claim.reward_paid = 0;
        release_worker(worker, false)?;
        worker.last_active = now;
        return Ok(CompletionOutcome {
            payout: EscrowPayout::default(),
            task_completed: false,
        });
    }

    require!(!task.is_expired(now), CoordinationError::TaskExpired);
    require!(
        matches!(task.status, TaskStatus::Open | TaskStatus::InProgress),
        CoordinationError::TaskNotInProgress
    );
    require!(!escrow.is_closed, CoordinationError::EscrowClosed);

    claim.proof_hash = proof_hash;
    claim.result_data = result;
    let payout = settle_completion_share(task, escrow, claim, worker, now)?;

    let task_completed = task.completions >= task.required_completions;
    if task_completed {
        finish_task(task, escrow, result, now)?;
    }

    Ok(CompletionOutcome {
        payout,
        task_completed,
    })
}

pub fn handler(
    ctx: Context<CompleteTask>,
    proof_hash: [u8; 32],
    result_data: Option<[u8; 64]>,
) -> Result<()> {
    let clock = Clock::get()?;
    let worker_key = ctx.accounts.worker.key();

    let outcome = record_completion(
        &mut ctx.accounts.task,
        &mut ctx.accounts.escrow,
        &mut ctx.accounts.claim,
        &mut ctx.accounts.worker,
        proof_hash,
        result_data,
        clock.unix_timestamp,
    )?;
    let payout = outcome.payout;

    let escrow_info = ctx.accounts.escrow.to_account_info();
    transfer_lamports(
        &escrow_info,
        &ctx.accounts.authority.to_account_info(),
        payout.to_worker,
    )?;
    transfer_lamports(
        &escrow_info,
        &ctx.accounts.treasury.to_account_info(),
        payout.to_treasury,
    )?;

    let distributed = payout
        .to_worker
        .checked_add(payout.to_treasury)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    update_protocol_stats(
        &mut ctx.accounts.protocol_config,
        distributed,
        outcome.task_completed,
    )?;

    let task = &ctx.accounts.task;
    if distributed > 0 {
        emit!(RewardDistributed {
            task_id: task.task_id,
            recipient: ctx.accounts.authority.key(),
            amount: payout.to_worker,
            protocol_fee: payout.to_treasury,
            timestamp: clock.unix_timestamp,
        });
    }

    emit!(TaskCompleted {
        task_id: task.task_id,
        worker: worker_key,
        proof_hash,
        reward_paid: payout.to_worker,
        completions: task.completions,
        required_completions: task.required_completions,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;
    use crate::state::AgentStatus;

    struct Fixture {
        task: Task,
        escrow: TaskEscrow,
    }

    impl Fixture {
        fn new(task_type: TaskType, reward: u64, workers: u8, fee_bps: u16) -> Self {
            let required_completions = match task_type {
                TaskType::Collaborative => workers,
                _ => 1,
            };
            Self {
                task: Task {
                    reward_amount: reward,
                    max_workers: workers,
                    current_workers: workers,
                    status: TaskStatus::InProgress,
                    task_type,
                    required_completions,
                    protocol_fee_bps: fee_bps,
                    ..Task::default()
                },
                escrow: TaskEscrow {
                    amount: reward,
                    ..TaskEscrow::default()
                },
            }
        }

        fn complete(
            &mut self,
            claim: &mut TaskClaim,
            worker: &mut AgentRegistration,
            now: i64,
        ) -> Result<CompletionOutcome> {
            record_completion(
                &mut self.task,
                &mut self.escrow,
                claim,
                worker,
                [0xAA; 32],
                None,
                now,
            )
        }
    }

    fn claimed() -> TaskClaim {
        TaskClaim {
            task: Pubkey::new_from_array([1u8; 32]),
            worker: Pubkey::new_from_array([2u8; 32]),
            ..TaskClaim::default()
        }
    }

    fn worker(status: AgentStatus) -> AgentRegistration {
        AgentRegistration {
            status,
            active_tasks: 1,
            reputation: 100,
            ..AgentRegistration::default()
        }
    }

    #[test]
    fn test_exclusive_completion_pays_reward_minus_fee() {
        let mut fx = Fixture::new(TaskType::Exclusive, 1_000_000, 1, 250);
        let mut claim = claimed();
        let mut agent = worker(AgentStatus::Busy);

        let outcome = fx.complete(&mut claim, &mut agent, 5).unwrap();

        assert!(outcome.task_completed);
        assert_eq!(outcome.payout.to_worker, 975_000);
        assert_eq!(outcome.payout.to_treasury, 25_000);
        assert_eq!(fx.task.status, TaskStatus::Completed);
        assert_eq!(fx.task.completed_at, 5);
        assert!(fx.escrow.is_closed);
        assert_eq!(fx.escrow.distributed, fx.escrow.amount);
        assert_eq!(claim.proof_hash, [0xAA; 32]);
        assert_eq!(agent.status, AgentStatus::Active);
        assert_eq!(agent.active_tasks, 0);
        assert_eq!(agent.reputation, 200);
    }

    #[test]
    fn test_collaborative_completes_on_last_share() {
        let mut fx = Fixture::new(TaskType::Collaborative, 1_000_001, 2, 0);
        let mut claim_a = claimed();
        let mut claim_b = claimed();
        let mut agent_a = worker(AgentStatus::Active);
        let mut agent_b = worker(AgentStatus::Active);

        let first = fx.complete(&mut claim_a, &mut agent_a, 1).unwrap();
        assert!(!first.task_completed);
        assert_eq!(first.payout.to_worker, 500_000);
        assert_eq!(fx.task.status, TaskStatus::InProgress);
        assert!(!fx.escrow.is_closed);

        let second = fx.complete(&mut claim_b, &mut agent_b, 2).unwrap();
        assert!(second.task_completed);
        assert_eq!(second.payout.to_worker, 500_001);
        assert_eq!(fx.escrow.distributed, 1_000_001);
    }

    #[test]
    fn test_second_completion_of_same_claim_rejected() {
        let mut fx = Fixture::new(TaskType::Collaborative, 1_000, 2, 0);
        let mut claim = claimed();
        let mut agent = worker(AgentStatus::Active);
        agent.active_tasks = 2;

        fx.complete(&mut claim, &mut agent, 0).unwrap();
        let err = fx.complete(&mut claim, &mut agent, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::AlreadyCompleted));
        assert_eq!(fx.task.completions, 1);
    }

    #[test]
    fn test_missing_claim_rejected() {
        let mut fx = Fixture::new(TaskType::Exclusive, 1_000, 1, 0);
        let mut claim = TaskClaim::default();
        let mut agent = worker(AgentStatus::Busy);
        let err = fx.complete(&mut claim, &mut agent, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::NotClaimed));
    }

    #[test]
    fn test_expired_task_rejected() {
        let mut fx = Fixture::new(TaskType::Exclusive, 1_000, 1, 0);
        fx.task.deadline = 50;
        let mut claim = claimed();
        let mut agent = worker(AgentStatus::Busy);

        let err = fx.complete(&mut claim, &mut agent, 51).unwrap_err();
        assert!(error_matches(&err, CoordinationError::TaskExpired));
        assert_eq!(fx.escrow.distributed, 0);
    }

    #[test]
    fn test_disputed_task_rejected() {
        let mut fx = Fixture::new(TaskType::Exclusive, 1_000, 1, 0);
        fx.task.status = TaskStatus::Disputed;
        let mut claim = claimed();
        let mut agent = worker(AgentStatus::Busy);
        let err = fx.complete(&mut claim, &mut agent, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::TaskNotInProgress));
    }

    // Assumed rule: a competitive task pays its first completer in full and
    // later completers nothing.
    #[test]
    fn test_competitive_late_completer_is_released_unpaid() {
        let mut fx = Fixture::new(TaskType::Competitive, 1_000, 3, 0);
        let mut winner_claim = claimed();
        let mut late_claim = claimed();
        let mut winner = worker(AgentStatus::Active);
        let mut late = worker(AgentStatus::Active);

        let won = fx.complete(&mut winner_claim, &mut winner, 1).unwrap();
        assert!(won.task_completed);
        assert_eq!(won.payout.to_worker, 1_000);

        fx.task.deadline = 2;
        let lost = fx.complete(&mut late_claim, &mut late, 10).unwrap();
        assert!(!lost.task_completed);
        assert_eq!(lost.payout, EscrowPayout::default());
        assert!(late_claim.is_completed);
        assert!(!late_claim.is_validated);
        assert_eq!(late_claim.reward_paid, 0);
        assert_eq!(late.active_tasks, 0);
        assert_eq!(late.tasks_completed, 0);
        assert_eq!(fx.task.completions, 1);
        assert_eq!(fx.escrow.distributed, 1_000);
    }
}
