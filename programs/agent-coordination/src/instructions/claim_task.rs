//! Claim a task to signal intent to work on it

use anchor_lang::prelude::*;
use crate::errors::CoordinationError;
use crate::events::TaskClaimed;
use crate::instructions::constants::MAX_ACTIVE_TASKS;
use crate::state::{capability, AgentRegistration, AgentStatus, Task, TaskClaim, TaskStatus, TaskType};

#[derive(Accounts)]
pub struct ClaimTask<'info> {
    #[account(
        mut,
        seeds = [b"task", task.creator.as_ref(), task.task_id.as_ref()],
        bump = task.bump
    )]
    pub task: Account<'info, Task>,

    /// One claim per (task, worker); a second claim finds the record initialized
    #[account(
        init_if_needed,
        payer = authority,
        space = TaskClaim::SIZE,
        seeds = [b"claim", task.key().as_ref(), worker.key().as_ref()],
        bump
    )]
    pub claim: Account<'info, TaskClaim>,

    #[account(
        mut,
        seeds = [b"agent", worker.agent_id.as_ref()],
        bump = worker.bump,
        has_one = authority @ CoordinationError::Unauthorized
    )]
    pub worker: Account<'info, AgentRegistration>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// Validates a claim against the task and worker as read in this instruction
/// and records it.
#[allow(clippy::too_many_arguments)]
pub fn record_claim(
    task: &mut Task,
    task_key: Pubkey,
    claim: &mut TaskClaim,
    claim_bump: u8,
    worker: &mut AgentRegistration,
    worker_key: Pubkey,
    now: i64,
) -> Result<()> {
    require!(!claim.is_initialized(), CoordinationError::AlreadyClaimed);

    match task.status {
        TaskStatus::Open => {}
        TaskStatus::InProgress => return err!(CoordinationError::TaskFull),
        _ => return err!(CoordinationError::TaskNotClaimable),
    }
    require!(task.has_free_slot(), CoordinationError::TaskFull);
    require!(!task.is_expired(now), CoordinationError::TaskExpired);

    require!(
        worker.status == AgentStatus::Active,
        CoordinationError::AgentNotActive
    );
    require!(
        capability::has_all(worker.capabilities, task.required_capabilities),
        CoordinationError::CapabilityMismatch
    );
    require!(
        worker.active_tasks < MAX_ACTIVE_TASKS,
        CoordinationError::MaxActiveTasksReached
    );

    claim.task = task_key;
    claim.worker = worker_key;
    claim.claimed_at = now;
    claim.completed_at = 0;
    claim.is_completed = false;
    claim.is_validated = false;
    claim.reward_paid = 0;
    claim.bump = claim_bump;

    task.current_workers = task
        .current_workers
        .checked_add(1)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    worker.active_tasks = worker
        .active_tasks
        .checked_add(1)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    worker.last_active = now;

    if !task.has_free_slot() {
        task.status = TaskStatus::InProgress;
        if task.task_type == TaskType::Exclusive {
            worker.status = AgentStatus::Busy;
            worker.holds_exclusive = true;
        }
    }

    Ok(())
}

pub fn handler(ctx: Context<ClaimTask>) -> Result<()> {
    let clock = Clock::get()?;
    let task_key = ctx.accounts.task.key();
    let worker_key = ctx.accounts.worker.key();
    let task = &mut ctx.accounts.task;
    let worker = &mut ctx.accounts.worker;

    record_claim(
        task,
        task_key,
        &mut ctx.accounts.claim,
        ctx.bumps.claim,
        worker,
        worker_key,
        clock.unix_timestamp,
    )?;

    emit!(TaskClaimed {
        task_id: task.task_id,
        worker: worker_key,
        current_workers: task.current_workers,
        max_workers: task.max_workers,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;

    const TASK_KEY: Pubkey = Pubkey::new_from_array([1u8; 32]);
    const WORKER_KEY: Pubkey = Pubkey::new_from_array([2u8; 32]);

    fn open_task(task_type: TaskType, max_workers: u8, required: u64) -> Task {
        Task {
            required_capabilities: required,
            reward_amount: 1_000,
            max_workers,
            task_type,
            ..Task::default()
        }
    }

    fn active_worker(capabilities: u64) -> AgentRegistration {
        AgentRegistration {
            capabilities,
            status: AgentStatus::Active,
            reputation: 100,
            ..AgentRegistration::default()
        }
    }

    fn claim(task: &mut Task, worker: &mut AgentRegistration, now: i64) -> Result<TaskClaim> {
        let mut claim = TaskClaim::default();
        record_claim(task, TASK_KEY, &mut claim, 255, worker, WORKER_KEY, now)?;
        Ok(claim)
    }

    #[test]
    fn test_exclusive_claim_fills_task_and_marks_busy() {
        let mut task = open_task(TaskType::Exclusive, 1, capability::COMPUTE);
        let mut worker = active_worker(capability::COMPUTE);

        let claim = claim(&mut task, &mut worker, 10).unwrap();

        assert_eq!(claim.task, TASK_KEY);
        assert_eq!(claim.worker, WORKER_KEY);
        assert_eq!(claim.claimed_at, 10);
        assert_eq!(task.current_workers, 1);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(worker.status, AgentStatus::Busy);
        assert!(worker.holds_exclusive);
        assert_eq!(worker.active_tasks, 1);
    }

    #[test]
    fn test_collaborative_claim_stays_open_until_full() {
        let mut task = open_task(TaskType::Collaborative, 2, capability::COMPUTE);
        let mut first = active_worker(capability::COMPUTE);
        let mut second = active_worker(capability::COMPUTE);

        claim(&mut task, &mut first, 0).unwrap();
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(first.status, AgentStatus::Active);

        claim(&mut task, &mut second, 0).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(second.status, AgentStatus::Active);
    }

    #[test]
    fn test_duplicate_claim_rejected() {
        let mut task = open_task(TaskType::Competitive, 3, capability::COMPUTE);
        let mut worker = active_worker(capability::COMPUTE);
        let mut existing = claim(&mut task, &mut worker, 0).unwrap();

        let err = record_claim(
            &mut task,
            TASK_KEY,
            &mut existing,
            255,
            &mut worker,
            WORKER_KEY,
            0,
        )
        .unwrap_err();
        assert!(error_matches(&err, CoordinationError::AlreadyClaimed));
        assert_eq!(task.current_workers, 1);
    }

    #[test]
    fn test_full_task_rejected() {
        let mut task = open_task(TaskType::Exclusive, 1, capability::COMPUTE);
        let mut first = active_worker(capability::COMPUTE);
        let mut second = active_worker(capability::COMPUTE);
        claim(&mut task, &mut first, 0).unwrap();

        let err = claim(&mut task, &mut second, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::TaskFull));
        assert_eq!(task.current_workers, 1);
    }

    #[test]
    fn test_terminal_task_not_claimable() {
        for status in [TaskStatus::Completed, TaskStatus::Cancelled, TaskStatus::Disputed] {
            let mut task = open_task(TaskType::Competitive, 3, capability::COMPUTE);
            task.status = status;
            let mut worker = active_worker(capability::COMPUTE);
            let err = claim(&mut task, &mut worker, 0).unwrap_err();
            assert!(error_matches(&err, CoordinationError::TaskNotClaimable));
        }
    }

    #[test]
    fn test_partial_overlap_is_not_enough() {
        let mut task = open_task(
            TaskType::Exclusive,
            1,
            capability::COMPUTE | capability::INFERENCE,
        );
        let mut worker = active_worker(capability::COMPUTE | capability::STORAGE);
        let err = claim(&mut task, &mut worker, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::CapabilityMismatch));
        assert_eq!(worker.active_tasks, 0);
    }

    #[test]
    fn test_expired_task_rejected() {
        let mut task = open_task(TaskType::Exclusive, 1, capability::COMPUTE);
        task.deadline = 100;
        let mut worker = active_worker(capability::COMPUTE);

        let err = claim(&mut task, &mut worker, 101).unwrap_err();
        assert!(error_matches(&err, CoordinationError::TaskExpired));
        assert!(claim(&mut task, &mut worker, 100).is_ok());
    }

    #[test]
    fn test_inactive_and_busy_workers_rejected() {
        for status in [AgentStatus::Inactive, AgentStatus::Busy, AgentStatus::Suspended] {
            let mut task = open_task(TaskType::Competitive, 2, capability::COMPUTE);
            let mut worker = active_worker(capability::COMPUTE);
            worker.status = status;
            let err = claim(&mut task, &mut worker, 0).unwrap_err();
            assert!(error_matches(&err, CoordinationError::AgentNotActive));
        }
    }

    #[test]
    fn test_active_task_cap() {
        let mut task = open_task(TaskType::Competitive, 2, capability::COMPUTE);
        let mut worker = active_worker(capability::COMPUTE);
        worker.active_tasks = MAX_ACTIVE_TASKS;
        let err = claim(&mut task, &mut worker, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::MaxActiveTasksReached));
    }
}
