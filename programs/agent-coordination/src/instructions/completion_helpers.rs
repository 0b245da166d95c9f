//! Shared helpers for task completion logic.
//!
//! Used by `complete_task` and by dispute settlement when a dispute is
//! resolved in the claimant's favor.

use crate::errors::CoordinationError;
use crate::instructions::constants::{
    BASIS_POINTS_DIVISOR, MAX_REPUTATION, REPUTATION_PER_COMPLETION,
};
use crate::instructions::lamport_transfer::EscrowPayout;
use crate::state::{
    AgentRegistration, AgentStatus, ProtocolConfig, Task, TaskClaim, TaskEscrow, TaskStatus,
    TaskType,
};
use anchor_lang::prelude::*;

/// Calculate worker reward and protocol fee for the next completion of `task`.
///
/// Uses the fee locked on the task at creation.
pub fn calculate_reward_split(task: &Task) -> Result<(u64, u64)> {
    let reward_per_worker = calculate_reward_per_worker(task)?;

    // Widened so any fundable reward fits; the fee never exceeds the reward
    let protocol_fee = (reward_per_worker as u128)
        .checked_mul(task.protocol_fee_bps as u128)
        .ok_or(CoordinationError::ArithmeticOverflow)?
        .checked_div(BASIS_POINTS_DIVISOR as u128)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    let protocol_fee =
        u64::try_from(protocol_fee).map_err(|_| CoordinationError::ArithmeticOverflow)?;

    let worker_reward = reward_per_worker
        .checked_sub(protocol_fee)
        .ok_or(CoordinationError::ArithmeticOverflow)?;

    Ok((worker_reward, protocol_fee))
}

/// Calculate the share paid for the next completion.
///
/// Collaborative tasks split the reward equally; the completion that reaches
/// `required_completions` also takes the division remainder so the escrow
/// ends fully distributed.
fn calculate_reward_per_worker(task: &Task) -> Result<u64> {
    match task.task_type {
        TaskType::Collaborative => {
            let base_reward = task
                .reward_amount
                .checked_div(task.required_completions as u64)
                .ok_or(CoordinationError::ArithmeticOverflow)?;

            let remainder = task
                .reward_amount
                .checked_rem(task.required_completions as u64)
                .ok_or(CoordinationError::ArithmeticOverflow)?;

            if task.completions == task.required_completions.saturating_sub(1) {
                Ok(base_reward
                    .checked_add(remainder)
                    .ok_or(CoordinationError::ArithmeticOverflow)?)
            } else {
                Ok(base_reward)
            }
        }
        TaskType::Competitive | TaskType::Exclusive => Ok(task.reward_amount),
    }
}

/// Give back one open-claim slot. Releasing the Exclusive claim ends Busy;
/// a suspended agent stays Suspended.
pub fn release_worker(worker: &mut AgentRegistration, exclusive: bool) -> Result<()> {
    worker.active_tasks = worker
        .active_tasks
        .checked_sub(1)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    if exclusive {
        worker.holds_exclusive = false;
        if worker.status == AgentStatus::Busy {
            worker.status = AgentStatus::Active;
        }
    }
    Ok(())
}

/// Close `claim` unpaid and release its worker, unless the claim already
/// finished. Returns whether a slot was released.
///
/// A closed claim reads as completed without validation, so a later
/// `complete_task` on it fails instead of releasing the worker twice.
pub fn release_open_claim(
    claim: &mut TaskClaim,
    worker: &mut AgentRegistration,
    exclusive: bool,
    timestamp: i64,
) -> Result<bool> {
    if claim.is_completed {
        return Ok(false);
    }
    release_worker(worker, exclusive)?;
    claim.is_completed = true;
    claim.is_validated = false;
    claim.completed_at = timestamp;
    Ok(true)
}

/// Update worker statistics after a paid completion.
pub fn update_worker_state(
    worker: &mut AgentRegistration,
    reward: u64,
    exclusive: bool,
    timestamp: i64,
) -> Result<()> {
    worker.tasks_completed = worker
        .tasks_completed
        .checked_add(1)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    worker.total_earned = worker
        .total_earned
        .checked_add(reward)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    worker.last_active = timestamp;
    // Reputation caps at MAX_REPUTATION rather than failing the completion
    worker.reputation = worker
        .reputation
        .saturating_add(REPUTATION_PER_COMPLETION)
        .min(MAX_REPUTATION);
    release_worker(worker, exclusive)
}

/// Pay one completion share out of the escrow.
///
/// Marks the claim completed and validated, counts the share (worker reward
/// plus protocol fee) as distributed, bumps `task.completions` and the
/// worker's statistics. The caller decides whether the task is now finished.
pub fn settle_completion_share(
    task: &mut Task,
    escrow: &mut TaskEscrow,
    claim: &mut TaskClaim,
    worker: &mut AgentRegistration,
    timestamp: i64,
) -> Result<EscrowPayout> {
    let (worker_reward, protocol_fee) = calculate_reward_split(task)?;
    let share = worker_reward
        .checked_add(protocol_fee)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    require!(
        share <= escrow.remaining()?,
        CoordinationError::InsufficientEscrowBalance
    );

    claim.is_completed = true;
    claim.is_validated = true;
    claim.completed_at = timestamp;
    claim.reward_paid = worker_reward;

    escrow.distributed = escrow
        .distributed
        .checked_add(share)
        .ok_or(CoordinationError::ArithmeticOverflow)?;

    task.completions = task
        .completions
        .checked_add(1)
        .ok_or(CoordinationError::ArithmeticOverflow)?;

    let exclusive = task.task_type == TaskType::Exclusive;
    update_worker_state(worker, worker_reward, exclusive, timestamp)?;

    Ok(EscrowPayout {
        to_worker: worker_reward,
        to_treasury: protocol_fee,
        to_creator: 0,
    })
}

/// Move the task to Completed and close its escrow.
pub fn finish_task(
    task: &mut Task,
    escrow: &mut TaskEscrow,
    result: [u8; 64],
    timestamp: i64,
) -> Result<()> {
    require!(
        task.status.can_transition_to(TaskStatus::Completed),
        CoordinationError::InvalidStatusTransition
    );
    task.status = TaskStatus::Completed;
    task.completed_at = timestamp;
    task.result = result;
    escrow.is_closed = true;
    Ok(())
}

/// Update protocol statistics after escrow funds reached workers or the treasury.
pub fn update_protocol_stats(
    config: &mut ProtocolConfig,
    value_distributed: u64,
    task_completed: bool,
) -> Result<()> {
    if task_completed {
        config.completed_tasks = config
            .completed_tasks
            .checked_add(1)
            .ok_or(CoordinationError::ArithmeticOverflow)?;
    }
    config.total_value_distributed = config
        .total_value_distributed
        .checked_add(value_distributed)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;

    fn create_test_task(
        task_type: TaskType,
        reward_amount: u64,
        required_completions: u8,
        completions: u8,
        protocol_fee_bps: u16,
    ) -> Task {
        Task {
            reward_amount,
            max_workers: required_completions,
            current_workers: required_completions,
            status: TaskStatus::InProgress,
            task_type,
            required_completions,
            completions,
            protocol_fee_bps,
            ..Task::default()
        }
    }

    fn busy_worker(active_tasks: u8) -> AgentRegistration {
        AgentRegistration {
            status: AgentStatus::Busy,
            active_tasks,
            reputation: 100,
            ..AgentRegistration::default()
        }
    }

    mod reward_split_tests {
        use super::*;

        #[test]
        fn test_exclusive_full_reward_minus_fee() {
            let task = create_test_task(TaskType::Exclusive, 1_000_000, 1, 0, 100);
            let (worker_reward, fee) = calculate_reward_split(&task).unwrap();
            assert_eq!(fee, 10_000);
            assert_eq!(worker_reward, 990_000);
        }

        #[test]
        fn test_zero_fee() {
            let task = create_test_task(TaskType::Competitive, 777, 1, 0, 0);
            assert_eq!(calculate_reward_split(&task).unwrap(), (777, 0));
        }

        #[test]
        fn test_fee_truncates() {
            // 99 * 100 / 10000 = 0.99 -> 0
            let task = create_test_task(TaskType::Exclusive, 99, 1, 0, 100);
            assert_eq!(calculate_reward_split(&task).unwrap(), (99, 0));
        }

        #[test]
        fn test_collaborative_equal_split() {
            let task = create_test_task(TaskType::Collaborative, 1_000_000, 2, 0, 0);
            assert_eq!(calculate_reward_split(&task).unwrap(), (500_000, 0));
        }

        #[test]
        fn test_collaborative_remainder_goes_to_last() {
            let first = create_test_task(TaskType::Collaborative, 1_000, 3, 0, 0);
            let second = create_test_task(TaskType::Collaborative, 1_000, 3, 1, 0);
            let last = create_test_task(TaskType::Collaborative, 1_000, 3, 2, 0);

            let total = calculate_reward_split(&first).unwrap().0
                + calculate_reward_split(&second).unwrap().0
                + calculate_reward_split(&last).unwrap().0;
            assert_eq!(calculate_reward_split(&first).unwrap().0, 333);
            assert_eq!(calculate_reward_split(&last).unwrap().0, 334);
            assert_eq!(total, 1_000);
        }

        #[test]
        fn test_max_reward_does_not_overflow_with_zero_fee() {
            let task = create_test_task(TaskType::Exclusive, u64::MAX, 1, 0, 0);
            assert_eq!(calculate_reward_split(&task).unwrap(), (u64::MAX, 0));
        }

        #[test]
        fn test_max_reward_with_capped_fee() {
            let task = create_test_task(TaskType::Exclusive, u64::MAX, 1, 0, 1000);
            let (worker_reward, fee) = calculate_reward_split(&task).unwrap();
            assert_eq!(fee, u64::MAX / 10);
            assert_eq!(worker_reward + fee, u64::MAX);
        }

        #[test]
        fn test_large_reward_fee_matches_wide_math() {
            let reward = u64::MAX / 50;
            let task = create_test_task(TaskType::Exclusive, reward, 1, 0, 100);
            let (worker_reward, fee) = calculate_reward_split(&task).unwrap();
            assert_eq!(fee as u128, reward as u128 * 100 / 10_000);
            assert_eq!(worker_reward, reward - fee);
        }
    }

    mod worker_state_tests {
        use super::*;

        #[test]
        fn test_update_worker_state_releases_busy() {
            let mut worker = busy_worker(1);
            update_worker_state(&mut worker, 500, true, 42).unwrap();
            assert_eq!(worker.active_tasks, 0);
            assert_eq!(worker.status, AgentStatus::Active);
            assert_eq!(worker.tasks_completed, 1);
            assert_eq!(worker.total_earned, 500);
            assert_eq!(worker.reputation, 200);
            assert_eq!(worker.last_active, 42);
        }

        #[test]
        fn test_reputation_caps_at_max() {
            let mut worker = busy_worker(1);
            worker.reputation = MAX_REPUTATION - 50;
            update_worker_state(&mut worker, 0, true, 0).unwrap();
            assert_eq!(worker.reputation, MAX_REPUTATION);
        }

        #[test]
        fn test_release_without_active_task_fails() {
            let mut worker = busy_worker(0);
            assert!(error_matches(
                &release_worker(&mut worker, true).unwrap_err(),
                CoordinationError::ArithmeticOverflow
            ));
        }

        #[test]
        fn test_release_open_claim_skips_completed() {
            let mut worker = busy_worker(1);
            let mut done = TaskClaim {
                is_completed: true,
                ..TaskClaim::default()
            };
            assert!(!release_open_claim(&mut done, &mut worker, true, 5).unwrap());
            assert_eq!(worker.active_tasks, 1);

            let mut open = TaskClaim::default();
            assert!(release_open_claim(&mut open, &mut worker, true, 5).unwrap());
            assert_eq!(worker.active_tasks, 0);
            assert!(open.is_completed && !open.is_validated);
            assert_eq!(open.completed_at, 5);
            assert!(!release_open_claim(&mut open, &mut worker, true, 6).unwrap());
        }

        #[test]
        fn test_suspended_status_survives_release() {
            let mut worker = busy_worker(1);
            worker.status = AgentStatus::Suspended;
            worker.holds_exclusive = true;
            release_worker(&mut worker, true).unwrap();
            assert_eq!(worker.status, AgentStatus::Suspended);
            assert!(!worker.holds_exclusive);
        }

        #[test]
        fn test_shared_release_keeps_busy() {
            let mut worker = busy_worker(2);
            worker.holds_exclusive = true;
            release_worker(&mut worker, false).unwrap();
            assert_eq!(worker.active_tasks, 1);
            assert_eq!(worker.status, AgentStatus::Busy);
            assert!(worker.holds_exclusive);
        }
    }

    mod settlement_tests {
        use super::*;

        #[test]
        fn test_settle_share_updates_escrow_and_claim() {
            let mut task = create_test_task(TaskType::Exclusive, 1_000, 1, 0, 500);
            let mut escrow = TaskEscrow {
                amount: 1_000,
                ..TaskEscrow::default()
            };
            let mut claim = TaskClaim::default();
            let mut worker = busy_worker(1);

            let payout =
                settle_completion_share(&mut task, &mut escrow, &mut claim, &mut worker, 9)
                    .unwrap();

            assert_eq!(payout.to_worker, 950);
            assert_eq!(payout.to_treasury, 50);
            assert_eq!(escrow.distributed, 1_000);
            assert!(claim.is_completed && claim.is_validated);
            assert_eq!(claim.reward_paid, 950);
            assert_eq!(task.completions, 1);
        }

        #[test]
        fn test_settle_share_rejects_overdrawn_escrow() {
            let mut task = create_test_task(TaskType::Exclusive, 1_000, 1, 0, 0);
            let mut escrow = TaskEscrow {
                amount: 1_000,
                distributed: 1,
                ..TaskEscrow::default()
            };
            let mut claim = TaskClaim::default();
            let mut worker = busy_worker(1);

            let err = settle_completion_share(&mut task, &mut escrow, &mut claim, &mut worker, 0)
                .unwrap_err();
            assert!(error_matches(
                &err,
                CoordinationError::InsufficientEscrowBalance
            ));
            assert!(!claim.is_completed);
        }

        #[test]
        fn test_finish_task_rejects_terminal() {
            let mut task = create_test_task(TaskType::Exclusive, 1, 1, 1, 0);
            task.status = TaskStatus::Cancelled;
            let mut escrow = TaskEscrow::default();
            assert!(error_matches(
                &finish_task(&mut task, &mut escrow, [0u8; 64], 0).unwrap_err(),
                CoordinationError::InvalidStatusTransition
            ));
        }

        #[test]
        fn test_protocol_stats() {
            let mut config = ProtocolConfig::default();
            update_protocol_stats(&mut config, 500, false).unwrap();
            update_protocol_stats(&mut config, 700, true).unwrap();
            assert_eq!(config.completed_tasks, 1);
            assert_eq!(config.total_value_distributed, 1_200);
        }
    }
}
