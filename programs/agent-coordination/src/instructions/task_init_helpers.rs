//! Shared helpers for task initialization

use crate::errors::CoordinationError;
use crate::state::{capability, ProtocolConfig, Task, TaskEscrow, TaskStatus, TaskType};
use anchor_lang::prelude::*;

/// Caller-supplied task parameters, validated before any account is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskParams {
    pub task_id: [u8; 32],
    pub required_capabilities: u64,
    pub description: [u8; 64],
    pub reward_amount: u64,
    pub max_workers: u8,
    pub deadline: i64,
    pub task_type: u8,
}

/// Validates task parameters and decodes the task type.
pub fn validate_task_params(params: &TaskParams, now: i64) -> Result<TaskType> {
    require!(params.task_id != [0u8; 32], CoordinationError::InvalidTaskId);
    require!(
        params.required_capabilities != 0 && capability::is_defined(params.required_capabilities),
        CoordinationError::InvalidCapabilities
    );
    require!(params.reward_amount > 0, CoordinationError::InvalidReward);
    require!(params.max_workers > 0, CoordinationError::InvalidMaxWorkers);

    let task_type = TaskType::try_from(params.task_type)?;
    if task_type == TaskType::Exclusive {
        require!(params.max_workers == 1, CoordinationError::InvalidMaxWorkers);
    }

    validate_deadline(params.deadline, now)?;
    Ok(task_type)
}

/// A deadline of 0 means none; otherwise it may not lie in the past.
pub fn validate_deadline(deadline: i64, now: i64) -> Result<()> {
    require!(
        deadline == 0 || deadline >= now,
        CoordinationError::InvalidDeadline
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn init_task_fields(
    task: &mut Task,
    params: &TaskParams,
    task_type: TaskType,
    creator: Pubkey,
    escrow_key: Pubkey,
    bump: u8,
    protocol_fee_bps: u16,
    timestamp: i64,
) {
    task.task_id = params.task_id;
    task.creator = creator;
    task.required_capabilities = params.required_capabilities;
    task.description = params.description;
    task.reward_amount = params.reward_amount;
    task.max_workers = params.max_workers;
    task.current_workers = 0;
    task.status = TaskStatus::Open;
    task.task_type = task_type;
    task.created_at = timestamp;
    task.deadline = params.deadline;
    task.completed_at = 0;
    task.escrow = escrow_key;
    task.result = [0u8; 64];
    task.completions = 0;
    task.required_completions = match task_type {
        TaskType::Collaborative => params.max_workers,
        TaskType::Exclusive | TaskType::Competitive => 1,
    };
    task.bump = bump;
    task.protocol_fee_bps = protocol_fee_bps;
}

/// Initializes escrow account fields.
pub fn init_escrow_fields(escrow: &mut TaskEscrow, task_key: Pubkey, amount: u64, bump: u8) {
    escrow.task = task_key;
    escrow.amount = amount;
    escrow.distributed = 0;
    escrow.is_closed = false;
    escrow.bump = bump;
}

/// Increments protocol_config.total_tasks with checked arithmetic.
pub fn increment_total_tasks(protocol_config: &mut ProtocolConfig) -> Result<()> {
    protocol_config.total_tasks = protocol_config
        .total_tasks
        .checked_add(1)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;

    fn params() -> TaskParams {
        TaskParams {
            task_id: [1u8; 32],
            required_capabilities: capability::COMPUTE,
            description: [0u8; 64],
            reward_amount: 1_000_000,
            max_workers: 1,
            deadline: 0,
            task_type: 0,
        }
    }

    fn assert_rejected(params: TaskParams, now: i64, expected: CoordinationError) {
        let err = validate_task_params(&params, now).unwrap_err();
        assert!(error_matches(&err, expected));
    }

    #[test]
    fn test_valid_params() {
        assert_eq!(
            validate_task_params(&params(), 100).unwrap(),
            TaskType::Exclusive
        );
        let collab = TaskParams {
            max_workers: 255,
            task_type: 1,
            deadline: 100,
            ..params()
        };
        assert_eq!(
            validate_task_params(&collab, 100).unwrap(),
            TaskType::Collaborative
        );
    }

    #[test]
    fn test_zero_reward_rejected() {
        assert_rejected(
            TaskParams {
                reward_amount: 0,
                ..params()
            },
            0,
            CoordinationError::InvalidReward,
        );
    }

    #[test]
    fn test_past_deadline_rejected() {
        assert_rejected(
            TaskParams {
                deadline: 99,
                ..params()
            },
            100,
            CoordinationError::InvalidDeadline,
        );
    }

    #[test]
    fn test_zero_task_id_and_capabilities_rejected() {
        assert_rejected(
            TaskParams {
                task_id: [0u8; 32],
                ..params()
            },
            0,
            CoordinationError::InvalidTaskId,
        );
        assert_rejected(
            TaskParams {
                required_capabilities: 0,
                ..params()
            },
            0,
            CoordinationError::InvalidCapabilities,
        );
    }

    #[test]
    fn test_worker_bounds() {
        assert_rejected(
            TaskParams {
                max_workers: 0,
                task_type: 2,
                ..params()
            },
            0,
            CoordinationError::InvalidMaxWorkers,
        );
        assert_rejected(
            TaskParams {
                max_workers: 2,
                ..params()
            },
            0,
            CoordinationError::InvalidMaxWorkers,
        );
        assert_rejected(
            TaskParams {
                task_type: 3,
                ..params()
            },
            0,
            CoordinationError::InvalidTaskType,
        );
    }

    #[test]
    fn test_required_completions_by_type() {
        let mut task = Task::default();
        let collab = TaskParams {
            max_workers: 4,
            task_type: 1,
            ..params()
        };
        init_task_fields(
            &mut task,
            &collab,
            TaskType::Collaborative,
            Pubkey::default(),
            Pubkey::default(),
            0,
            100,
            7,
        );
        assert_eq!(task.required_completions, 4);
        assert_eq!(task.protocol_fee_bps, 100);
        assert_eq!(task.created_at, 7);

        let competitive = TaskParams {
            max_workers: 4,
            task_type: 2,
            ..params()
        };
        init_task_fields(
            &mut task,
            &competitive,
            TaskType::Competitive,
            Pubkey::default(),
            Pubkey::default(),
            0,
            0,
            0,
        );
        assert_eq!(task.required_completions, 1);
        assert_eq!(task.status, TaskStatus::Open);
    }
}
