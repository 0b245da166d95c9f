//! Dispute settlement shared by `vote_dispute` and the expiry path.

use crate::errors::CoordinationError;
use crate::instructions::completion_helpers::{
    finish_task, release_open_claim, settle_completion_share,
};
use crate::instructions::lamport_transfer::EscrowPayout;
use crate::state::{
    AgentRegistration, Dispute, DisputeStatus, ResolutionType, Task, TaskClaim, TaskEscrow,
    TaskStatus, TaskType,
};
use anchor_lang::prelude::*;

/// Outcome of settling a dispute at quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisputeSettlement {
    /// Resolution actually applied
    pub applied: ResolutionType,
    pub payout: EscrowPayout,
    /// The task ended Completed rather than Cancelled
    pub task_completed: bool,
}

/// True once `total_voters` reached the protocol threshold.
pub fn has_quorum(dispute: &Dispute, threshold: u8) -> bool {
    dispute.total_voters >= threshold
}

/// Settles the escrow of a disputed task.
///
/// An approved dispute applies its proposed resolution, anything else
/// applies Refund. The escrow is closed in every case and the claimant's
/// slot is released. Refund and Split close the claim unvalidated.
pub fn settle_dispute(
    dispute: &mut Dispute,
    task: &mut Task,
    escrow: &mut TaskEscrow,
    claim: &mut TaskClaim,
    claimant: &mut AgentRegistration,
    now: i64,
) -> Result<DisputeSettlement> {
    require!(
        dispute.status == DisputeStatus::Active,
        CoordinationError::DisputeNotActive
    );
    require!(
        task.status == TaskStatus::Disputed,
        CoordinationError::InvalidStatusTransition
    );
    require!(!escrow.is_closed, CoordinationError::EscrowClosed);

    let applied = if dispute.is_approved() {
        dispute.resolution_type
    } else {
        ResolutionType::Refund
    };
    let exclusive = task.task_type == TaskType::Exclusive;

    let (payout, task_completed) = match applied {
        ResolutionType::Refund => {
            let refund = escrow.remaining()?;
            release_open_claim(claim, claimant, exclusive, now)?;
            cancel_disputed(task, escrow)?;
            (EscrowPayout::refund(refund), false)
        }
        ResolutionType::Complete => {
            let mut payout = settle_completion_share(task, escrow, claim, claimant, now)?;
            // Anything one share does not cover goes back to the creator,
            // still counted as distributed so the escrow ends balanced.
            let sweep = escrow.remaining()?;
            escrow.distributed = escrow
                .distributed
                .checked_add(sweep)
                .ok_or(CoordinationError::ArithmeticOverflow)?;
            payout.to_creator = sweep;
            finish_task(task, escrow, claim.result_data, now)?;
            (payout, true)
        }
        ResolutionType::Split => {
            let remaining = escrow.remaining()?;
            let to_worker = remaining / 2;
            let to_creator = remaining
                .checked_sub(to_worker)
                .ok_or(CoordinationError::ArithmeticOverflow)?;

            escrow.distributed = escrow
                .distributed
                .checked_add(to_worker)
                .ok_or(CoordinationError::ArithmeticOverflow)?;
            claimant.total_earned = claimant
                .total_earned
                .checked_add(to_worker)
                .ok_or(CoordinationError::ArithmeticOverflow)?;
            release_open_claim(claim, claimant, exclusive, now)?;
            claim.reward_paid = to_worker;
            cancel_disputed(task, escrow)?;

            (
                EscrowPayout {
                    to_worker,
                    to_treasury: 0,
                    to_creator,
                },
                false,
            )
        }
    };

    dispute.status = DisputeStatus::Resolved;
    dispute.resolved_at = now;

    Ok(DisputeSettlement {
        applied,
        payout,
        task_completed,
    })
}

fn cancel_disputed(task: &mut Task, escrow: &mut TaskEscrow) -> Result<()> {
    require!(
        task.status.can_transition_to(TaskStatus::Cancelled),
        CoordinationError::InvalidStatusTransition
    );
    task.status = TaskStatus::Cancelled;
    escrow.is_closed = true;
    Ok(())
}

/// Expires a dispute whose voting window closed without quorum and returns
/// the task to InProgress.
pub fn expire_dispute(
    dispute: &mut Dispute,
    task: &mut Task,
    threshold: u8,
    now: i64,
) -> Result<()> {
    require!(
        dispute.status == DisputeStatus::Active,
        CoordinationError::DisputeNotActive
    );
    require!(
        now >= dispute.voting_deadline,
        CoordinationError::VotingNotEnded
    );
    require!(
        !has_quorum(dispute, threshold),
        CoordinationError::DisputeQuorumReached
    );
    require!(
        task.status == TaskStatus::Disputed
            && task.status.can_transition_to(TaskStatus::InProgress),
        CoordinationError::InvalidStatusTransition
    );

    dispute.status = DisputeStatus::Expired;
    dispute.resolved_at = now;
    task.status = TaskStatus::InProgress;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;
    use crate::state::AgentStatus;

    struct Setup {
        dispute: Dispute,
        task: Task,
        escrow: TaskEscrow,
        claim: TaskClaim,
        claimant: AgentRegistration,
    }

    impl Setup {
        fn new(resolution_type: ResolutionType, votes_for: u8, votes_against: u8) -> Self {
            Self {
                dispute: Dispute {
                    resolution_type,
                    status: DisputeStatus::Active,
                    votes_for,
                    votes_against,
                    total_voters: votes_for + votes_against,
                    voting_deadline: 1_000,
                    ..Dispute::default()
                },
                task: Task {
                    reward_amount: 1_000,
                    status: TaskStatus::Disputed,
                    task_type: TaskType::Exclusive,
                    current_workers: 1,
                    protocol_fee_bps: 100,
                    ..Task::default()
                },
                escrow: TaskEscrow {
                    amount: 1_000,
                    ..TaskEscrow::default()
                },
                claim: TaskClaim {
                    task: Pubkey::new_from_array([1u8; 32]),
                    worker: Pubkey::new_from_array([2u8; 32]),
                    ..TaskClaim::default()
                },
                claimant: AgentRegistration {
                    status: AgentStatus::Busy,
                    active_tasks: 1,
                    reputation: 100,
                    ..AgentRegistration::default()
                },
            }
        }

        fn settle(&mut self) -> Result<DisputeSettlement> {
            settle_dispute(
                &mut self.dispute,
                &mut self.task,
                &mut self.escrow,
                &mut self.claim,
                &mut self.claimant,
                500,
            )
        }
    }

    #[test]
    fn test_approved_complete_pays_claimant() {
        let mut s = Setup::new(ResolutionType::Complete, 2, 1);
        let settlement = s.settle().unwrap();

        assert_eq!(settlement.applied, ResolutionType::Complete);
        assert!(settlement.task_completed);
        assert_eq!(settlement.payout.to_worker, 990);
        assert_eq!(settlement.payout.to_treasury, 10);
        assert_eq!(settlement.payout.to_creator, 0);
        assert_eq!(s.task.status, TaskStatus::Completed);
        assert_eq!(s.escrow.distributed, 1_000);
        assert!(s.escrow.is_closed);
        assert!(s.claim.is_completed && s.claim.is_validated);
        assert_eq!(s.claimant.active_tasks, 0);
        assert_eq!(s.claimant.status, AgentStatus::Active);
        assert_eq!(s.dispute.status, DisputeStatus::Resolved);
        assert_eq!(s.dispute.resolved_at, 500);
    }

    #[test]
    fn test_complete_on_collaborative_sweeps_rest_to_creator() {
        let mut s = Setup::new(ResolutionType::Complete, 1, 0);
        s.task.task_type = TaskType::Collaborative;
        s.task.required_completions = 4;
        s.task.protocol_fee_bps = 0;

        let settlement = s.settle().unwrap();

        assert_eq!(settlement.payout.to_worker, 250);
        assert_eq!(settlement.payout.to_creator, 750);
        assert_eq!(s.escrow.distributed, 1_000);
        assert_eq!(s.task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_split_halves_remaining() {
        let mut s = Setup::new(ResolutionType::Split, 3, 0);
        s.escrow.amount = 1_001;

        let settlement = s.settle().unwrap();

        assert_eq!(settlement.payout.to_worker, 500);
        assert_eq!(settlement.payout.to_creator, 501);
        assert_eq!(settlement.payout.to_treasury, 0);
        assert_eq!(s.escrow.distributed, 500);
        assert_eq!(s.claim.reward_paid, 500);
        assert!(s.claim.is_completed && !s.claim.is_validated);
        assert_eq!(s.claimant.total_earned, 500);
        assert_eq!(s.claimant.active_tasks, 0);
        assert_eq!(s.task.status, TaskStatus::Cancelled);
        assert!(s.escrow.is_closed);
    }

    #[test]
    fn test_tie_applies_refund() {
        let mut s = Setup::new(ResolutionType::Complete, 1, 1);
        let settlement = s.settle().unwrap();

        assert_eq!(settlement.applied, ResolutionType::Refund);
        assert_eq!(settlement.payout, EscrowPayout::refund(1_000));
        assert_eq!(s.escrow.distributed, 0);
        assert_eq!(s.task.status, TaskStatus::Cancelled);
        assert!(s.claim.is_completed && !s.claim.is_validated);
        assert_eq!(s.claim.reward_paid, 0);
        assert_eq!(s.claimant.active_tasks, 0);
    }

    #[test]
    fn test_rejected_split_refunds() {
        let mut s = Setup::new(ResolutionType::Split, 0, 2);
        let settlement = s.settle().unwrap();
        assert_eq!(settlement.applied, ResolutionType::Refund);
        assert_eq!(settlement.payout.to_worker, 0);
    }

    #[test]
    fn test_settle_requires_active_dispute() {
        let mut s = Setup::new(ResolutionType::Refund, 1, 0);
        s.dispute.status = DisputeStatus::Resolved;
        assert!(error_matches(
            &s.settle().unwrap_err(),
            CoordinationError::DisputeNotActive
        ));
        assert_eq!(s.task.status, TaskStatus::Disputed);
    }

    #[test]
    fn test_expire_after_deadline() {
        let mut s = Setup::new(ResolutionType::Refund, 1, 0);
        expire_dispute(&mut s.dispute, &mut s.task, 3, 1_000).unwrap();
        assert_eq!(s.dispute.status, DisputeStatus::Expired);
        assert_eq!(s.dispute.resolved_at, 1_000);
        assert_eq!(s.task.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_expire_before_deadline_fails() {
        let mut s = Setup::new(ResolutionType::Refund, 0, 0);
        assert!(error_matches(
            &expire_dispute(&mut s.dispute, &mut s.task, 3, 999).unwrap_err(),
            CoordinationError::VotingNotEnded
        ));
        assert_eq!(s.dispute.status, DisputeStatus::Active);
    }

    #[test]
    fn test_expire_with_quorum_fails() {
        let mut s = Setup::new(ResolutionType::Refund, 2, 1);
        assert!(error_matches(
            &expire_dispute(&mut s.dispute, &mut s.task, 3, 2_000).unwrap_err(),
            CoordinationError::DisputeQuorumReached
        ));
    }

    #[test]
    fn test_expire_twice_fails() {
        let mut s = Setup::new(ResolutionType::Refund, 0, 0);
        expire_dispute(&mut s.dispute, &mut s.task, 1, 1_000).unwrap();
        assert!(error_matches(
            &expire_dispute(&mut s.dispute, &mut s.task, 1, 1_000).unwrap_err(),
            CoordinationError::DisputeNotActive
        ));
    }
}
