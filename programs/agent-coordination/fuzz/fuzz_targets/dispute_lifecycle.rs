//! Fuzz target for the dispute lifecycle: initiate, settle, expire
//!
//! Tests invariants:
//! - Only the creator or the claimant opens a dispute on an InProgress task
//! - A resolved dispute leaves the escrow closed and balanced
//! - An expired dispute hands the task back to its workers
//! - Other claimants are released when a dispute settles
//!
//! Run with: cargo test --release -p agent-coordination-fuzz dispute_lifecycle

use crate::*;
use agent_coordination::errors::{error_matches, CoordinationError};
use agent_coordination::instructions::constants::DISPUTE_VOTING_PERIOD;
use agent_coordination::state::{
    capability, AgentRegistration, AgentStatus, Dispute, DisputeStatus, ResolutionType, Task,
    TaskEscrow, TaskStatus, TaskType,
};
use proptest::prelude::*;

#[test]
fn test_dispute_resolved_by_majority() {
    let world = dispute_resolved_by_vote().unwrap();
    let dispute_key = world.disputes[0];
    let dispute = world.ledger.get::<Dispute>(&dispute_key).unwrap();
    assert_eq!(dispute.status, DisputeStatus::Resolved);
    assert_eq!((dispute.votes_for, dispute.votes_against), (2, 1));
    assert_eq!(dispute.resolved_at, world.ledger.now());

    let task = world.ledger.get::<Task>(&dispute.task).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    let fee = SCENARIO_REWARD * SCENARIO_FEE_BPS as u64 / 10_000;
    assert_eq!(
        world.ledger.balance(&world.actor(0)),
        STARTING_BALANCE + SCENARIO_REWARD - fee
    );
    assert_eq!(world.ledger.balance(&TREASURY), fee);

    let worker = world.ledger.get::<AgentRegistration>(&world.agent(0)).unwrap();
    assert_eq!(worker.status, AgentStatus::Active);
    assert_eq!(worker.tasks_completed, 1);
    assert!(check_ledger(&world.ledger).is_empty());
}

#[test]
fn test_expired_dispute_returns_task_to_workers() {
    let mut world = dispute_expires_without_quorum().unwrap();
    let dispute = world.disputes[0];
    let task = world.tasks[0];

    assert_eq!(
        world.ledger.get::<Dispute>(&dispute).unwrap().status,
        DisputeStatus::Expired
    );
    assert_eq!(
        world.ledger.get::<Task>(&task).unwrap().status,
        TaskStatus::InProgress
    );

    // The worker finishes the task as if the dispute never happened
    let outcome = world
        .ledger
        .complete_task(world.actor(0), task, SCENARIO_PROOF, None)
        .unwrap();
    assert!(outcome.task_completed);

    let err = world
        .ledger
        .vote_dispute(world.actor(ARBITERS[1]), dispute, true)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::DisputeNotActive));
    let err = world.ledger.resolve_expired_dispute(dispute).unwrap_err();
    assert!(error_matches(&err, CoordinationError::DisputeNotActive));
    assert!(check_ledger(&world.ledger).is_empty());
}

#[test]
fn test_expiry_waits_for_voting_deadline() {
    let (mut world, dispute) = disputed_world().unwrap();
    world.ledger.advance(DISPUTE_VOTING_PERIOD - 1);
    let err = world.ledger.resolve_expired_dispute(dispute).unwrap_err();
    assert!(error_matches(&err, CoordinationError::VotingNotEnded));

    world.ledger.advance(1);
    world.ledger.resolve_expired_dispute(dispute).unwrap();
}

#[test]
fn test_expired_dispute_can_be_reopened() {
    let mut world = dispute_expires_without_quorum().unwrap();
    let task = world.tasks[0];
    world
        .open_dispute(world.actor(0), task, world.agent(0), ResolutionType::Split as u8)
        .unwrap();
    assert_eq!(
        world.ledger.get::<Task>(&task).unwrap().status,
        TaskStatus::Disputed
    );
    assert_eq!(world.ledger.protocol_config().unwrap().total_disputes, 2);
}

#[test]
fn test_dispute_requires_in_progress_task() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    // One of two slots taken keeps the task Open
    let task = world
        .create_task(CREATOR, TaskType::Collaborative, 2, 1_000, capability::COMPUTE, 0)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();

    let err = world
        .open_dispute(world.actor(CREATOR), task, world.agent(0), ResolutionType::Refund as u8)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::TaskNotInProgress));
}

#[test]
fn test_disputed_task_rejects_second_dispute() {
    let (mut world, _) = disputed_world().unwrap();
    let task = world.tasks[0];
    let err = world
        .open_dispute(world.actor(0), task, world.agent(0), ResolutionType::Refund as u8)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::TaskNotInProgress));
}

#[test]
fn test_outsider_cannot_dispute() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, 1_000, capability::COMPUTE, 0)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();

    let err = world
        .open_dispute(world.actor(1), task, world.agent(0), ResolutionType::Refund as u8)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::NotTaskParticipant));
    assert!(world.disputes.is_empty());
}

#[test]
fn test_unknown_resolution_type_rejected() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, 1_000, capability::COMPUTE, 0)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();

    let err = world
        .open_dispute(world.actor(CREATOR), task, world.agent(0), 3)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::InvalidResolutionType));
}

#[test]
fn test_dispute_on_expired_task_rejected() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let deadline = world.ledger.now() + 10;
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, 1_000, capability::COMPUTE, deadline)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();
    world.ledger.set_time(deadline + 1);

    let err = world
        .open_dispute(world.actor(CREATOR), task, world.agent(0), ResolutionType::Refund as u8)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::TaskExpired));
}

#[test]
fn test_duplicate_dispute_id_rejected() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    world.register(1, capability::COMPUTE).unwrap();
    let dispute_id = world.fresh_id();
    let mut tasks = Vec::new();
    for index in 0..2 {
        let task = world
            .create_task(CREATOR, TaskType::Exclusive, 1, 1_000, capability::COMPUTE, 0)
            .unwrap();
        world.ledger.claim_task(world.actor(index), task).unwrap();
        tasks.push(task);
    }
    let creator = world.actor(CREATOR);

    world
        .ledger
        .initiate_dispute(creator, dispute_id, tasks[0], world.agent(0), [1u8; 32], 0)
        .unwrap();
    let err = world
        .ledger
        .initiate_dispute(creator, dispute_id, tasks[1], world.agent(1), [1u8; 32], 0)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::AddressInUse));
    assert_eq!(
        world.ledger.get::<Task>(&tasks[1]).unwrap().status,
        TaskStatus::InProgress
    );
}

#[test]
fn test_split_gives_odd_lamport_to_creator() {
    let mut world = World::new(1, SCENARIO_FEE_BPS).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    world.register(ARBITERS[0], capability::VERIFICATION).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, 1_000_001, capability::COMPUTE, 0)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();
    let creator = world.actor(CREATOR);
    let creator_before = world.ledger.balance(&creator);
    let dispute = world
        .open_dispute(creator, task, world.agent(0), ResolutionType::Split as u8)
        .unwrap();

    let settlement = world
        .ledger
        .vote_dispute(world.actor(ARBITERS[0]), dispute, true)
        .unwrap()
        .unwrap();
    assert_eq!(settlement.applied, ResolutionType::Split);
    assert_eq!(settlement.payout.to_worker, 500_000);
    assert_eq!(settlement.payout.to_creator, 500_001);
    assert_eq!(settlement.payout.to_treasury, 0);
    assert_eq!(world.ledger.balance(&creator), creator_before + 500_001);

    let task_state = world.ledger.get::<Task>(&task).unwrap();
    assert_eq!(task_state.status, TaskStatus::Cancelled);
    let escrow = world.ledger.get::<TaskEscrow>(&task_state.escrow).unwrap();
    assert!(escrow.is_closed);
    assert_eq!(escrow.distributed, 500_000);
    assert!(check_ledger(&world.ledger).is_empty());
}

#[test]
fn test_settlement_releases_arbiter_claim() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let arbiter = ARBITERS[0];
    world.register(arbiter, capability::ALL_DEFINED).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Collaborative, 2, 2_000, capability::COMPUTE, 0)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();
    world.ledger.claim_task(world.actor(arbiter), task).unwrap();
    let dispute = world
        .open_dispute(world.actor(CREATOR), task, world.agent(0), ResolutionType::Refund as u8)
        .unwrap();

    world
        .ledger
        .vote_dispute(world.actor(arbiter), dispute, true)
        .unwrap()
        .unwrap();

    let arbiter_state = world
        .ledger
        .get::<AgentRegistration>(&world.agent(arbiter))
        .unwrap();
    assert_eq!(arbiter_state.active_tasks, 0);
    assert!(arbiter_state.last_active > 0);
    assert_eq!(
        world.ledger.get::<Task>(&task).unwrap().status,
        TaskStatus::Cancelled
    );
    assert!(check_ledger(&world.ledger).is_empty());
}

#[test]
fn test_quorum_skips_deregistered_finisher() {
    let mut world = World::new(1, 0).unwrap();
    for worker in [0, 1, 3] {
        world.register(worker, capability::COMPUTE).unwrap();
    }
    world.register(ARBITERS[0], capability::VERIFICATION).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Collaborative, 3, 3_000, capability::COMPUTE, 0)
        .unwrap();
    for worker in [0, 1, 3] {
        world.ledger.claim_task(world.actor(worker), task).unwrap();
    }
    world
        .ledger
        .complete_task(world.actor(0), task, [1u8; 32], None)
        .unwrap();
    world.ledger.deregister_agent(world.actor(0)).unwrap();

    let dispute = world
        .open_dispute(world.actor(CREATOR), task, world.agent(1), ResolutionType::Refund as u8)
        .unwrap();
    let settlement = world
        .ledger
        .vote_dispute(world.actor(ARBITERS[0]), dispute, true)
        .unwrap()
        .unwrap();
    assert_eq!(settlement.applied, ResolutionType::Refund);
    assert_eq!(settlement.payout.to_creator, 2_000);

    for worker in [1, 3] {
        let record = world.ledger.get::<AgentRegistration>(&world.agent(worker)).unwrap();
        assert_eq!(record.active_tasks, 0);
    }
    assert_eq!(
        world.ledger.get::<Dispute>(&dispute).unwrap().status,
        DisputeStatus::Resolved
    );
    assert!(check_ledger(&world.ledger).is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Disputes opened at any point of an arbitrary sequence settle or
    /// expire without breaking an invariant
    #[test]
    fn fuzz_dispute_lifecycle(
        seq in any::<OpSequence>(),
        resolution in arb_resolution_type(),
        approvals in proptest::collection::vec(any::<bool>(), 0..4),
        expire in any::<bool>(),
    ) {
        let (mut world, dispute) = disputed_world().unwrap();
        let mut reports = Vec::new();
        for (index, op) in seq.ops.iter().enumerate().take(20) {
            let before = world.ledger.clone();
            let accepted = world.apply(op).is_ok();
            let mut violations = check_ledger(&world.ledger);
            violations.extend(check_transition(&before, &world.ledger));
            reports.push(StepReport { index, op: op.clone(), accepted, violations });
        }
        let violations = collect_violations(&reports);
        prop_assert!(violations.is_empty(), "violations: {:#?}", violations);

        let task = world.tasks[0];
        let claimant = world.agent(0);
        let reopened = world
            .open_dispute(world.actor(CREATOR), task, claimant, resolution)
            .ok();
        let target = reopened.unwrap_or(dispute);

        for (arbiter, approve) in ARBITERS.into_iter().zip(approvals) {
            let _ = world.ledger.vote_dispute(world.actor(arbiter), target, approve);
        }
        if expire {
            world.ledger.advance(DISPUTE_VOTING_PERIOD);
            let _ = world.ledger.resolve_expired_dispute(target);
        }

        let state = world.ledger.get::<Dispute>(&target).unwrap();
        let task_state = world.ledger.get::<Task>(&task).unwrap();
        match state.status {
            DisputeStatus::Active => prop_assert_eq!(task_state.status, TaskStatus::Disputed),
            DisputeStatus::Resolved => prop_assert!(task_state.status.is_terminal()),
            // A later dispute may hold the task again
            DisputeStatus::Expired => prop_assert!(state.resolved_at >= state.voting_deadline),
        }
        prop_assert!(check_ledger(&world.ledger).is_empty());
    }
}
