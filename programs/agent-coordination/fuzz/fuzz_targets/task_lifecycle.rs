//! Fuzz target for full task lifecycle state transitions
//!
//! Tests invariants:
//! - Every ledger invariant holds after arbitrary operation sequences
//! - Rejected operations leave no trace
//! - Cancel refunds amount - distributed and closes the escrow
//! - Agent registration lifecycle
//!
//! Run with: cargo test --release -p agent-coordination-fuzz task_lifecycle

use crate::*;
use agent_coordination::errors::{error_matches, CoordinationError};
use agent_coordination::state::{
    capability, AgentRegistration, AgentStatus, Task, TaskEscrow, TaskStatus, TaskType,
};
use proptest::prelude::*;

#[test]
fn test_cancel_open_task_refunds_everything() {
    let world = cancel_open_task().unwrap();
    let task_key = world.tasks[0];
    let task = world.ledger.get::<Task>(&task_key).unwrap();
    let escrow = world.ledger.get::<TaskEscrow>(&task.escrow).unwrap();

    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(escrow.is_closed);
    assert_eq!(escrow.distributed, 0);
    assert_eq!(world.ledger.balance(&task.escrow), 0);
    assert_eq!(world.ledger.balance(&world.actor(CREATOR)), STARTING_BALANCE);
}

#[test]
fn test_cancel_requires_creator() {
    let mut world = World::new(1, 0).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, 1_000, capability::COMPUTE, 0)
        .unwrap();
    let err = world.ledger.cancel_task(world.actor(0), task).unwrap_err();
    assert!(error_matches(&err, CoordinationError::Unauthorized));
}

#[test]
fn test_in_progress_task_cancellable_only_after_deadline() {
    let mut world = World::new(1, 0).unwrap();
    let agent = world.register(0, capability::COMPUTE).unwrap();
    let deadline = world.ledger.now() + 50;
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, 1_000, capability::COMPUTE, deadline)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();
    let creator = world.actor(CREATOR);

    let err = world.ledger.cancel_task(creator, task).unwrap_err();
    assert!(error_matches(&err, CoordinationError::TaskNotCancellable));

    world.ledger.set_time(deadline + 1);
    let payout = world.ledger.cancel_task(creator, task).unwrap();
    assert_eq!(payout.to_creator, 1_000);

    // The claimant is released and its claim closed
    let worker = world.ledger.get::<AgentRegistration>(&agent).unwrap();
    assert_eq!(worker.active_tasks, 0);
    assert_eq!(worker.status, AgentStatus::Active);
    let err = world
        .ledger
        .complete_task(world.actor(0), task, [1u8; 32], None)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::AlreadyCompleted));
    assert!(check_ledger(&world.ledger).is_empty());
}

#[test]
fn test_cancel_skips_deregistered_finisher() {
    let mut world = World::new(1, 0).unwrap();
    register_all(&mut world, 3).unwrap();
    let deadline = world.ledger.now() + 100;
    let task = world
        .create_task(CREATOR, TaskType::Collaborative, 3, 3_000, capability::COMPUTE, deadline)
        .unwrap();
    for index in 0..3 {
        world.ledger.claim_task(world.actor(index), task).unwrap();
    }
    world
        .ledger
        .complete_task(world.actor(0), task, [1u8; 32], None)
        .unwrap();
    // The finisher leaves; its completed claim still sits on the task
    world.ledger.deregister_agent(world.actor(0)).unwrap();

    world.ledger.set_time(deadline + 1);
    let payout = world.ledger.cancel_task(world.actor(CREATOR), task).unwrap();
    assert_eq!(payout.to_creator, 2_000);

    assert_eq!(world.ledger.get::<Task>(&task).unwrap().status, TaskStatus::Cancelled);
    for index in 1..3 {
        let worker = world.ledger.get::<AgentRegistration>(&world.agent(index)).unwrap();
        assert_eq!(worker.active_tasks, 0);
        assert_eq!(worker.status, AgentStatus::Active);
    }
    assert!(check_ledger(&world.ledger).is_empty());
}

#[test]
fn test_terminal_task_not_cancellable() {
    let mut world = exclusive_completion().unwrap();
    let task = world.tasks[0];
    let err = world
        .ledger
        .cancel_task(world.actor(CREATOR), task)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::TaskNotCancellable));
}

#[test]
fn test_deregister_twice_matches_never_registered() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    world.ledger.deregister_agent(world.actor(0)).unwrap();

    let again = world.ledger.deregister_agent(world.actor(0)).unwrap_err();
    let never = world.ledger.deregister_agent(world.actor(1)).unwrap_err();
    assert!(error_matches(&again, CoordinationError::AgentNotFound));
    assert!(error_matches(&never, CoordinationError::AgentNotFound));
}

#[test]
fn test_deregister_blocked_by_open_claim() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, 1_000, capability::COMPUTE, 0)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();

    let err = world.ledger.deregister_agent(world.actor(0)).unwrap_err();
    assert!(error_matches(&err, CoordinationError::ActiveTasksRemaining));

    world
        .ledger
        .complete_task(world.actor(0), task, [1u8; 32], None)
        .unwrap();
    world.ledger.deregister_agent(world.actor(0)).unwrap();
}

#[test]
fn test_reregistration_after_deregister() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let err = world.register(0, capability::COMPUTE).unwrap_err();
    assert!(error_matches(&err, CoordinationError::AlreadyRegistered));

    world.ledger.deregister_agent(world.actor(0)).unwrap();
    let agent = world.register(0, capability::STORAGE).unwrap();

    let record = world.ledger.get::<AgentRegistration>(&agent).unwrap();
    assert_eq!(record.capabilities, capability::STORAGE);
    assert_eq!(record.reputation, 100);
    // total_agents counts registrations, not live agents
    assert_eq!(world.ledger.protocol_config().unwrap().total_agents, 2);
}

#[test]
fn test_update_validates_before_writing() {
    let mut world = World::new(1, 0).unwrap();
    let agent = world.register(0, capability::COMPUTE).unwrap();
    let before = world.ledger.fingerprint().unwrap();

    let err = world
        .ledger
        .update_agent(world.actor(0), Some(capability::STORAGE), Some("ftp://bad"), None)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::InvalidEndpoint));
    assert_eq!(world.ledger.fingerprint().unwrap(), before);

    world
        .ledger
        .update_agent(world.actor(0), Some(capability::STORAGE), None, Some("ipfs://meta"))
        .unwrap();
    let record = world.ledger.get::<AgentRegistration>(&agent).unwrap();
    assert_eq!(record.capabilities, capability::STORAGE);
    assert_eq!(record.metadata_uri, "ipfs://meta");
    assert_eq!(record.endpoint, ENDPOINT);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Arbitrary operation sequences never break an invariant, and a rejected
    /// operation leaves the ledger exactly as it was
    #[test]
    fn fuzz_task_lifecycle(seq in any::<OpSequence>()) {
        let reports = run_sequence(&seq).unwrap();
        let violations = collect_violations(&reports);
        prop_assert!(violations.is_empty(), "violations: {:#?}", violations);
    }

    /// Cancelling after partial collaborative completion refunds exactly the
    /// undistributed remainder and releases the remaining claimants
    #[test]
    fn fuzz_cancel_refund(
        reward in 1_000u64..1_000_000_000u64,
        workers in 2u8..=5u8,
        completed in 0u8..5u8,
        fee_bps in arb_valid_fee_bps(),
    ) {
        let completed = completed % workers;
        let mut world = World::new(1, fee_bps).unwrap();
        register_all(&mut world, workers).unwrap();
        let deadline = world.ledger.now() + 1_000;
        let task = world
            .create_task(CREATOR, TaskType::Collaborative, workers, reward, capability::COMPUTE, deadline)
            .unwrap();
        for index in 0..workers {
            world.ledger.claim_task(world.actor(index), task).unwrap();
        }
        for index in 0..completed {
            world.ledger.complete_task(world.actor(index), task, [1u8; 32], None).unwrap();
        }

        let escrow_key = world.ledger.get::<Task>(&task).unwrap().escrow;
        let distributed = world.ledger.get::<TaskEscrow>(&escrow_key).unwrap().distributed;
        let creator = world.actor(CREATOR);
        let creator_before = world.ledger.balance(&creator);

        world.ledger.set_time(deadline + 1);
        let payout = world.ledger.cancel_task(creator, task).unwrap();

        prop_assert_eq!(payout.to_creator, reward - distributed);
        prop_assert_eq!(world.ledger.balance(&creator), creator_before + reward - distributed);
        let escrow = world.ledger.get::<TaskEscrow>(&escrow_key).unwrap();
        prop_assert!(escrow.is_closed);
        prop_assert_eq!(escrow.distributed, distributed);
        prop_assert_eq!(world.ledger.balance(&escrow_key), 0);
        for index in 0..workers {
            let agent = world.ledger.get::<AgentRegistration>(&world.agent(index)).unwrap();
            prop_assert_eq!(agent.active_tasks, 0);
        }
        prop_assert!(check_ledger(&world.ledger).is_empty());
    }
}
