//! Fuzz target for claim_task instruction
//!
//! Tests invariants:
//! - A claim succeeds exactly when the agent holds every required capability
//! - current_workers never exceeds max_workers
//! - One claim per (task, worker)
//! - Deadline and agent status enforcement
//!
//! Run with: cargo test --release -p agent-coordination-fuzz claim_task

use crate::*;
use agent_coordination::errors::{error_matches, CoordinationError};
use agent_coordination::instructions::task_init_helpers::TaskParams;
use agent_coordination::pda;
use agent_coordination::state::{
    capability, AgentRegistration, AgentStatus, Task, TaskStatus, TaskType,
};
use anchor_lang::prelude::Pubkey;
use proptest::prelude::*;

fn single_slot_task(world: &mut World, required: u64) -> Pubkey {
    world
        .create_task(CREATOR, TaskType::Exclusive, 1, 1_000_000, required, 0)
        .unwrap()
}

/// Every pair of defined capability sets: claim iff superset.
#[test]
fn test_capability_superset_exhaustive() {
    for agent_caps in 1..=capability::ALL_DEFINED {
        for required in 1..=capability::ALL_DEFINED {
            let mut world = World::new(1, 0).unwrap();
            world.register(0, agent_caps).unwrap();
            let task = single_slot_task(&mut world, required);

            let result = world.ledger.claim_task(world.actor(0), task);
            let superset = agent_caps & required == required;
            match result {
                Ok(_) => assert!(
                    superset,
                    "claimed without capabilities: agent={agent_caps:#06b} required={required:#06b}"
                ),
                Err(e) => {
                    assert!(
                        !superset,
                        "rejected despite capabilities: agent={agent_caps:#06b} required={required:#06b}"
                    );
                    assert!(error_matches(&e, CoordinationError::CapabilityMismatch));
                }
            }
        }
    }
}

#[test]
fn test_duplicate_claim_rejected() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Collaborative, 3, 3_000, capability::COMPUTE, 0)
        .unwrap();
    let worker = world.actor(0);

    world.ledger.claim_task(worker, task).unwrap();
    let err = world.ledger.claim_task(worker, task).unwrap_err();
    assert!(error_matches(&err, CoordinationError::AlreadyClaimed));
    assert_eq!(world.ledger.get::<Task>(&task).unwrap().current_workers, 1);
    assert_eq!(
        world
            .ledger
            .get::<AgentRegistration>(&world.agent(0))
            .unwrap()
            .active_tasks,
        1
    );
}

#[test]
fn test_claim_deadline_is_inclusive() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    world.register(1, capability::COMPUTE).unwrap();
    let deadline = world.ledger.now() + 10;
    let task = world
        .create_task(CREATOR, TaskType::Competitive, 2, 1_000, capability::COMPUTE, deadline)
        .unwrap();

    world.ledger.set_time(deadline);
    world.ledger.claim_task(world.actor(0), task).unwrap();

    world.ledger.advance(1);
    let err = world.ledger.claim_task(world.actor(1), task).unwrap_err();
    assert!(error_matches(&err, CoordinationError::TaskExpired));
}

#[test]
fn test_suspended_and_busy_agents_cannot_claim() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    world.register(1, capability::COMPUTE).unwrap();
    let first = single_slot_task(&mut world, capability::COMPUTE);
    let second = single_slot_task(&mut world, capability::COMPUTE);

    world
        .ledger
        .suspend_agent(AUTHORITY, world.agent(1))
        .unwrap();
    let err = world.ledger.claim_task(world.actor(1), first).unwrap_err();
    assert!(error_matches(&err, CoordinationError::AgentNotActive));

    // An exclusive claim marks the worker Busy
    world.ledger.claim_task(world.actor(0), first).unwrap();
    assert_eq!(
        world
            .ledger
            .get::<AgentRegistration>(&world.agent(0))
            .unwrap()
            .status,
        AgentStatus::Busy
    );
    let err = world.ledger.claim_task(world.actor(0), second).unwrap_err();
    assert!(error_matches(&err, CoordinationError::AgentNotActive));
}

fn status_of(world: &World, index: u8) -> AgentStatus {
    world
        .ledger
        .get::<AgentRegistration>(&world.agent(index))
        .unwrap()
        .status
}

#[test]
fn test_unsuspend_keeps_exclusive_worker_busy() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let first = single_slot_task(&mut world, capability::COMPUTE);
    let second = single_slot_task(&mut world, capability::COMPUTE);
    world.ledger.claim_task(world.actor(0), first).unwrap();

    world.ledger.suspend_agent(AUTHORITY, world.agent(0)).unwrap();
    world.ledger.unsuspend_agent(AUTHORITY, world.agent(0)).unwrap();
    assert_eq!(status_of(&world, 0), AgentStatus::Busy);
    let err = world.ledger.claim_task(world.actor(0), second).unwrap_err();
    assert!(error_matches(&err, CoordinationError::AgentNotActive));
    assert!(check_ledger(&world.ledger).is_empty());

    world
        .ledger
        .complete_task(world.actor(0), first, [1u8; 32], None)
        .unwrap();
    assert_eq!(status_of(&world, 0), AgentStatus::Active);
    world.ledger.claim_task(world.actor(0), second).unwrap();
}

#[test]
fn test_exclusive_finished_while_suspended_unsuspends_active() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let task = single_slot_task(&mut world, capability::COMPUTE);
    world.ledger.claim_task(world.actor(0), task).unwrap();

    world.ledger.suspend_agent(AUTHORITY, world.agent(0)).unwrap();
    world
        .ledger
        .complete_task(world.actor(0), task, [1u8; 32], None)
        .unwrap();
    assert_eq!(status_of(&world, 0), AgentStatus::Suspended);

    world.ledger.unsuspend_agent(AUTHORITY, world.agent(0)).unwrap();
    let agent = world.ledger.get::<AgentRegistration>(&world.agent(0)).unwrap();
    assert_eq!(agent.status, AgentStatus::Active);
    assert!(!agent.holds_exclusive);
    assert!(check_ledger(&world.ledger).is_empty());
}

#[test]
fn test_shared_claim_release_keeps_exclusive_busy() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let deadline = world.ledger.now() + 100;
    let shared = world
        .create_task(CREATOR, TaskType::Collaborative, 2, 2_000, capability::COMPUTE, deadline)
        .unwrap();
    let exclusive = single_slot_task(&mut world, capability::COMPUTE);
    world.ledger.claim_task(world.actor(0), shared).unwrap();
    world.ledger.claim_task(world.actor(0), exclusive).unwrap();

    world.ledger.set_time(deadline + 1);
    world.ledger.cancel_task(world.actor(CREATOR), shared).unwrap();
    let agent = world.ledger.get::<AgentRegistration>(&world.agent(0)).unwrap();
    assert_eq!(agent.active_tasks, 1);
    assert_eq!(agent.status, AgentStatus::Busy);
    assert!(check_ledger(&world.ledger).is_empty());
}

#[test]
fn test_only_protocol_authority_suspends() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    let err = world
        .ledger
        .suspend_agent(world.actor(1), world.agent(0))
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::Unauthorized));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Claim outcome follows the superset rule for every task type
    #[test]
    fn fuzz_claim_matches_superset(
        agent_caps in arb_valid_capabilities(),
        required in arb_valid_capabilities(),
        task_type in 0u8..=2u8,
        max_workers in 1u8..=4u8,
    ) {
        let mut world = World::new(1, 100).unwrap();
        world.register(0, agent_caps).unwrap();
        let max_workers = if task_type == TaskType::Exclusive as u8 { 1 } else { max_workers };
        let params = TaskParams {
            task_id: world.fresh_id(),
            required_capabilities: required,
            description: [0u8; 64],
            reward_amount: 1_000_000,
            max_workers,
            deadline: 0,
            task_type,
        };
        let task = world.create_task_with(CREATOR, params).unwrap();

        let eligible = world.ledger.eligible_tasks(&world.agent(0)).unwrap();
        let result = world.ledger.claim_task(world.actor(0), task);

        prop_assert_eq!(result.is_ok(), capability::has_all(agent_caps, required),
            "agent={:#b} required={:#b}", agent_caps, required);
        prop_assert_eq!(eligible.contains(&task), result.is_ok());
        prop_assert!(check_ledger(&world.ledger).is_empty());
    }

    /// Claims beyond max_workers are rejected with TaskFull
    #[test]
    fn fuzz_claims_never_exceed_max(
        max_workers in 1u8..=5u8,
        claimants in 1u8..=ACTOR_COUNT,
    ) {
        let mut world = World::new(1, 0).unwrap();
        register_all(&mut world, claimants).unwrap();
        let task = world
            .create_task(CREATOR, TaskType::Competitive, max_workers, 1_000_000, capability::COMPUTE, 0)
            .unwrap();

        let mut accepted = 0u8;
        for index in 0..claimants {
            match world.ledger.claim_task(world.actor(index), task) {
                Ok(claim) => {
                    accepted += 1;
                    prop_assert_eq!(
                        claim,
                        pda::find_claim_address(&task, &world.agent(index)).0
                    );
                }
                Err(e) => prop_assert!(error_matches(&e, CoordinationError::TaskFull)),
            }
            let current = world.ledger.get::<Task>(&task).unwrap().current_workers;
            prop_assert!(current <= max_workers);
        }

        let task_state = world.ledger.get::<Task>(&task).unwrap();
        prop_assert_eq!(accepted, claimants.min(max_workers));
        prop_assert_eq!(task_state.current_workers, accepted);
        prop_assert_eq!(
            task_state.status == TaskStatus::InProgress,
            accepted == max_workers
        );
        prop_assert!(check_ledger(&world.ledger).is_empty());
    }
}
