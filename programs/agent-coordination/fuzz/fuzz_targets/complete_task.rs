//! Fuzz target for complete_task instruction
//!
//! Tests invariants:
//! - Worker payouts plus protocol fees equal the escrowed reward
//! - distributed == amount once a task is Completed
//! - Competitive tasks pay only the first completer
//! - Completion is one-shot per claim
//!
//! Run with: cargo test --release -p agent-coordination-fuzz complete_task

use crate::*;
use agent_coordination::errors::{error_matches, CoordinationError};
use agent_coordination::state::{
    capability, AgentRegistration, AgentStatus, Task, TaskClaim, TaskEscrow, TaskStatus, TaskType,
};
use agent_coordination::pda;
use proptest::prelude::*;

fn fee_of(amount: u64, fee_bps: u16) -> u64 {
    amount * fee_bps as u64 / 10_000
}

#[test]
fn test_exclusive_task_pays_worker_minus_fee() {
    let mut world = World::new(1, SCENARIO_FEE_BPS).unwrap();
    let agent = world.register(0, capability::COMPUTE).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, SCENARIO_REWARD, capability::COMPUTE, 0)
        .unwrap();
    let worker = world.actor(0);

    world.ledger.claim_task(worker, task).unwrap();
    assert_eq!(
        world.ledger.get::<Task>(&task).unwrap().status,
        TaskStatus::InProgress
    );
    assert_eq!(
        world.ledger.get::<AgentRegistration>(&agent).unwrap().status,
        AgentStatus::Busy
    );

    let outcome = world
        .ledger
        .complete_task(worker, task, SCENARIO_PROOF, None)
        .unwrap();
    let fee = fee_of(SCENARIO_REWARD, SCENARIO_FEE_BPS);
    assert!(outcome.task_completed);
    assert_eq!(outcome.payout.to_worker, SCENARIO_REWARD - fee);
    assert_eq!(outcome.payout.to_treasury, fee);

    let task_state = world.ledger.get::<Task>(&task).unwrap();
    assert_eq!(task_state.status, TaskStatus::Completed);
    let escrow = world.ledger.get::<TaskEscrow>(&task_state.escrow).unwrap();
    assert_eq!(escrow.distributed, escrow.amount);
    assert!(escrow.is_closed);
    assert_eq!(world.ledger.balance(&worker), STARTING_BALANCE + SCENARIO_REWARD - fee);
    assert_eq!(world.ledger.balance(&TREASURY), fee);

    let agent_state = world.ledger.get::<AgentRegistration>(&agent).unwrap();
    assert_eq!(agent_state.status, AgentStatus::Active);
    assert_eq!(agent_state.active_tasks, 0);
    assert_eq!(agent_state.tasks_completed, 1);
    assert_eq!(agent_state.reputation, 200);

    let claim = world
        .ledger
        .get::<TaskClaim>(&pda::find_claim_address(&task, &agent).0)
        .unwrap();
    assert!(claim.is_completed && claim.is_validated);
    assert_eq!(claim.proof_hash, SCENARIO_PROOF);
}

#[test]
fn test_collaborative_task_completes_on_last_share() {
    let mut world = World::new(1, SCENARIO_FEE_BPS).unwrap();
    register_all(&mut world, 2).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Collaborative, 2, SCENARIO_REWARD, capability::COMPUTE, 0)
        .unwrap();
    for index in 0..2 {
        world.ledger.claim_task(world.actor(index), task).unwrap();
    }

    let share = SCENARIO_REWARD / 2;
    let fee = fee_of(share, SCENARIO_FEE_BPS);

    let first = world
        .ledger
        .complete_task(world.actor(0), task, [1u8; 32], None)
        .unwrap();
    assert!(!first.task_completed);
    assert_eq!(first.payout.to_worker, share - fee);
    assert_eq!(
        world.ledger.get::<Task>(&task).unwrap().status,
        TaskStatus::InProgress
    );

    let second = world
        .ledger
        .complete_task(world.actor(1), task, [2u8; 32], Some([7u8; 64]))
        .unwrap();
    assert!(second.task_completed);
    assert_eq!(second.payout.to_worker, share - fee);

    let task_state = world.ledger.get::<Task>(&task).unwrap();
    assert_eq!(task_state.status, TaskStatus::Completed);
    assert_eq!(task_state.result, [7u8; 64]);
    assert_eq!(world.ledger.protocol_config().unwrap().completed_tasks, 1);
}

#[test]
fn test_competitive_first_completer_wins() {
    let mut world = World::new(1, 0).unwrap();
    let agents = register_all(&mut world, 3).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Competitive, 3, 900, capability::COMPUTE, 0)
        .unwrap();
    for index in 0..2 {
        world.ledger.claim_task(world.actor(index), task).unwrap();
    }

    let winner = world
        .ledger
        .complete_task(world.actor(1), task, [1u8; 32], None)
        .unwrap();
    assert!(winner.task_completed);
    assert_eq!(winner.payout.to_worker, 900);
    assert_eq!(
        world.ledger.get::<Task>(&task).unwrap().status,
        TaskStatus::Completed
    );

    // The other claimant is recorded unpaid and released
    let late = world
        .ledger
        .complete_task(world.actor(0), task, [2u8; 32], None)
        .unwrap();
    assert!(!late.task_completed);
    assert_eq!(late.payout.total().unwrap(), 0);
    let claim = world
        .ledger
        .get::<TaskClaim>(&pda::find_claim_address(&task, &agents[0]).0)
        .unwrap();
    assert!(claim.is_completed);
    assert!(!claim.is_validated);
    let loser = world.ledger.get::<AgentRegistration>(&agents[0]).unwrap();
    assert_eq!(loser.active_tasks, 0);
    assert_eq!(loser.tasks_completed, 0);

    // No more claims on a completed task
    let err = world.ledger.claim_task(world.actor(2), task).unwrap_err();
    assert!(error_matches(&err, CoordinationError::TaskNotClaimable));
    assert!(check_ledger(&world.ledger).is_empty());
}

#[test]
fn test_completion_is_one_shot() {
    let mut world = World::new(1, 0).unwrap();
    register_all(&mut world, 1).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Collaborative, 2, 1_000, capability::COMPUTE, 0)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();
    world
        .ledger
        .complete_task(world.actor(0), task, [1u8; 32], None)
        .unwrap();

    let err = world
        .ledger
        .complete_task(world.actor(0), task, [1u8; 32], None)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::AlreadyCompleted));
}

#[test]
fn test_completion_after_deadline_rejected() {
    let mut world = World::new(1, 0).unwrap();
    register_all(&mut world, 1).unwrap();
    let deadline = world.ledger.now() + 100;
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, 1_000, capability::COMPUTE, deadline)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();
    world.ledger.set_time(deadline + 1);

    let err = world
        .ledger
        .complete_task(world.actor(0), task, [1u8; 32], None)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::TaskExpired));
}

#[test]
fn test_unclaimed_worker_cannot_complete() {
    let mut world = World::new(1, 0).unwrap();
    register_all(&mut world, 2).unwrap();
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, 1_000, capability::COMPUTE, 0)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();

    let err = world
        .ledger
        .complete_task(world.actor(1), task, [1u8; 32], None)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::NotClaimed));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Collaborative payouts and fees add up to the reward exactly
    #[test]
    fn fuzz_collaborative_conservation(
        reward in 1u64..1_000_000_000u64,
        workers in 1u8..=ACTOR_COUNT,
        fee_bps in arb_valid_fee_bps(),
    ) {
        let mut world = World::new(1, fee_bps).unwrap();
        register_all(&mut world, workers).unwrap();
        let task = world
            .create_task(CREATOR, TaskType::Collaborative, workers, reward, capability::COMPUTE, 0)
            .unwrap();
        for index in 0..workers {
            world.ledger.claim_task(world.actor(index), task).unwrap();
        }

        let mut to_workers = 0u64;
        let mut to_treasury = 0u64;
        for index in 0..workers {
            let outcome = world
                .ledger
                .complete_task(world.actor(index), task, [index; 32], None)
                .unwrap();
            prop_assert_eq!(outcome.task_completed, index + 1 == workers);
            to_workers += outcome.payout.to_worker;
            to_treasury += outcome.payout.to_treasury;
        }

        let task_state = world.ledger.get::<Task>(&task).unwrap();
        let escrow_key = task_state.escrow;
        prop_assert_eq!(task_state.status, TaskStatus::Completed);
        prop_assert_eq!(to_workers + to_treasury, reward);
        prop_assert_eq!(world.ledger.balance(&TREASURY), to_treasury);
        prop_assert_eq!(world.ledger.balance(&escrow_key), 0);
        prop_assert!(check_ledger(&world.ledger).is_empty());
    }

    /// Whichever competitive claimant finishes first takes the whole reward
    #[test]
    fn fuzz_competitive_single_payout(
        claimants in 2u8..=4u8,
        winner in 0u8..4u8,
        reward in 1u64..1_000_000u64,
    ) {
        let winner = winner % claimants;
        let mut world = World::new(1, 0).unwrap();
        register_all(&mut world, claimants).unwrap();
        let task = world
            .create_task(CREATOR, TaskType::Competitive, claimants, reward, capability::COMPUTE, 0)
            .unwrap();
        for index in 0..claimants {
            world.ledger.claim_task(world.actor(index), task).unwrap();
        }

        let first = world
            .ledger
            .complete_task(world.actor(winner), task, [1u8; 32], None)
            .unwrap();
        prop_assert_eq!(first.payout.to_worker, reward);

        for index in (0..claimants).filter(|i| *i != winner) {
            let late = world
                .ledger
                .complete_task(world.actor(index), task, [2u8; 32], None)
                .unwrap();
            prop_assert_eq!(late.payout.total().unwrap(), 0);
        }

        for index in 0..claimants {
            let expected = if index == winner { reward } else { 0 };
            prop_assert_eq!(world.ledger.balance(&world.actor(index)), STARTING_BALANCE + expected);
        }
        prop_assert!(check_ledger(&world.ledger).is_empty());
    }
}
