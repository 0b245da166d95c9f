//! Fuzz target for vote_dispute instruction
//!
//! Tests invariants:
//! - One vote per (dispute, arbiter)
//! - Only active, non-participant agents with VERIFICATION vote
//! - Settlement at quorum moves exactly the escrowed reward
//! - Ties and rejections apply Refund
//!
//! Run with: cargo test --release -p agent-coordination-fuzz vote_dispute

use crate::*;
use agent_coordination::errors::{error_matches, CoordinationError};
use agent_coordination::instructions::constants::DISPUTE_VOTING_PERIOD;
use agent_coordination::state::{
    capability, AgentRegistration, AgentStatus, Dispute, DisputeStatus, ResolutionType, Task,
    TaskEscrow, TaskStatus, TaskType,
};
use anchor_lang::prelude::Pubkey;
use proptest::prelude::*;

/// Exclusive task claimed by actor 0 and disputed by the creator. Arbiters
/// are registered with VERIFICATION.
fn exclusive_dispute(threshold: u8, reward: u64, resolution: u8) -> (World, Pubkey, Pubkey) {
    let mut world = World::new(threshold, SCENARIO_FEE_BPS).unwrap();
    world.register(0, capability::COMPUTE).unwrap();
    for arbiter in ARBITERS {
        world.register(arbiter, capability::VERIFICATION).unwrap();
    }
    let task = world
        .create_task(CREATOR, TaskType::Exclusive, 1, reward, capability::COMPUTE, 0)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();
    let dispute = world
        .open_dispute(world.actor(CREATOR), task, world.agent(0), resolution)
        .unwrap();
    (world, task, dispute)
}

#[test]
fn test_quorum_settles_on_threshold_vote() {
    let (mut world, dispute) = disputed_world().unwrap();

    let first = world
        .ledger
        .vote_dispute(world.actor(ARBITERS[0]), dispute, true)
        .unwrap();
    let second = world
        .ledger
        .vote_dispute(world.actor(ARBITERS[1]), dispute, false)
        .unwrap();
    assert!(first.is_none() && second.is_none());
    let state = world.ledger.get::<Dispute>(&dispute).unwrap();
    assert_eq!((state.votes_for, state.votes_against, state.total_voters), (1, 1, 2));
    assert_eq!(world.ledger.votes_for_dispute(&dispute).len(), 2);

    let third = world
        .ledger
        .vote_dispute(world.actor(ARBITERS[2]), dispute, true)
        .unwrap()
        .unwrap();
    assert_eq!(third.applied, ResolutionType::Complete);
    assert!(third.task_completed);
    assert_eq!(
        world.ledger.get::<Dispute>(&dispute).unwrap().status,
        DisputeStatus::Resolved
    );
}

#[test]
fn test_double_vote_rejected() {
    let (mut world, dispute) = disputed_world().unwrap();
    let arbiter = world.actor(ARBITERS[0]);
    world.ledger.vote_dispute(arbiter, dispute, true).unwrap();

    let err = world.ledger.vote_dispute(arbiter, dispute, false).unwrap_err();
    assert!(error_matches(&err, CoordinationError::AlreadyVoted));
    assert_eq!(world.ledger.get::<Dispute>(&dispute).unwrap().total_voters, 1);
}

#[test]
fn test_voting_closes_at_deadline() {
    let (mut world, dispute) = disputed_world().unwrap();
    world.ledger.advance(DISPUTE_VOTING_PERIOD - 1);
    world
        .ledger
        .vote_dispute(world.actor(ARBITERS[0]), dispute, true)
        .unwrap();

    world.ledger.advance(1);
    let err = world
        .ledger
        .vote_dispute(world.actor(ARBITERS[1]), dispute, true)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::VotingEnded));
}

#[test]
fn test_voter_needs_verification_capability() {
    let (mut world, dispute) = disputed_world().unwrap();
    world.register(1, capability::COMPUTE | capability::STORAGE).unwrap();
    let err = world
        .ledger
        .vote_dispute(world.actor(1), dispute, true)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::NotArbiter));
}

#[test]
fn test_unregistered_voter_rejected() {
    let (mut world, dispute) = disputed_world().unwrap();
    let err = world
        .ledger
        .vote_dispute(world.actor(1), dispute, true)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::AgentNotFound));
}

#[test]
fn test_suspended_arbiter_rejected() {
    let (mut world, dispute) = disputed_world().unwrap();
    world
        .ledger
        .suspend_agent(AUTHORITY, world.agent(ARBITERS[0]))
        .unwrap();
    let err = world
        .ledger
        .vote_dispute(world.actor(ARBITERS[0]), dispute, true)
        .unwrap_err();
    assert!(error_matches(&err, CoordinationError::AgentNotActive));

    world
        .ledger
        .unsuspend_agent(AUTHORITY, world.agent(ARBITERS[0]))
        .unwrap();
    world
        .ledger
        .vote_dispute(world.actor(ARBITERS[0]), dispute, true)
        .unwrap();
}

#[test]
fn test_participants_cannot_arbitrate() {
    let mut world = World::new(1, 0).unwrap();
    world.register(0, capability::ALL_DEFINED).unwrap();
    world.register(CREATOR, capability::VERIFICATION).unwrap();
    // Collaborative claims leave the claimant Active
    let task = world
        .create_task(CREATOR, TaskType::Collaborative, 1, 1_000, capability::COMPUTE, 0)
        .unwrap();
    world.ledger.claim_task(world.actor(0), task).unwrap();
    let dispute = world
        .open_dispute(world.actor(0), task, world.agent(0), ResolutionType::Complete as u8)
        .unwrap();

    for participant in [0, CREATOR] {
        let err = world
            .ledger
            .vote_dispute(world.actor(participant), dispute, true)
            .unwrap_err();
        assert!(error_matches(&err, CoordinationError::ArbiterIsDisputeParticipant));
    }
    assert_eq!(world.ledger.get::<Dispute>(&dispute).unwrap().total_voters, 0);
}

#[test]
fn test_vote_updates_arbiter_activity() {
    let (mut world, dispute) = disputed_world().unwrap();
    world.ledger.advance(60);
    let now = world.ledger.now();
    world
        .ledger
        .vote_dispute(world.actor(ARBITERS[0]), dispute, false)
        .unwrap();

    let arbiter = world
        .ledger
        .get::<AgentRegistration>(&world.agent(ARBITERS[0]))
        .unwrap();
    assert_eq!(arbiter.last_active, now);
    let votes = world.ledger.votes_for_dispute(&dispute);
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].1.voter, world.agent(ARBITERS[0]));
    assert!(!votes[0].1.approved);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Settlement pays worker, treasury and creator exactly the escrowed
    /// reward and applies the proposed resolution only on a majority
    #[test]
    fn fuzz_settlement_conservation(
        resolution in 0u8..=2u8,
        votes in proptest::array::uniform3(any::<bool>()),
        reward in 1u64..1_000_000_000u64,
    ) {
        let (mut world, task, dispute) = exclusive_dispute(3, reward, resolution);
        let worker = world.actor(0);
        let creator = world.actor(CREATOR);
        let worker_before = world.ledger.balance(&worker);
        let creator_before = world.ledger.balance(&creator);

        let mut settlement = None;
        for (arbiter, approve) in ARBITERS.into_iter().zip(votes) {
            settlement = world
                .ledger
                .vote_dispute(world.actor(arbiter), dispute, approve)
                .unwrap();
        }
        let settlement = settlement.unwrap();

        let worker_delta = world.ledger.balance(&worker) - worker_before;
        let creator_delta = world.ledger.balance(&creator) - creator_before;
        let treasury_delta = world.ledger.balance(&TREASURY);
        prop_assert_eq!(worker_delta, settlement.payout.to_worker);
        prop_assert_eq!(creator_delta, settlement.payout.to_creator);
        prop_assert_eq!(treasury_delta, settlement.payout.to_treasury);
        prop_assert_eq!(worker_delta + creator_delta + treasury_delta, reward);

        let approvals = votes.iter().filter(|v| **v).count();
        let expected = if approvals * 2 > votes.len() {
            ResolutionType::try_from(resolution).unwrap()
        } else {
            ResolutionType::Refund
        };
        prop_assert_eq!(settlement.applied, expected);

        let task_state = world.ledger.get::<Task>(&task).unwrap();
        let escrow = world.ledger.get::<TaskEscrow>(&task_state.escrow).unwrap();
        prop_assert!(escrow.is_closed);
        prop_assert_eq!(world.ledger.balance(&task_state.escrow), 0);
        prop_assert_eq!(
            task_state.status == TaskStatus::Completed,
            expected == ResolutionType::Complete
        );
        prop_assert_eq!(settlement.task_completed, expected == ResolutionType::Complete);

        let claimant = world.ledger.get::<AgentRegistration>(&world.agent(0)).unwrap();
        prop_assert_eq!(claimant.status, AgentStatus::Active);
        prop_assert_eq!(claimant.active_tasks, 0);
        prop_assert!(check_ledger(&world.ledger).is_empty());
    }
}
