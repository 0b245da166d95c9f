//! Fuzz testing scenarios driven through the ledger simulator
//!
//! A [`World`] wraps a [`Ledger`] with a fixed protocol authority, a funded
//! set of actors and the tasks and disputes created so far. Arbitrary
//! [`Op`]s are resolved against it, and [`run_sequence`] checks every
//! invariant after each step.

use agent_coordination::errors::CoordinationError;
use agent_coordination::instructions::constants::DISPUTE_VOTING_PERIOD;
use agent_coordination::instructions::task_init_helpers::TaskParams;
use agent_coordination::state::{capability, ResolutionType, Task, TaskType};
use anchor_lang::prelude::*;

use crate::arbitrary::{Op, OpSequence};
use crate::invariants::{check_ledger, check_transition};
use crate::ledger::{agent_address, Ledger};

pub const AUTHORITY: Pubkey = Pubkey::new_from_array([0xAA; 32]);
pub const TREASURY: Pubkey = Pubkey::new_from_array([0xEE; 32]);
pub const ACTOR_COUNT: u8 = 6;
pub const STARTING_BALANCE: u64 = 10_000_000_000;
pub const GENESIS_TIME: i64 = 1_700_000_000;
pub const ENDPOINT: &str = "https://agent.example/rpc";

/// Protocol state plus the identities and records a test works with.
#[derive(Clone)]
pub struct World {
    pub ledger: Ledger,
    pub actors: Vec<Pubkey>,
    pub tasks: Vec<Pubkey>,
    pub disputes: Vec<Pubkey>,
    next_id: u64,
}

impl World {
    /// Initializes the protocol and funds every actor.
    pub fn new(dispute_threshold: u8, protocol_fee_bps: u16) -> Result<Self> {
        let mut ledger = Ledger::new(GENESIS_TIME);
        ledger.initialize_protocol(AUTHORITY, TREASURY, dispute_threshold, protocol_fee_bps, 0)?;

        let actors: Vec<Pubkey> = (0..ACTOR_COUNT)
            .map(|i| Pubkey::new_from_array([0x10 + i; 32]))
            .collect();
        for actor in &actors {
            ledger.airdrop(*actor, STARTING_BALANCE);
        }

        Ok(Self {
            ledger,
            actors,
            tasks: Vec::new(),
            disputes: Vec::new(),
            next_id: 0,
        })
    }

    pub fn actor(&self, index: u8) -> Pubkey {
        self.actors[index as usize % self.actors.len()]
    }

    pub fn agent(&self, index: u8) -> Pubkey {
        agent_address(&self.actor(index))
    }

    /// Non-zero identifier, unique within this world.
    pub fn fresh_id(&mut self) -> [u8; 32] {
        self.next_id += 1;
        let mut id = [0u8; 32];
        id[..8].copy_from_slice(&self.next_id.to_le_bytes());
        id
    }

    fn task(&self, index: u8) -> Result<Pubkey> {
        if self.tasks.is_empty() {
            return err!(CoordinationError::TaskNotFound);
        }
        Ok(self.tasks[index as usize % self.tasks.len()])
    }

    fn dispute(&self, index: u8) -> Result<Pubkey> {
        if self.disputes.is_empty() {
            return err!(CoordinationError::DisputeNotFound);
        }
        Ok(self.disputes[index as usize % self.disputes.len()])
    }

    pub fn register(&mut self, index: u8, capabilities: u64) -> Result<Pubkey> {
        let actor = self.actor(index);
        self.ledger.register_agent(actor, capabilities, ENDPOINT, None)
    }

    pub fn create_task(
        &mut self,
        creator: u8,
        task_type: TaskType,
        max_workers: u8,
        reward_amount: u64,
        required_capabilities: u64,
        deadline: i64,
    ) -> Result<Pubkey> {
        let params = TaskParams {
            task_id: self.fresh_id(),
            required_capabilities,
            description: [0u8; 64],
            reward_amount,
            max_workers,
            deadline,
            task_type: task_type as u8,
        };
        self.create_task_with(creator, params)
    }

    pub fn create_task_with(&mut self, creator: u8, params: TaskParams) -> Result<Pubkey> {
        let creator = self.actor(creator);
        let key = self.ledger.create_task(creator, params)?;
        self.tasks.push(key);
        Ok(key)
    }

    pub fn open_dispute(
        &mut self,
        initiator: Pubkey,
        task: Pubkey,
        claimant_agent: Pubkey,
        resolution_type: u8,
    ) -> Result<Pubkey> {
        let dispute_id = self.fresh_id();
        let key = self.ledger.initiate_dispute(
            initiator,
            dispute_id,
            task,
            claimant_agent,
            [0x0Eu8; 32],
            resolution_type,
        )?;
        self.disputes.push(key);
        Ok(key)
    }

    /// Resolves `op` against the current world and executes it.
    pub fn apply(&mut self, op: &Op) -> Result<()> {
        match *op {
            Op::Register {
                actor,
                capabilities,
            } => self.register(actor, capabilities).map(|_| ()),
            Op::UpdateCapabilities {
                actor,
                capabilities,
            } => {
                let actor = self.actor(actor);
                self.ledger
                    .update_agent(actor, Some(capabilities), None, None)
            }
            Op::Deregister { actor } => {
                let actor = self.actor(actor);
                self.ledger.deregister_agent(actor)
            }
            Op::Suspend { actor } => {
                let agent = self.agent(actor);
                self.ledger.suspend_agent(AUTHORITY, agent)
            }
            Op::Unsuspend { actor } => {
                let agent = self.agent(actor);
                self.ledger.unsuspend_agent(AUTHORITY, agent)
            }
            Op::CreateTask {
                actor,
                task_type,
                max_workers,
                reward,
                required,
                deadline_in,
            } => {
                let deadline = deadline_in.map_or(0, |d| self.ledger.now() + d);
                let params = TaskParams {
                    task_id: self.fresh_id(),
                    required_capabilities: required,
                    description: [0u8; 64],
                    reward_amount: reward,
                    max_workers,
                    deadline,
                    task_type,
                };
                self.create_task_with(actor, params).map(|_| ())
            }
            Op::Claim { actor, task } => {
                let task = self.task(task)?;
                let actor = self.actor(actor);
                self.ledger.claim_task(actor, task).map(|_| ())
            }
            Op::Complete { actor, task, proof } => {
                let task = self.task(task)?;
                let actor = self.actor(actor);
                self.ledger
                    .complete_task(actor, task, proof, None)
                    .map(|_| ())
            }
            Op::Cancel {
                actor,
                task,
                by_creator,
            } => {
                let task_key = self.task(task)?;
                let signer = if by_creator {
                    self.ledger.get::<Task>(&task_key)?.creator
                } else {
                    self.actor(actor)
                };
                self.ledger.cancel_task(signer, task_key).map(|_| ())
            }
            Op::Dispute {
                initiator,
                task,
                claimant,
                resolution,
            } => {
                let task_key = self.task(task)?;
                let claimants: Vec<Pubkey> = self
                    .ledger
                    .claims_for_task(&task_key)
                    .into_iter()
                    .map(|(_, claim)| claim.worker)
                    .collect();
                let claimant_agent = if claimants.is_empty() {
                    self.agent(claimant)
                } else {
                    claimants[claimant as usize % claimants.len()]
                };
                // Even initiators stand in for the creator so disputes open often.
                let initiator = if initiator % 2 == 0 {
                    self.ledger.get::<Task>(&task_key)?.creator
                } else {
                    self.actor(initiator)
                };
                self.open_dispute(initiator, task_key, claimant_agent, resolution)
                    .map(|_| ())
            }
            Op::Vote {
                actor,
                dispute,
                approve,
            } => {
                let dispute = self.dispute(dispute)?;
                let actor = self.actor(actor);
                self.ledger
                    .vote_dispute(actor, dispute, approve)
                    .map(|_| ())
            }
            Op::ExpireDispute { dispute } => {
                let dispute = self.dispute(dispute)?;
                self.ledger.resolve_expired_dispute(dispute)
            }
            Op::Advance { seconds } => {
                self.ledger.advance(seconds);
                Ok(())
            }
        }
    }
}

/// Registers actors `0..count` with every defined capability.
pub fn register_all(world: &mut World, count: u8) -> Result<Vec<Pubkey>> {
    (0..count)
        .map(|i| world.register(i, capability::ALL_DEFINED))
        .collect()
}

// ============================================================================
// Scripted scenarios
// ============================================================================

pub const SCENARIO_REWARD: u64 = 1_000_000;
pub const SCENARIO_FEE_BPS: u16 = 100;
pub const SCENARIO_PROOF: [u8; 32] = [0xAA; 32];
/// Actor index that creates every scenario task
pub const CREATOR: u8 = 5;
/// Actor indices registered as arbiters in dispute scenarios
pub const ARBITERS: [u8; 3] = [2, 3, 4];

/// A named script that drives the protocol from genesis.
pub struct Scenario {
    pub name: &'static str,
    pub run: fn() -> Result<World>,
}

pub const SCENARIOS: [Scenario; 5] = [
    Scenario {
        name: "exclusive task completion",
        run: exclusive_completion,
    },
    Scenario {
        name: "collaborative task completion",
        run: collaborative_completion,
    },
    Scenario {
        name: "cancel open task",
        run: cancel_open_task,
    },
    Scenario {
        name: "dispute resolved by vote",
        run: dispute_resolved_by_vote,
    },
    Scenario {
        name: "dispute expires without quorum",
        run: dispute_expires_without_quorum,
    },
];

/// Exclusive COMPUTE task claimed and completed by actor 0.
pub fn exclusive_completion() -> Result<World> {
    let mut world = World::new(1, SCENARIO_FEE_BPS)?;
    world.register(0, capability::COMPUTE)?;
    let task = world.create_task(
        CREATOR,
        TaskType::Exclusive,
        1,
        SCENARIO_REWARD,
        capability::COMPUTE,
        0,
    )?;
    let worker = world.actor(0);
    world.ledger.claim_task(worker, task)?;
    world
        .ledger
        .complete_task(worker, task, SCENARIO_PROOF, None)?;
    Ok(world)
}

/// Two-worker collaborative task completed by actors 0 and 1.
pub fn collaborative_completion() -> Result<World> {
    let mut world = World::new(1, SCENARIO_FEE_BPS)?;
    world.register(0, capability::COMPUTE)?;
    world.register(1, capability::COMPUTE)?;
    let task = world.create_task(
        CREATOR,
        TaskType::Collaborative,
        2,
        SCENARIO_REWARD,
        capability::COMPUTE,
        0,
    )?;
    for index in [0, 1] {
        let worker = world.actor(index);
        world.ledger.claim_task(worker, task)?;
    }
    for index in [0, 1] {
        let worker = world.actor(index);
        world
            .ledger
            .complete_task(worker, task, SCENARIO_PROOF, None)?;
    }
    Ok(world)
}

/// Open task cancelled by its creator before anyone claimed it.
pub fn cancel_open_task() -> Result<World> {
    let mut world = World::new(1, SCENARIO_FEE_BPS)?;
    let task = world.create_task(
        CREATOR,
        TaskType::Exclusive,
        1,
        SCENARIO_REWARD,
        capability::COMPUTE,
        0,
    )?;
    let creator = world.actor(CREATOR);
    world.ledger.cancel_task(creator, task)?;
    Ok(world)
}

/// Exclusive task claimed by actor 0 and disputed by the creator, asking
/// for Complete. Three arbiters are registered and the threshold is three.
pub fn disputed_world() -> Result<(World, Pubkey)> {
    let mut world = World::new(3, SCENARIO_FEE_BPS)?;
    world.register(0, capability::COMPUTE)?;
    for arbiter in ARBITERS {
        world.register(arbiter, capability::VERIFICATION)?;
    }
    let task = world.create_task(
        CREATOR,
        TaskType::Exclusive,
        1,
        SCENARIO_REWARD,
        capability::COMPUTE,
        0,
    )?;
    let worker = world.actor(0);
    world.ledger.claim_task(worker, task)?;

    let creator = world.actor(CREATOR);
    let claimant = world.agent(0);
    let dispute = world.open_dispute(
        creator,
        task,
        claimant,
        ResolutionType::Complete as u8,
    )?;
    Ok((world, dispute))
}

/// Two arbiters approve and one rejects; quorum settles as Complete.
pub fn dispute_resolved_by_vote() -> Result<World> {
    let (mut world, dispute) = disputed_world()?;
    for (arbiter, approve) in ARBITERS.into_iter().zip([true, true, false]) {
        let authority = world.actor(arbiter);
        world.ledger.vote_dispute(authority, dispute, approve)?;
    }
    Ok(world)
}

/// One vote arrives before the window closes; the dispute expires.
pub fn dispute_expires_without_quorum() -> Result<World> {
    let (mut world, dispute) = disputed_world()?;
    let authority = world.actor(ARBITERS[0]);
    world.ledger.vote_dispute(authority, dispute, true)?;
    world.ledger.advance(DISPUTE_VOTING_PERIOD);
    world.ledger.resolve_expired_dispute(dispute)?;
    Ok(world)
}

/// Outcome of one applied op.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub index: usize,
    pub op: Op,
    pub accepted: bool,
    pub violations: Vec<String>,
}

/// Runs `seq` against a fresh world, checking every invariant after each
/// step and that a rejected op left the ledger untouched.
pub fn run_sequence(seq: &OpSequence) -> Result<Vec<StepReport>> {
    let mut world = World::new(seq.dispute_threshold, seq.protocol_fee_bps)?;
    let mut reports = Vec::with_capacity(seq.ops.len());

    for (index, op) in seq.ops.iter().enumerate() {
        let before = world.ledger.clone();
        let before_fingerprint = before.fingerprint()?;
        let result = world.apply(op);

        let mut violations = Vec::new();
        if result.is_err() && world.ledger.fingerprint()? != before_fingerprint {
            violations.push("rejected op modified the ledger".to_string());
        }
        violations.extend(check_ledger(&world.ledger));
        violations.extend(check_transition(&before, &world.ledger));

        reports.push(StepReport {
            index,
            op: op.clone(),
            accepted: result.is_ok(),
            violations,
        });
    }

    Ok(reports)
}

/// Every violation in `reports`, labelled with the op that caused it.
pub fn collect_violations(reports: &[StepReport]) -> Vec<String> {
    reports
        .iter()
        .flat_map(|report| {
            report
                .violations
                .iter()
                .map(move |v| format!("step {} {:?}: {}", report.index, report.op, v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_funds_actors() {
        let world = World::new(1, 100).unwrap();
        assert_eq!(world.actors.len(), ACTOR_COUNT as usize);
        for actor in &world.actors {
            assert_eq!(world.ledger.balance(actor), STARTING_BALANCE);
        }
        assert_ne!(world.actor(0), AUTHORITY);
        assert_eq!(world.actor(ACTOR_COUNT), world.actor(0));
    }

    #[test]
    fn test_ops_without_targets_are_rejected() {
        let mut world = World::new(1, 100).unwrap();
        assert!(world.apply(&Op::Claim { actor: 0, task: 0 }).is_err());
        assert!(world.apply(&Op::ExpireDispute { dispute: 0 }).is_err());
    }

    #[test]
    fn test_fresh_ids_are_unique_and_non_zero() {
        let mut world = World::new(1, 100).unwrap();
        let a = world.fresh_id();
        let b = world.fresh_id();
        assert_ne!(a, b);
        assert_ne!(a, [0u8; 32]);
    }

    #[test]
    fn test_every_scenario_leaves_a_valid_ledger() {
        for scenario in SCENARIOS.iter() {
            let world = (scenario.run)().unwrap();
            let violations = check_ledger(&world.ledger);
            assert!(violations.is_empty(), "{}: {:?}", scenario.name, violations);
        }
    }

    #[test]
    fn test_scripted_sequence_is_clean() {
        let seq = OpSequence {
            dispute_threshold: 1,
            protocol_fee_bps: 100,
            ops: vec![
                Op::Register {
                    actor: 0,
                    capabilities: capability::COMPUTE,
                },
                Op::Register {
                    actor: 1,
                    capabilities: capability::COMPUTE,
                },
                Op::CreateTask {
                    actor: 2,
                    task_type: TaskType::Exclusive as u8,
                    max_workers: 1,
                    reward: 1_000_000,
                    required: capability::COMPUTE,
                    deadline_in: None,
                },
                Op::Claim { actor: 0, task: 0 },
                Op::Claim { actor: 1, task: 0 },
                Op::Complete {
                    actor: 0,
                    task: 0,
                    proof: [0xAA; 32],
                },
            ],
        };
        let reports = run_sequence(&seq).unwrap();
        let accepted: Vec<bool> = reports.iter().map(|r| r.accepted).collect();
        assert_eq!(accepted, vec![true, true, true, true, false, true]);
        assert!(collect_violations(&reports).is_empty());
    }
}
