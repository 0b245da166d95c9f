//! Arbitrary input generators for fuzz testing
//!
//! Generates random inputs for protocol instructions, valid and invalid
//! alike, plus whole operation sequences for the ledger simulator.

use agent_coordination::state::capability;
use proptest::prelude::*;

/// Arbitrary 32-byte identifier (task_id, dispute_id, proof hash, etc.)
pub fn arb_id() -> impl Strategy<Value = [u8; 32]> {
    prop::array::uniform32(any::<u8>())
}

/// Arbitrary 64-byte data (description, result_data)
pub fn arb_data_64() -> impl Strategy<Value = [u8; 64]> {
    (arb_id(), arb_id()).prop_map(|(a, b)| {
        let mut result = [0u8; 64];
        result[..32].copy_from_slice(&a);
        result[32..].copy_from_slice(&b);
        result
    })
}

/// Capability bitmask drawn mostly from the defined bits, with some
/// undefined bits and the empty mask mixed in.
pub fn arb_capabilities() -> impl Strategy<Value = u64> {
    prop_oneof![
        // Single capabilities
        1 => Just(capability::COMPUTE),
        1 => Just(capability::INFERENCE),
        1 => Just(capability::STORAGE),
        1 => Just(capability::VERIFICATION),
        // Every defined combination
        4 => 0u64..=capability::ALL_DEFINED,
        // Invalid masks
        1 => Just(0u64),
        1 => Just(1u64 << 4),
        1 => Just(u64::MAX),
    ]
}

/// Defined, non-empty capability mask
pub fn arb_valid_capabilities() -> impl Strategy<Value = u64> {
    1u64..=capability::ALL_DEFINED
}

/// Arbitrary reward amount with edge cases
pub fn arb_reward_amount() -> impl Strategy<Value = u64> {
    prop_oneof![
        // Edge cases
        1 => Just(0u64),
        1 => Just(1u64),
        1 => Just(2u64),
        1 => Just(3u64),
        // Small amounts
        4 => 1_000u64..1_000_000u64,
        // Typical amounts
        4 => 1_000_000u64..1_000_000_000u64,
    ]
}

/// Protocol fee in basis points, including values above the cap
pub fn arb_protocol_fee_bps() -> impl Strategy<Value = u16> {
    prop_oneof![
        1 => Just(0u16),
        1 => Just(1u16),
        1 => Just(1000u16), // cap
        1 => Just(1001u16),
        1 => Just(10000u16),
        4 => 0u16..=1000u16,
    ]
}

/// Valid protocol fee in basis points
pub fn arb_valid_fee_bps() -> impl Strategy<Value = u16> {
    0u16..=1000u16
}

/// Dispute threshold; 0 is rejected at initialization
pub fn arb_dispute_threshold() -> impl Strategy<Value = u8> {
    prop_oneof![1 => Just(0u8), 1 => Just(1u8), 2 => 1u8..=5u8]
}

/// Task type byte, including one undefined value
pub fn arb_task_type() -> impl Strategy<Value = u8> {
    prop_oneof![4 => 0u8..=2u8, 1 => Just(3u8)]
}

/// Resolution type byte, including one undefined value
pub fn arb_resolution_type() -> impl Strategy<Value = u8> {
    prop_oneof![4 => 0u8..=2u8, 1 => Just(3u8)]
}

/// Seconds to advance the ledger clock
pub fn arb_advance() -> impl Strategy<Value = i64> {
    prop_oneof![
        1 => Just(1i64),
        1 => Just(60i64),
        1 => Just(24 * 60 * 60),
        1 => Just(24 * 60 * 60 + 1),
        1 => 0i64..100_000i64,
    ]
}

/// One step against the simulated ledger.
///
/// Actors, tasks and disputes are indices resolved modulo what exists in the
/// world at the time the op is applied, so every op targets something real
/// most of the time.
#[derive(Debug, Clone)]
pub enum Op {
    Register {
        actor: u8,
        capabilities: u64,
    },
    UpdateCapabilities {
        actor: u8,
        capabilities: u64,
    },
    Deregister {
        actor: u8,
    },
    Suspend {
        actor: u8,
    },
    Unsuspend {
        actor: u8,
    },
    CreateTask {
        actor: u8,
        task_type: u8,
        max_workers: u8,
        reward: u64,
        required: u64,
        deadline_in: Option<i64>,
    },
    Claim {
        actor: u8,
        task: u8,
    },
    Complete {
        actor: u8,
        task: u8,
        proof: [u8; 32],
    },
    Cancel {
        actor: u8,
        task: u8,
        by_creator: bool,
    },
    Dispute {
        initiator: u8,
        task: u8,
        claimant: u8,
        resolution: u8,
    },
    Vote {
        actor: u8,
        dispute: u8,
        approve: bool,
    },
    ExpireDispute {
        dispute: u8,
    },
    Advance {
        seconds: i64,
    },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<u8>(), arb_capabilities())
            .prop_map(|(actor, capabilities)| Op::Register { actor, capabilities }),
        1 => (any::<u8>(), arb_capabilities())
            .prop_map(|(actor, capabilities)| Op::UpdateCapabilities { actor, capabilities }),
        1 => any::<u8>().prop_map(|actor| Op::Deregister { actor }),
        1 => any::<u8>().prop_map(|actor| Op::Suspend { actor }),
        1 => any::<u8>().prop_map(|actor| Op::Unsuspend { actor }),
        3 => (
            any::<u8>(),
            arb_task_type(),
            0u8..=4u8,
            arb_reward_amount(),
            arb_capabilities(),
            proptest::option::of(-10i64..200_000i64),
        )
            .prop_map(|(actor, task_type, max_workers, reward, required, deadline_in)| {
                Op::CreateTask {
                    actor,
                    task_type,
                    max_workers,
                    reward,
                    required,
                    deadline_in,
                }
            }),
        5 => (any::<u8>(), any::<u8>()).prop_map(|(actor, task)| Op::Claim { actor, task }),
        4 => (any::<u8>(), any::<u8>(), arb_id())
            .prop_map(|(actor, task, proof)| Op::Complete { actor, task, proof }),
        1 => (any::<u8>(), any::<u8>(), any::<bool>())
            .prop_map(|(actor, task, by_creator)| Op::Cancel { actor, task, by_creator }),
        2 => (any::<u8>(), any::<u8>(), any::<u8>(), arb_resolution_type()).prop_map(
            |(initiator, task, claimant, resolution)| Op::Dispute {
                initiator,
                task,
                claimant,
                resolution,
            }
        ),
        4 => (any::<u8>(), any::<u8>(), any::<bool>())
            .prop_map(|(actor, dispute, approve)| Op::Vote { actor, dispute, approve }),
        1 => any::<u8>().prop_map(|dispute| Op::ExpireDispute { dispute }),
        2 => arb_advance().prop_map(|seconds| Op::Advance { seconds }),
    ]
}

/// A protocol configuration plus a run of operations against it.
#[derive(Debug, Clone)]
pub struct OpSequence {
    pub dispute_threshold: u8,
    pub protocol_fee_bps: u16,
    pub ops: Vec<Op>,
}

impl Arbitrary for OpSequence {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            1u8..=3u8,
            arb_valid_fee_bps(),
            prop::collection::vec(arb_op(), 1..60),
        )
            .prop_map(|(dispute_threshold, protocol_fee_bps, ops)| OpSequence {
                dispute_threshold,
                protocol_fee_bps,
                ops,
            })
            .boxed()
    }
}
