//! Fuzz test runner for the agent coordination protocol
//!
//! Run with: cargo run --release
//! Or: cargo test (for property-based tests)
//!
//! `FUZZ_SEED` replays a previous run, `FUZZ_ITERATIONS` sets the number of
//! random sequences.

use agent_coordination::state::{capability, AgentRegistration, Task, TaskType};
use agent_coordination_fuzz::*;
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};
use std::time::Instant;

fn main() {
    println!("=== Agent Coordination Protocol Fuzz Testing ===\n");

    let seed = env_u64("FUZZ_SEED").unwrap_or_else(rand::random::<u64>);
    let iterations = env_u64("FUZZ_ITERATIONS").unwrap_or(500) as usize;
    println!("Seed: {} (replay with FUZZ_SEED={})\n", seed, seed);

    let start = Instant::now();
    let mut total_tests = 0;
    let mut passed = 0;
    let mut failed = 0;

    println!("Running scripted scenarios...");
    let (p, f) = run_scenarios();
    passed += p;
    failed += f;
    total_tests += p + f;

    println!("Running random operation sequences...");
    let (p, f) = run_sequence_fuzz(seed, iterations);
    passed += p;
    failed += f;
    total_tests += p + f;

    println!("Running claim race tests...");
    let (p, f) = run_claim_race_tests(50);
    passed += p;
    failed += f;
    total_tests += p + f;

    println!("Running edge case tests...");
    let (p, f) = run_edge_case_tests();
    passed += p;
    failed += f;
    total_tests += p + f;

    let duration = start.elapsed();

    println!("\n=== Fuzz Testing Complete ===");
    println!("Total tests: {}", total_tests);
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);
    println!("Duration: {:?}", duration);

    if failed > 0 {
        std::process::exit(1);
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

fn seeded_runner(seed: u64) -> TestRunner {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[..8].copy_from_slice(&seed.to_le_bytes());
    TestRunner::new_with_rng(
        Config::default(),
        TestRng::from_seed(RngAlgorithm::ChaCha, &seed_bytes),
    )
}

fn run_scenarios() -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;

    for scenario in SCENARIOS.iter() {
        match (scenario.run)() {
            Ok(world) => {
                let violations = check_ledger(&world.ledger);
                if violations.is_empty() {
                    passed += 1;
                } else {
                    println!("  [FAIL] {}: {:?}", scenario.name, violations);
                    failed += 1;
                }
            }
            Err(e) => {
                println!("  [FAIL] {}: {}", scenario.name, e);
                failed += 1;
            }
        }
    }

    println!("  scenarios: {} passed, {} failed", passed, failed);
    (passed, failed)
}

fn run_sequence_fuzz(seed: u64, iterations: usize) -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;
    let mut accepted_ops = 0;
    let mut total_ops = 0;

    let mut runner = seeded_runner(seed);

    for i in 0..iterations {
        let seq = match any::<OpSequence>().new_tree(&mut runner) {
            Ok(tree) => tree.current(),
            Err(e) => {
                println!("  [FAIL] Iteration {}: could not generate input: {}", i, e);
                failed += 1;
                continue;
            }
        };

        match run_sequence(&seq) {
            Ok(reports) => {
                total_ops += reports.len();
                accepted_ops += reports.iter().filter(|r| r.accepted).count();
                let violations = collect_violations(&reports);
                if violations.is_empty() {
                    passed += 1;
                } else {
                    println!("  [FAIL] Iteration {}:", i);
                    for v in violations.iter().take(5) {
                        println!("    {}", v);
                    }
                    failed += 1;
                }
            }
            Err(e) => {
                println!("  [FAIL] Iteration {}: {}", i, e);
                failed += 1;
            }
        }
    }

    println!(
        "  sequences: {} passed, {} failed ({} of {} ops accepted)",
        passed, failed, accepted_ops, total_ops
    );
    (passed, failed)
}

/// Every actor races for a competitive task with fewer slots than actors.
fn run_claim_race_tests(iterations: usize) -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;

    for i in 0..iterations {
        let max_workers = ((i % 5) + 1) as u8;
        let claimants = (i % ACTOR_COUNT as usize) as u8 + 1;

        let outcome = (|| -> anchor_lang::Result<(u8, u8, usize)> {
            let mut world = World::new(1, 0)?;
            register_all(&mut world, claimants)?;
            let task = world.create_task(
                CREATOR,
                TaskType::Competitive,
                max_workers,
                1_000_000,
                capability::COMPUTE,
                0,
            )?;
            let mut successes = 0;
            for index in 0..claimants {
                let actor = world.actor(index);
                if world.ledger.claim_task(actor, task).is_ok() {
                    successes += 1;
                }
            }
            let current = world.ledger.get::<Task>(&task)?.current_workers;
            let violations = check_ledger(&world.ledger).len();
            Ok((current, successes, violations))
        })();

        let expected = max_workers.min(claimants);
        match outcome {
            Ok((current, successes, 0)) if current == expected && successes == expected => {
                passed += 1
            }
            Ok((current, _, _)) => {
                println!(
                    "  [FAIL] Race test {}: workers={}/{} expected {}",
                    i, current, max_workers, expected
                );
                failed += 1;
            }
            Err(e) => {
                println!("  [FAIL] Race test {}: {}", i, e);
                failed += 1;
            }
        }
    }

    println!("  claim_races: {} passed, {} failed", passed, failed);
    (passed, failed)
}

fn run_edge_case_tests() -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;
    let mut check = |name: &str, ok: bool| {
        if ok {
            passed += 1;
        } else {
            println!("  [FAIL] {}", name);
            failed += 1;
        }
    };

    // Fee above the cap and a zero threshold are rejected
    check("fee above cap", World::new(1, 1001).is_err());
    check("zero threshold", World::new(0, 100).is_err());

    // Smallest collaborative reward leaves nothing behind
    let smallest = (|| -> anchor_lang::Result<bool> {
        let mut world = World::new(1, 1000)?;
        register_all(&mut world, 3)?;
        let task = world.create_task(
            CREATOR,
            TaskType::Collaborative,
            3,
            1,
            capability::COMPUTE,
            0,
        )?;
        for index in 0..3 {
            let actor = world.actor(index);
            world.ledger.claim_task(actor, task)?;
        }
        for index in 0..3 {
            let actor = world.actor(index);
            world.ledger.complete_task(actor, task, [1u8; 32], None)?;
        }
        let escrow = world.ledger.get::<Task>(&task)?.escrow;
        Ok(world.ledger.balance(&escrow) == 0 && check_ledger(&world.ledger).is_empty())
    })();
    check("reward of one lamport", matches!(smallest, Ok(true)));

    // Reputation saturates at the maximum
    let saturated = (|| -> anchor_lang::Result<bool> {
        let mut world = World::new(1, 0)?;
        let agent = world.register(0, capability::COMPUTE)?;
        let worker = world.actor(0);
        for _ in 0..105 {
            let task = world.create_task(
                CREATOR,
                TaskType::Exclusive,
                1,
                10,
                capability::COMPUTE,
                0,
            )?;
            world.ledger.claim_task(worker, task)?;
            world.ledger.complete_task(worker, task, [1u8; 32], None)?;
        }
        let reputation = world
            .ledger
            .get::<AgentRegistration>(&agent)?
            .reputation;
        Ok(reputation == 10_000)
    })();
    check("reputation saturates", matches!(saturated, Ok(true)));

    println!("  edge_cases: {} passed, {} failed", passed, failed);
    (passed, failed)
}
