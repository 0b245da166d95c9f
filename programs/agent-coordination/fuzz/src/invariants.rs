//! Protocol invariant checking for fuzz testing
//!
//! Each check inspects a [`Ledger`] (or a before/after pair of ledgers) and
//! returns a result enum; [`check_ledger`] and [`check_transition`] collect
//! every violation as a printable string.

use std::collections::BTreeMap;

use agent_coordination::instructions::constants::MAX_REPUTATION;
use agent_coordination::pda;
use agent_coordination::state::{
    AgentRegistration, AgentStatus, Dispute, DisputeStatus, DisputeVote, ProtocolConfig, Task,
    TaskClaim, TaskEscrow, TaskStatus, TaskType,
};
use anchor_lang::prelude::Pubkey;

use crate::ledger::{protocol_address, Ledger};

/// Escrow invariant results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowInvariantResult {
    Valid,
    DistributedExceedsAmount { distributed: u64, amount: u64 },
    BalanceMismatch { expected: u64, actual: u64 },
    ClosedWithBalance { balance: u64 },
    ClosedFlagMismatch { is_closed: bool, status: TaskStatus },
    CompletedNotFullyDistributed { distributed: u64, amount: u64 },
    MonotonicityViolation { old_distributed: u64, new_distributed: u64 },
    Reopened,
}

/// Task state machine invariant results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskInvariantResult {
    Valid,
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },
    TerminalStateModified { status: TaskStatus },
    WorkerCountExceedsMax { current: u8, max: u8 },
    WorkerCountDecreased { before: u8, after: u8 },
    CompletionsExceedRequired { completions: u8, required: u8 },
    ClaimCountMismatch { current_workers: u8, claims: usize },
}

/// Agent invariant results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentInvariantResult {
    Valid,
    ReputationOutOfBounds { reputation: u16 },
    ActiveTasksMismatch { active_tasks: u8, open_claims: usize },
    ExclusiveFlagMismatch { holds_exclusive: bool, open_exclusive: usize },
    BusyWithoutExclusive,
}

/// Dispute invariant results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisputeInvariantResult {
    Valid,
    VoteCountMismatch { votes_for: u8, votes_against: u8, total: u8 },
    VoteRecordMismatch { total: u8, records: usize },
    ResolvedWithoutQuorum { total: u8, threshold: u8 },
    ExpiredWithQuorum { total: u8, threshold: u8 },
    ActiveOnUndisputedTask { status: TaskStatus },
    StatusRegressed { from: DisputeStatus, to: DisputeStatus },
}

/// Record uniqueness results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniquenessInvariantResult {
    Valid,
    ClaimOffAddress { expected: Pubkey, actual: Pubkey },
    VoteOffAddress { expected: Pubkey, actual: Pubkey },
}

/// Lamport conservation results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConservationInvariantResult {
    Valid,
    SupplyChanged { minted: u128, held: u128 },
}

/// Protocol counter results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterInvariantResult {
    Valid,
    Mismatch { counter: &'static str, expected: u64, actual: u64 },
    Decreased { counter: &'static str, before: u64, after: u64 },
}

macro_rules! impl_is_valid {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $ty {
                pub fn is_valid(&self) -> bool {
                    matches!(self, Self::Valid)
                }
            }
        )*
    };
}

impl_is_valid!(
    EscrowInvariantResult,
    TaskInvariantResult,
    AgentInvariantResult,
    DisputeInvariantResult,
    UniquenessInvariantResult,
    ConservationInvariantResult,
    CounterInvariantResult,
);

// ============================================================================
// Escrow Invariants
// ============================================================================

/// `distributed <= amount` must always hold.
pub fn check_escrow_distribution_bounded(escrow: &TaskEscrow) -> EscrowInvariantResult {
    if escrow.distributed > escrow.amount {
        EscrowInvariantResult::DistributedExceedsAmount {
            distributed: escrow.distributed,
            amount: escrow.amount,
        }
    } else {
        EscrowInvariantResult::Valid
    }
}

/// An open escrow holds exactly what it still owes; a closed one holds nothing.
pub fn check_escrow_balance(escrow: &TaskEscrow, balance: u64) -> EscrowInvariantResult {
    if escrow.is_closed {
        if balance != 0 {
            return EscrowInvariantResult::ClosedWithBalance { balance };
        }
        return EscrowInvariantResult::Valid;
    }
    let expected = match escrow.amount.checked_sub(escrow.distributed) {
        Some(r) => r,
        None => {
            return EscrowInvariantResult::DistributedExceedsAmount {
                distributed: escrow.distributed,
                amount: escrow.amount,
            }
        }
    };
    if balance != expected {
        EscrowInvariantResult::BalanceMismatch {
            expected,
            actual: balance,
        }
    } else {
        EscrowInvariantResult::Valid
    }
}

/// The escrow is closed exactly when its task is terminal, and a Completed
/// task has paid out everything.
pub fn check_escrow_matches_task(escrow: &TaskEscrow, task: &Task) -> EscrowInvariantResult {
    if escrow.is_closed != task.status.is_terminal() {
        return EscrowInvariantResult::ClosedFlagMismatch {
            is_closed: escrow.is_closed,
            status: task.status,
        };
    }
    if task.status == TaskStatus::Completed && escrow.distributed != escrow.amount {
        return EscrowInvariantResult::CompletedNotFullyDistributed {
            distributed: escrow.distributed,
            amount: escrow.amount,
        };
    }
    EscrowInvariantResult::Valid
}

/// `distributed` never decreases and a closed escrow never reopens.
pub fn check_escrow_transition(before: &TaskEscrow, after: &TaskEscrow) -> EscrowInvariantResult {
    if after.distributed < before.distributed {
        return EscrowInvariantResult::MonotonicityViolation {
            old_distributed: before.distributed,
            new_distributed: after.distributed,
        };
    }
    if before.is_closed && !after.is_closed {
        return EscrowInvariantResult::Reopened;
    }
    EscrowInvariantResult::Valid
}

// ============================================================================
// Task State Machine Invariants
// ============================================================================

pub fn check_task_bounds(task: &Task) -> TaskInvariantResult {
    if task.current_workers > task.max_workers {
        return TaskInvariantResult::WorkerCountExceedsMax {
            current: task.current_workers,
            max: task.max_workers,
        };
    }
    if task.completions > task.required_completions {
        return TaskInvariantResult::CompletionsExceedRequired {
            completions: task.completions,
            required: task.required_completions,
        };
    }
    TaskInvariantResult::Valid
}

/// Claim records are never removed, so they match the claims counted.
pub fn check_task_claim_count(task: &Task, claims: usize) -> TaskInvariantResult {
    if task.current_workers as usize != claims {
        TaskInvariantResult::ClaimCountMismatch {
            current_workers: task.current_workers,
            claims,
        }
    } else {
        TaskInvariantResult::Valid
    }
}

pub fn check_task_transition(before: &Task, after: &Task) -> TaskInvariantResult {
    if before.status != after.status && !before.status.can_transition_to(after.status) {
        return TaskInvariantResult::InvalidStateTransition {
            from: before.status,
            to: after.status,
        };
    }
    if after.current_workers < before.current_workers {
        return TaskInvariantResult::WorkerCountDecreased {
            before: before.current_workers,
            after: after.current_workers,
        };
    }
    if before.status.is_terminal()
        && (after.status != before.status
            || after.completions != before.completions
            || after.current_workers != before.current_workers)
    {
        return TaskInvariantResult::TerminalStateModified {
            status: before.status,
        };
    }
    TaskInvariantResult::Valid
}

// ============================================================================
// Agent Invariants
// ============================================================================

pub fn check_reputation_bounds(agent: &AgentRegistration) -> AgentInvariantResult {
    if agent.reputation > MAX_REPUTATION {
        AgentInvariantResult::ReputationOutOfBounds {
            reputation: agent.reputation,
        }
    } else {
        AgentInvariantResult::Valid
    }
}

/// `active_tasks` counts the agent's claims not yet completed or released.
pub fn check_active_tasks(agent: &AgentRegistration, open_claims: usize) -> AgentInvariantResult {
    if agent.active_tasks as usize != open_claims {
        AgentInvariantResult::ActiveTasksMismatch {
            active_tasks: agent.active_tasks,
            open_claims,
        }
    } else {
        AgentInvariantResult::Valid
    }
}

/// `holds_exclusive` marks the one open Exclusive claim, and only that
/// claim keeps an agent Busy.
pub fn check_exclusive_hold(agent: &AgentRegistration, open_exclusive: usize) -> AgentInvariantResult {
    if agent.holds_exclusive != (open_exclusive == 1) || open_exclusive > 1 {
        AgentInvariantResult::ExclusiveFlagMismatch {
            holds_exclusive: agent.holds_exclusive,
            open_exclusive,
        }
    } else if agent.status == AgentStatus::Busy && !agent.holds_exclusive {
        AgentInvariantResult::BusyWithoutExclusive
    } else {
        AgentInvariantResult::Valid
    }
}

// ============================================================================
// Dispute Invariants
// ============================================================================

pub fn check_vote_counts(dispute: &Dispute, vote_records: usize) -> DisputeInvariantResult {
    let tallied = dispute.votes_for as u16 + dispute.votes_against as u16;
    if tallied != dispute.total_voters as u16 {
        return DisputeInvariantResult::VoteCountMismatch {
            votes_for: dispute.votes_for,
            votes_against: dispute.votes_against,
            total: dispute.total_voters,
        };
    }
    if dispute.total_voters as usize != vote_records {
        return DisputeInvariantResult::VoteRecordMismatch {
            total: dispute.total_voters,
            records: vote_records,
        };
    }
    DisputeInvariantResult::Valid
}

/// Resolved disputes reached quorum, Expired ones did not, and an Active
/// dispute holds its task in Disputed.
pub fn check_dispute_outcome(dispute: &Dispute, task: &Task, threshold: u8) -> DisputeInvariantResult {
    match dispute.status {
        DisputeStatus::Resolved if dispute.total_voters < threshold => {
            DisputeInvariantResult::ResolvedWithoutQuorum {
                total: dispute.total_voters,
                threshold,
            }
        }
        DisputeStatus::Expired if dispute.total_voters >= threshold => {
            DisputeInvariantResult::ExpiredWithQuorum {
                total: dispute.total_voters,
                threshold,
            }
        }
        DisputeStatus::Active if task.status != TaskStatus::Disputed => {
            DisputeInvariantResult::ActiveOnUndisputedTask {
                status: task.status,
            }
        }
        _ => DisputeInvariantResult::Valid,
    }
}

pub fn check_dispute_transition(before: &Dispute, after: &Dispute) -> DisputeInvariantResult {
    if before.status != DisputeStatus::Active && after.status != before.status {
        return DisputeInvariantResult::StatusRegressed {
            from: before.status,
            to: after.status,
        };
    }
    DisputeInvariantResult::Valid
}

// ============================================================================
// Uniqueness and Conservation
// ============================================================================

/// A claim lives at the address derived from its (task, worker) pair.
pub fn check_claim_address(key: &Pubkey, claim: &TaskClaim) -> UniquenessInvariantResult {
    let expected = pda::find_claim_address(&claim.task, &claim.worker).0;
    if *key != expected {
        UniquenessInvariantResult::ClaimOffAddress {
            expected,
            actual: *key,
        }
    } else {
        UniquenessInvariantResult::Valid
    }
}

/// A vote lives at the address derived from its (dispute, voter) pair.
pub fn check_vote_address(key: &Pubkey, vote: &DisputeVote) -> UniquenessInvariantResult {
    let expected = pda::find_vote_address(&vote.dispute, &vote.voter).0;
    if *key != expected {
        UniquenessInvariantResult::VoteOffAddress {
            expected,
            actual: *key,
        }
    } else {
        UniquenessInvariantResult::Valid
    }
}

/// Lamports only move; the total held equals what was airdropped.
pub fn check_conservation(ledger: &Ledger) -> ConservationInvariantResult {
    let held = ledger.total_balance();
    if held != ledger.minted() {
        ConservationInvariantResult::SupplyChanged {
            minted: ledger.minted(),
            held,
        }
    } else {
        ConservationInvariantResult::Valid
    }
}

// ============================================================================
// Protocol Counters
// ============================================================================

fn counter_equals(counter: &'static str, expected: u64, actual: u64) -> CounterInvariantResult {
    if expected != actual {
        CounterInvariantResult::Mismatch {
            counter,
            expected,
            actual,
        }
    } else {
        CounterInvariantResult::Valid
    }
}

/// Counters agree with the records. `total_agents` is monotonic, so it only
/// bounds the live registrations from above.
pub fn check_counters(ledger: &Ledger, config: &ProtocolConfig) -> Vec<CounterInvariantResult> {
    let tasks = ledger.iter::<Task>().count() as u64;
    let disputes = ledger.iter::<Dispute>().count() as u64;
    let completed = ledger.tasks_with_status(TaskStatus::Completed).len() as u64;
    let agents = ledger.iter::<AgentRegistration>().count() as u64;

    let mut results = vec![
        counter_equals("total_tasks", tasks, config.total_tasks),
        counter_equals("total_disputes", disputes, config.total_disputes),
        counter_equals("completed_tasks", completed, config.completed_tasks),
    ];
    if config.total_agents < agents {
        results.push(CounterInvariantResult::Mismatch {
            counter: "total_agents",
            expected: agents,
            actual: config.total_agents,
        });
    }
    results
}

pub fn check_counter_transition(
    before: &ProtocolConfig,
    after: &ProtocolConfig,
) -> Vec<CounterInvariantResult> {
    [
        ("total_agents", before.total_agents, after.total_agents),
        ("total_tasks", before.total_tasks, after.total_tasks),
        ("completed_tasks", before.completed_tasks, after.completed_tasks),
        (
            "total_value_distributed",
            before.total_value_distributed,
            after.total_value_distributed,
        ),
        ("total_disputes", before.total_disputes, after.total_disputes),
    ]
    .into_iter()
    .filter(|(_, b, a)| a < b)
    .map(|(counter, before, after)| CounterInvariantResult::Decreased {
        counter,
        before,
        after,
    })
    .collect()
}

// ============================================================================
// Aggregate checks
// ============================================================================

fn push<T: std::fmt::Debug>(out: &mut Vec<String>, key: &Pubkey, valid: bool, result: T) {
    if !valid {
        out.push(format!("{key}: {result:?}"));
    }
}

/// Every state invariant over the whole ledger. Empty means valid.
pub fn check_ledger(ledger: &Ledger) -> Vec<String> {
    let mut violations = Vec::new();

    let Ok(config) = ledger.protocol_config() else {
        return violations;
    };
    let threshold = config.dispute_threshold;

    let mut claims_per_task: BTreeMap<Pubkey, usize> = BTreeMap::new();
    let mut open_claims_per_worker: BTreeMap<Pubkey, usize> = BTreeMap::new();
    let mut open_exclusive_per_worker: BTreeMap<Pubkey, usize> = BTreeMap::new();
    for (key, claim) in ledger.iter::<TaskClaim>() {
        *claims_per_task.entry(claim.task).or_default() += 1;
        if !claim.is_completed {
            *open_claims_per_worker.entry(claim.worker).or_default() += 1;
            let exclusive = ledger
                .get::<Task>(&claim.task)
                .is_ok_and(|task| task.task_type == TaskType::Exclusive);
            if exclusive {
                *open_exclusive_per_worker.entry(claim.worker).or_default() += 1;
            }
        }
        let r = check_claim_address(&key, claim);
        push(&mut violations, &key, r.is_valid(), r);
    }

    let mut votes_per_dispute: BTreeMap<Pubkey, usize> = BTreeMap::new();
    for (key, vote) in ledger.iter::<DisputeVote>() {
        *votes_per_dispute.entry(vote.dispute).or_default() += 1;
        let r = check_vote_address(&key, vote);
        push(&mut violations, &key, r.is_valid(), r);
    }

    for (key, task) in ledger.iter::<Task>() {
        let r = check_task_bounds(task);
        push(&mut violations, &key, r.is_valid(), r);
        let claims = claims_per_task.get(&key).copied().unwrap_or(0);
        let r = check_task_claim_count(task, claims);
        push(&mut violations, &key, r.is_valid(), r);

        match ledger.get::<TaskEscrow>(&task.escrow) {
            Ok(escrow) => {
                for r in [
                    check_escrow_distribution_bounded(escrow),
                    check_escrow_balance(escrow, ledger.balance(&task.escrow)),
                    check_escrow_matches_task(escrow, task),
                ] {
                    push(&mut violations, &task.escrow, r.is_valid(), r);
                }
            }
            Err(e) => violations.push(format!("{key}: escrow unreadable: {e}")),
        }
    }

    for (key, agent) in ledger.iter::<AgentRegistration>() {
        let r = check_reputation_bounds(agent);
        push(&mut violations, &key, r.is_valid(), r);
        let open = open_claims_per_worker.get(&key).copied().unwrap_or(0);
        let r = check_active_tasks(agent, open);
        push(&mut violations, &key, r.is_valid(), r);
        let open_exclusive = open_exclusive_per_worker.get(&key).copied().unwrap_or(0);
        let r = check_exclusive_hold(agent, open_exclusive);
        push(&mut violations, &key, r.is_valid(), r);
    }

    for (key, dispute) in ledger.iter::<Dispute>() {
        let votes = votes_per_dispute.get(&key).copied().unwrap_or(0);
        let r = check_vote_counts(dispute, votes);
        push(&mut violations, &key, r.is_valid(), r);
        match ledger.get::<Task>(&dispute.task) {
            Ok(task) => {
                let r = check_dispute_outcome(dispute, task, threshold);
                push(&mut violations, &key, r.is_valid(), r);
            }
            Err(e) => violations.push(format!("{key}: task unreadable: {e}")),
        }
    }

    let r = check_conservation(ledger);
    push(&mut violations, &protocol_address(), r.is_valid(), r);
    for r in check_counters(ledger, config) {
        push(&mut violations, &protocol_address(), r.is_valid(), r);
    }

    violations
}

/// Every transition invariant between two consecutive ledger states.
pub fn check_transition(before: &Ledger, after: &Ledger) -> Vec<String> {
    let mut violations = Vec::new();

    for (key, old) in before.iter::<Task>() {
        let Ok(new) = after.get::<Task>(&key) else {
            violations.push(format!("{key}: task record disappeared"));
            continue;
        };
        let r = check_task_transition(old, new);
        push(&mut violations, &key, r.is_valid(), r);
    }

    for (key, old) in before.iter::<TaskEscrow>() {
        if let Ok(new) = after.get::<TaskEscrow>(&key) {
            let r = check_escrow_transition(old, new);
            push(&mut violations, &key, r.is_valid(), r);
        }
    }

    for (key, old) in before.iter::<Dispute>() {
        if let Ok(new) = after.get::<Dispute>(&key) {
            let r = check_dispute_transition(old, new);
            push(&mut violations, &key, r.is_valid(), r);
        }
    }

    if let (Ok(old), Ok(new)) = (before.protocol_config(), after.protocol_config()) {
        for r in check_counter_transition(old, new) {
            push(&mut violations, &protocol_address(), r.is_valid(), r);
        }
    }

    violations
}
