//! Processing of `(claim, worker_agent)` pairs passed through `remaining_accounts`.
//!
//! Cancellation and dispute settlement end a task while other workers may
//! still hold open claims on it. Those workers are released here so their
//! `active_tasks` counters do not stay inflated forever.

use crate::errors::CoordinationError;
use crate::instructions::completion_helpers::release_open_claim;
use crate::state::{AgentRegistration, TaskClaim};
use anchor_lang::prelude::*;

/// Checks one `(claim, worker)` pair against the task being ended and reports
/// whether its worker still holds the claim open.
///
/// A finished claim needs nothing from its worker, whose record may already
/// be closed by deregistration.
pub fn claim_needs_release(
    claim: &TaskClaim,
    task_key: Pubkey,
    worker_key: Pubkey,
    skip_worker: Option<Pubkey>,
) -> Result<bool> {
    require!(
        claim.task == task_key && claim.worker == worker_key,
        CoordinationError::InvalidClaimAccounts
    );
    require!(
        skip_worker != Some(claim.worker),
        CoordinationError::InvalidClaimAccounts
    );
    Ok(!claim.is_completed)
}

/// Closes every open claim among `remaining_accounts` and releases its worker.
///
/// The accounts must be exactly `expected_pairs` `(claim, worker_agent)`
/// pairs, each claim owned by this program, belonging to `task_key`, passed
/// once, and never the claim of `skip_worker`. Worker accounts are only
/// checked for pairs whose claim is still open. Returns how many workers
/// were released.
pub fn release_claimants<'info>(
    remaining_accounts: &[AccountInfo<'info>],
    task_key: Pubkey,
    exclusive: bool,
    expected_pairs: usize,
    skip_worker: Option<Pubkey>,
    timestamp: i64,
) -> Result<u8> {
    require!(
        remaining_accounts.len() == expected_pairs.saturating_mul(2),
        CoordinationError::InvalidClaimAccounts
    );

    let mut seen: Vec<Pubkey> = Vec::with_capacity(expected_pairs);
    let mut released: u8 = 0;

    for pair in remaining_accounts.chunks_exact(2) {
        let claim_info = &pair[0];
        let worker_info = &pair[1];

        require!(
            claim_info.owner == &crate::ID,
            CoordinationError::InvalidAccountOwner
        );
        require!(
            !seen.contains(claim_info.key),
            CoordinationError::InvalidClaimAccounts
        );
        seen.push(*claim_info.key);

        let claim_data = claim_info.try_borrow_data()?;
        let mut claim = TaskClaim::try_deserialize(&mut &claim_data[..])?;
        drop(claim_data);

        if !claim_needs_release(&claim, task_key, *worker_info.key, skip_worker)? {
            continue;
        }

        require!(
            worker_info.owner == &crate::ID,
            CoordinationError::InvalidAccountOwner
        );
        require!(
            claim_info.is_writable && worker_info.is_writable,
            CoordinationError::InvalidInput
        );
        let mut worker_data = worker_info.try_borrow_mut_data()?;
        let mut worker = AgentRegistration::try_deserialize(&mut &worker_data[..])?;
        if release_open_claim(&mut claim, &mut worker, exclusive, timestamp)? {
            released = released
                .checked_add(1)
                .ok_or(CoordinationError::ArithmeticOverflow)?;
        }
        // Borsh only; the discriminator at [0..8] is left untouched
        AnchorSerialize::serialize(&worker, &mut &mut worker_data[8..])
            .map_err(|_| anchor_lang::error::ErrorCode::AccountDidNotSerialize)?;
        drop(worker_data);

        let mut claim_data = claim_info.try_borrow_mut_data()?;
        AnchorSerialize::serialize(&claim, &mut &mut claim_data[8..])
            .map_err(|_| anchor_lang::error::ErrorCode::AccountDidNotSerialize)?;
    }

    Ok(released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;

    fn claim(task: Pubkey, worker: Pubkey, is_completed: bool) -> TaskClaim {
        TaskClaim {
            task,
            worker,
            is_completed,
            ..TaskClaim::default()
        }
    }

    #[test]
    fn test_completed_claim_skips_worker() {
        let task = Pubkey::new_unique();
        let worker = Pubkey::new_unique();
        let done = claim(task, worker, true);
        assert!(!claim_needs_release(&done, task, worker, None).unwrap());
        let open = claim(task, worker, false);
        assert!(claim_needs_release(&open, task, worker, None).unwrap());
    }

    #[test]
    fn test_pair_must_match_claim() {
        let task = Pubkey::new_unique();
        let worker = Pubkey::new_unique();
        let done = claim(task, worker, true);

        for (task_key, worker_key) in [
            (Pubkey::new_unique(), worker),
            (task, Pubkey::new_unique()),
        ] {
            let err = claim_needs_release(&done, task_key, worker_key, None).unwrap_err();
            assert!(error_matches(&err, CoordinationError::InvalidClaimAccounts));
        }
    }

    #[test]
    fn test_skipped_worker_rejected() {
        let task = Pubkey::new_unique();
        let worker = Pubkey::new_unique();
        let err = claim_needs_release(&claim(task, worker, false), task, worker, Some(worker))
            .unwrap_err();
        assert!(error_matches(&err, CoordinationError::InvalidClaimAccounts));
    }
}
