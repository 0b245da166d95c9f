//! Address derivation for every protocol record.
//!
//! Seeds mirror the `seeds = [...]` constraints on the instruction accounts.
//! Clients and the simulator use these helpers to locate records without an
//! index; the one-claim-per-worker and one-vote-per-arbiter rules follow from
//! the claim and vote seeds.

use anchor_lang::prelude::*;

pub const PROTOCOL_SEED: &[u8] = b"protocol";
pub const AGENT_SEED: &[u8] = b"agent";
pub const TASK_SEED: &[u8] = b"task";
pub const ESCROW_SEED: &[u8] = b"escrow";
pub const CLAIM_SEED: &[u8] = b"claim";
pub const DISPUTE_SEED: &[u8] = b"dispute";
pub const VOTE_SEED: &[u8] = b"vote";

pub fn find_protocol_address() -> (Pubkey, u8) {
    Pubkey::find_program_address(&[PROTOCOL_SEED], &crate::ID)
}

pub fn find_agent_address(agent_id: &[u8; 32]) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[AGENT_SEED, agent_id.as_ref()], &crate::ID)
}

pub fn find_task_address(creator: &Pubkey, task_id: &[u8; 32]) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[TASK_SEED, creator.as_ref(), task_id.as_ref()],
        &crate::ID,
    )
}

pub fn find_escrow_address(task: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[ESCROW_SEED, task.as_ref()], &crate::ID)
}

pub fn find_claim_address(task: &Pubkey, worker: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[CLAIM_SEED, task.as_ref(), worker.as_ref()], &crate::ID)
}

pub fn find_dispute_address(dispute_id: &[u8; 32]) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[DISPUTE_SEED, dispute_id.as_ref()], &crate::ID)
}

pub fn find_vote_address(dispute: &Pubkey, arbiter: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[VOTE_SEED, dispute.as_ref(), arbiter.as_ref()], &crate::ID)
}

/// Agent ids are the owning authority's public key bytes.
pub fn agent_id_for(authority: &Pubkey) -> [u8; 32] {
    authority.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let id = [9u8; 32];
        assert_eq!(find_agent_address(&id), find_agent_address(&id));
        assert_eq!(find_protocol_address(), find_protocol_address());
    }

    #[test]
    fn test_distinct_inputs_give_distinct_addresses() {
        let creator = Pubkey::new_from_array([1u8; 32]);
        let (task_a, _) = find_task_address(&creator, &[1u8; 32]);
        let (task_b, _) = find_task_address(&creator, &[2u8; 32]);
        assert_ne!(task_a, task_b);

        let other_creator = Pubkey::new_from_array([2u8; 32]);
        let (task_c, _) = find_task_address(&other_creator, &[1u8; 32]);
        assert_ne!(task_a, task_c);
    }

    #[test]
    fn test_role_tag_separates_namespaces() {
        let key = Pubkey::new_from_array([5u8; 32]);
        let bytes = key.to_bytes();
        let (agent, _) = find_agent_address(&bytes);
        let (dispute, _) = find_dispute_address(&bytes);
        let (escrow, _) = find_escrow_address(&key);
        assert_ne!(agent, dispute);
        assert_ne!(agent, escrow);
        assert_ne!(dispute, escrow);
    }

    #[test]
    fn test_claim_and_vote_are_pair_keyed() {
        let task = Pubkey::new_from_array([3u8; 32]);
        let worker_a = Pubkey::new_from_array([4u8; 32]);
        let worker_b = Pubkey::new_from_array([6u8; 32]);
        assert_eq!(
            find_claim_address(&task, &worker_a),
            find_claim_address(&task, &worker_a)
        );
        assert_ne!(
            find_claim_address(&task, &worker_a).0,
            find_claim_address(&task, &worker_b).0
        );
        assert_ne!(
            find_claim_address(&task, &worker_a).0,
            find_vote_address(&task, &worker_a).0
        );
    }

    #[test]
    fn test_bump_reproduces_address() {
        let id = [11u8; 32];
        let (address, bump) = find_agent_address(&id);
        let recreated =
            Pubkey::create_program_address(&[AGENT_SEED, id.as_ref(), &[bump]], &crate::ID)
                .unwrap();
        assert_eq!(address, recreated);
    }

    #[test]
    fn test_agent_id_is_authority_bytes() {
        let authority = Pubkey::new_from_array([42u8; 32]);
        assert_eq!(agent_id_for(&authority), [42u8; 32]);
    }
}
