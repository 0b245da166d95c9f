//! In-memory ledger that runs the program's state functions.
//!
//! Records live in a map keyed by their derived address, the same way the
//! program finds them on chain. Each instruction method performs the account
//! checks Anchor would (record exists, signer owns it, address is free for
//! `init`) and then calls the same pure function the on-chain handler calls.
//! Every instruction runs inside [`Ledger::transact`], so a failing
//! instruction leaves no trace.

use std::collections::BTreeMap;

use agent_coordination::errors::CoordinationError;
use agent_coordination::instructions::cancel_task::cancel;
use agent_coordination::instructions::claim_accounts::claim_needs_release;
use agent_coordination::instructions::claim_task::record_claim;
use agent_coordination::instructions::complete_task::{record_completion, CompletionOutcome};
use agent_coordination::instructions::completion_helpers::{
    release_open_claim, update_protocol_stats,
};
use agent_coordination::instructions::deregister_agent::check_deregister;
use agent_coordination::instructions::dispute_helpers::{
    expire_dispute, settle_dispute, DisputeSettlement,
};
use agent_coordination::instructions::initialize_protocol::init_config;
use agent_coordination::instructions::initiate_dispute::{
    increment_total_disputes, open_dispute, DisputeParties,
};
use agent_coordination::instructions::lamport_transfer::EscrowPayout;
use agent_coordination::instructions::register_agent::{increment_total_agents, init_agent};
use agent_coordination::instructions::suspend_agent::suspend;
use agent_coordination::instructions::task_init_helpers::{
    increment_total_tasks, init_escrow_fields, init_task_fields, validate_task_params, TaskParams,
};
use agent_coordination::instructions::unsuspend_agent::unsuspend;
use agent_coordination::instructions::update_agent::apply_update;
use agent_coordination::instructions::vote_dispute::{cast_vote, Ballot};
use agent_coordination::pda;
use agent_coordination::state::{
    capability, AgentRegistration, Dispute, DisputeVote, ProtocolConfig, Task, TaskClaim,
    TaskEscrow, TaskStatus, TaskType,
};
use anchor_lang::error::{Error, ErrorCode};
use anchor_lang::prelude::*;

/// Every record type the program stores.
#[derive(Clone)]
pub enum Record {
    Protocol(ProtocolConfig),
    Agent(AgentRegistration),
    Task(Task),
    Escrow(TaskEscrow),
    Claim(TaskClaim),
    Dispute(Dispute),
    Vote(DisputeVote),
}

impl Record {
    /// Account bytes as the program would store them, discriminator included.
    pub fn to_account_data(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        match self {
            Record::Protocol(r) => r.try_serialize(&mut data)?,
            Record::Agent(r) => r.try_serialize(&mut data)?,
            Record::Task(r) => r.try_serialize(&mut data)?,
            Record::Escrow(r) => r.try_serialize(&mut data)?,
            Record::Claim(r) => r.try_serialize(&mut data)?,
            Record::Dispute(r) => r.try_serialize(&mut data)?,
            Record::Vote(r) => r.try_serialize(&mut data)?,
        }
        Ok(data)
    }
}

/// Typed access to one [`Record`] variant.
pub trait LedgerRecord: Clone + Default {
    fn into_record(self) -> Record;
    fn from_record(record: &Record) -> Option<&Self>;
    /// Error reported when no record exists at the address.
    fn missing() -> Error;
}

macro_rules! ledger_record {
    ($ty:ty, $variant:ident, $missing:expr) => {
        impl LedgerRecord for $ty {
            fn into_record(self) -> Record {
                Record::$variant(self)
            }

            fn from_record(record: &Record) -> Option<&Self> {
                match record {
                    Record::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn missing() -> Error {
                $missing
            }
        }
    };
}

ledger_record!(
    ProtocolConfig,
    Protocol,
    ErrorCode::AccountNotInitialized.into()
);
ledger_record!(
    AgentRegistration,
    Agent,
    error!(CoordinationError::AgentNotFound)
);
ledger_record!(Task, Task, error!(CoordinationError::TaskNotFound));
ledger_record!(TaskEscrow, Escrow, ErrorCode::AccountNotInitialized.into());
ledger_record!(TaskClaim, Claim, error!(CoordinationError::NotClaimed));
ledger_record!(Dispute, Dispute, error!(CoordinationError::DisputeNotFound));
ledger_record!(DisputeVote, Vote, ErrorCode::AccountNotInitialized.into());

pub fn protocol_address() -> Pubkey {
    pda::find_protocol_address().0
}

/// Address of the agent registered by `authority`.
pub fn agent_address(authority: &Pubkey) -> Pubkey {
    pda::find_agent_address(&pda::agent_id_for(authority)).0
}

/// Records, lamport balances and a settable clock.
#[derive(Clone, Default)]
pub struct Ledger {
    records: BTreeMap<Pubkey, Record>,
    balances: BTreeMap<Pubkey, u64>,
    minted: u128,
    now: i64,
}

impl Ledger {
    pub fn new(now: i64) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn set_time(&mut self, now: i64) {
        self.now = now;
    }

    pub fn advance(&mut self, seconds: i64) {
        self.now = self.now.saturating_add(seconds);
    }

    /// Credits `lamports` out of thin air; the only way lamports enter the ledger.
    pub fn airdrop(&mut self, key: Pubkey, lamports: u64) {
        let balance = self.balances.entry(key).or_insert(0);
        *balance = balance.saturating_add(lamports);
        self.minted += lamports as u128;
    }

    pub fn balance(&self, key: &Pubkey) -> u64 {
        self.balances.get(key).copied().unwrap_or(0)
    }

    pub fn minted(&self) -> u128 {
        self.minted
    }

    pub fn total_balance(&self) -> u128 {
        self.balances.values().map(|b| *b as u128).sum()
    }

    pub fn contains(&self, key: &Pubkey) -> bool {
        self.records.contains_key(key)
    }

    pub fn records(&self) -> impl Iterator<Item = (&Pubkey, &Record)> {
        self.records.iter()
    }

    /// Every record of type `T` with its address, in address order.
    pub fn iter<'a, T: LedgerRecord + 'a>(&'a self) -> impl Iterator<Item = (Pubkey, &'a T)> + 'a {
        self.records
            .iter()
            .filter_map(|(key, record)| T::from_record(record).map(|inner| (*key, inner)))
    }

    pub fn get<T: LedgerRecord>(&self, key: &Pubkey) -> Result<&T> {
        match self.records.get(key) {
            Some(record) => {
                T::from_record(record).ok_or_else(|| ErrorCode::AccountDiscriminatorMismatch.into())
            }
            None => Err(T::missing()),
        }
    }

    pub fn protocol_config(&self) -> Result<&ProtocolConfig> {
        self.get(&protocol_address())
    }

    /// Serialized snapshot of every record and balance, for equality checks.
    pub fn fingerprint(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (key, record) in &self.records {
            out.extend_from_slice(key.as_ref());
            out.extend_from_slice(&record.to_account_data()?);
        }
        for (key, balance) in &self.balances {
            out.extend_from_slice(key.as_ref());
            out.extend_from_slice(&balance.to_le_bytes());
        }
        out.extend_from_slice(&self.now.to_le_bytes());
        Ok(out)
    }

    /// Runs `f` atomically: on error every record and balance is restored.
    pub fn transact<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }

    fn load<T: LedgerRecord>(&self, key: &Pubkey) -> Result<T> {
        self.get::<T>(key).cloned()
    }

    /// `init_if_needed`: the stored record, or a zeroed one.
    fn load_or_default<T: LedgerRecord>(&self, key: &Pubkey) -> Result<T> {
        match self.records.get(key) {
            Some(_) => self.load(key),
            None => Ok(T::default()),
        }
    }

    fn store<T: LedgerRecord>(&mut self, key: Pubkey, value: T) {
        self.records.insert(key, value.into_record());
    }

    /// `init`: fails rather than overwrite an occupied address.
    fn create<T: LedgerRecord>(&mut self, key: Pubkey, value: T) -> Result<()> {
        require!(!self.contains(&key), CoordinationError::AddressInUse);
        self.store(key, value);
        Ok(())
    }

    fn transfer(&mut self, from: Pubkey, to: Pubkey, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let shortfall = if matches!(self.records.get(&from), Some(Record::Escrow(_))) {
            CoordinationError::InsufficientEscrowBalance
        } else {
            CoordinationError::InsufficientFunds
        };
        let from_balance = self
            .balance(&from)
            .checked_sub(amount)
            .ok_or(shortfall)?;
        let to_balance = self
            .balance(&to)
            .checked_add(amount)
            .ok_or(CoordinationError::ArithmeticOverflow)?;
        self.balances.insert(from, from_balance);
        self.balances.insert(to, to_balance);
        Ok(())
    }

    fn pay_out(
        &mut self,
        escrow: Pubkey,
        payout: &EscrowPayout,
        worker: Pubkey,
        treasury: Pubkey,
        creator: Pubkey,
    ) -> Result<()> {
        self.transfer(escrow, worker, payout.to_worker)?;
        self.transfer(escrow, treasury, payout.to_treasury)?;
        self.transfer(escrow, creator, payout.to_creator)
    }

    /// Closes every open claim on `task_key` except `skip_worker`'s and
    /// releases the workers.
    ///
    /// Walks the same `(claim, worker)` pairs a client passes on-chain and
    /// checks them in the same order: a finished claim is skipped before its
    /// worker record is read, so a deregistered worker never blocks the task.
    fn release_task_claims(&mut self, task_key: Pubkey, skip_worker: Option<Pubkey>) -> Result<u8> {
        let exclusive = self.get::<Task>(&task_key)?.task_type == TaskType::Exclusive;
        let claims: Vec<(Pubkey, TaskClaim)> = self
            .claims_for_task(&task_key)
            .into_iter()
            .filter(|(_, claim)| Some(claim.worker) != skip_worker)
            .map(|(key, claim)| (key, claim.clone()))
            .collect();

        let mut released: u8 = 0;
        for (claim_key, mut claim) in claims {
            let worker_key = claim.worker;
            if !claim_needs_release(&claim, task_key, worker_key, skip_worker)? {
                continue;
            }
            let mut worker: AgentRegistration = self
                .load(&worker_key)
                .map_err(|_| error!(CoordinationError::InvalidAccountOwner))?;
            if release_open_claim(&mut claim, &mut worker, exclusive, self.now)? {
                released = released
                    .checked_add(1)
                    .ok_or(CoordinationError::ArithmeticOverflow)?;
            }
            self.store(worker_key, worker);
            self.store(claim_key, claim);
        }
        Ok(released)
    }

    // ------------------------------------------------------------------
    // Instructions
    // ------------------------------------------------------------------

    pub fn initialize_protocol(
        &mut self,
        authority: Pubkey,
        treasury: Pubkey,
        dispute_threshold: u8,
        protocol_fee_bps: u16,
        min_arbiter_stake: u64,
    ) -> Result<Pubkey> {
        self.transact(|ledger| {
            let (key, bump) = pda::find_protocol_address();
            require!(!ledger.contains(&key), CoordinationError::AddressInUse);
            let mut config = ProtocolConfig::default();
            init_config(
                &mut config,
                authority,
                treasury,
                dispute_threshold,
                protocol_fee_bps,
                min_arbiter_stake,
                bump,
            )?;
            ledger.create(key, config)?;
            Ok(key)
        })
    }

    pub fn register_agent(
        &mut self,
        authority: Pubkey,
        capabilities: u64,
        endpoint: &str,
        metadata_uri: Option<&str>,
    ) -> Result<Pubkey> {
        self.register_agent_with_id(
            authority,
            pda::agent_id_for(&authority),
            capabilities,
            endpoint,
            metadata_uri,
        )
    }

    pub fn register_agent_with_id(
        &mut self,
        authority: Pubkey,
        agent_id: [u8; 32],
        capabilities: u64,
        endpoint: &str,
        metadata_uri: Option<&str>,
    ) -> Result<Pubkey> {
        self.transact(|ledger| {
            let (key, bump) = pda::find_agent_address(&agent_id);
            let mut config: ProtocolConfig = ledger.load(&protocol_address())?;
            let mut agent: AgentRegistration = ledger.load_or_default(&key)?;

            init_agent(
                &mut agent,
                agent_id,
                authority,
                capabilities,
                endpoint.to_string(),
                metadata_uri.map(str::to_string),
                bump,
                ledger.now,
            )?;
            increment_total_agents(&mut config)?;

            ledger.store(key, agent);
            ledger.store(protocol_address(), config);
            Ok(key)
        })
    }

    pub fn update_agent(
        &mut self,
        authority: Pubkey,
        capabilities: Option<u64>,
        endpoint: Option<&str>,
        metadata_uri: Option<&str>,
    ) -> Result<()> {
        self.transact(|ledger| {
            let key = agent_address(&authority);
            let mut agent: AgentRegistration = ledger.load(&key)?;
            require!(
                agent.authority == authority,
                CoordinationError::Unauthorized
            );
            apply_update(
                &mut agent,
                capabilities,
                endpoint.map(str::to_string),
                metadata_uri.map(str::to_string),
                ledger.now,
            )?;
            ledger.store(key, agent);
            Ok(())
        })
    }

    /// Closes the caller's registration. Lamports held by the record are not
    /// modelled, so closing only removes it.
    pub fn deregister_agent(&mut self, authority: Pubkey) -> Result<()> {
        self.transact(|ledger| {
            let key = agent_address(&authority);
            let agent: AgentRegistration = ledger.load(&key)?;
            require!(
                agent.authority == authority,
                CoordinationError::Unauthorized
            );
            check_deregister(&agent)?;
            ledger.records.remove(&key);
            Ok(())
        })
    }

    pub fn suspend_agent(&mut self, signer: Pubkey, agent_key: Pubkey) -> Result<()> {
        self.transact(|ledger| {
            let mut agent: AgentRegistration = ledger.load(&agent_key)?;
            let config = ledger.protocol_config()?;
            require!(config.authority == signer, CoordinationError::Unauthorized);
            suspend(&mut agent)?;
            ledger.store(agent_key, agent);
            Ok(())
        })
    }

    pub fn unsuspend_agent(&mut self, signer: Pubkey, agent_key: Pubkey) -> Result<()> {
        self.transact(|ledger| {
            let mut agent: AgentRegistration = ledger.load(&agent_key)?;
            let config = ledger.protocol_config()?;
            require!(config.authority == signer, CoordinationError::Unauthorized);
            unsuspend(&mut agent)?;
            ledger.store(agent_key, agent);
            Ok(())
        })
    }

    pub fn create_task(&mut self, creator: Pubkey, params: TaskParams) -> Result<Pubkey> {
        self.transact(|ledger| {
            let (task_key, task_bump) = pda::find_task_address(&creator, &params.task_id);
            let (escrow_key, escrow_bump) = pda::find_escrow_address(&task_key);
            require!(
                !ledger.contains(&task_key) && !ledger.contains(&escrow_key),
                CoordinationError::AddressInUse
            );
            let mut config: ProtocolConfig = ledger.load(&protocol_address())?;

            let task_type = validate_task_params(&params, ledger.now)?;
            ledger.transfer(creator, escrow_key, params.reward_amount)?;

            let mut task = Task::default();
            init_task_fields(
                &mut task,
                &params,
                task_type,
                creator,
                escrow_key,
                task_bump,
                config.protocol_fee_bps,
                ledger.now,
            );
            let mut escrow = TaskEscrow::default();
            init_escrow_fields(&mut escrow, task_key, params.reward_amount, escrow_bump);
            increment_total_tasks(&mut config)?;

            ledger.create(task_key, task)?;
            ledger.create(escrow_key, escrow)?;
            ledger.store(protocol_address(), config);
            Ok(task_key)
        })
    }

    /// Returns the claim address.
    pub fn claim_task(&mut self, authority: Pubkey, task_key: Pubkey) -> Result<Pubkey> {
        self.transact(|ledger| {
            let worker_key = agent_address(&authority);
            let mut worker: AgentRegistration = ledger.load(&worker_key)?;
            require!(
                worker.authority == authority,
                CoordinationError::Unauthorized
            );
            let mut task: Task = ledger.load(&task_key)?;
            let (claim_key, claim_bump) = pda::find_claim_address(&task_key, &worker_key);
            let mut claim: TaskClaim = ledger.load_or_default(&claim_key)?;

            record_claim(
                &mut task,
                task_key,
                &mut claim,
                claim_bump,
                &mut worker,
                worker_key,
                ledger.now,
            )?;

            ledger.store(task_key, task);
            ledger.store(claim_key, claim);
            ledger.store(worker_key, worker);
            Ok(claim_key)
        })
    }

    pub fn complete_task(
        &mut self,
        authority: Pubkey,
        task_key: Pubkey,
        proof_hash: [u8; 32],
        result_data: Option<[u8; 64]>,
    ) -> Result<CompletionOutcome> {
        self.transact(|ledger| {
            let worker_key = agent_address(&authority);
            let mut worker: AgentRegistration = ledger.load(&worker_key)?;
            require!(
                worker.authority == authority,
                CoordinationError::Unauthorized
            );
            let mut task: Task = ledger.load(&task_key)?;
            let claim_key = pda::find_claim_address(&task_key, &worker_key).0;
            let mut claim: TaskClaim = ledger.load(&claim_key)?;
            let mut escrow: TaskEscrow = ledger.load(&task.escrow)?;
            let mut config: ProtocolConfig = ledger.load(&protocol_address())?;

            let outcome = record_completion(
                &mut task,
                &mut escrow,
                &mut claim,
                &mut worker,
                proof_hash,
                result_data,
                ledger.now,
            )?;
            let payout = outcome.payout;
            ledger.pay_out(task.escrow, &payout, authority, config.treasury, task.creator)?;

            let distributed = payout
                .to_worker
                .checked_add(payout.to_treasury)
                .ok_or(CoordinationError::ArithmeticOverflow)?;
            update_protocol_stats(&mut config, distributed, outcome.task_completed)?;

            ledger.store(task.escrow, escrow);
            ledger.store(task_key, task);
            ledger.store(claim_key, claim);
            ledger.store(worker_key, worker);
            ledger.store(protocol_address(), config);
            Ok(outcome)
        })
    }

    /// Cancels the task and releases every claimant still holding it.
    pub fn cancel_task(&mut self, creator: Pubkey, task_key: Pubkey) -> Result<EscrowPayout> {
        self.transact(|ledger| {
            let mut task: Task = ledger.load(&task_key)?;
            require!(task.creator == creator, CoordinationError::Unauthorized);
            let mut escrow: TaskEscrow = ledger.load(&task.escrow)?;

            let payout = cancel(&mut task, &mut escrow, ledger.now)?;
            ledger.transfer(task.escrow, creator, payout.to_creator)?;

            ledger.store(task.escrow, escrow);
            ledger.store(task_key, task);
            ledger.release_task_claims(task_key, None)?;
            Ok(payout)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn initiate_dispute(
        &mut self,
        initiator: Pubkey,
        dispute_id: [u8; 32],
        task_key: Pubkey,
        claimant_key: Pubkey,
        evidence_hash: [u8; 32],
        resolution_type: u8,
    ) -> Result<Pubkey> {
        self.transact(|ledger| {
            let (dispute_key, bump) = pda::find_dispute_address(&dispute_id);
            require!(
                !ledger.contains(&dispute_key),
                CoordinationError::AddressInUse
            );
            let mut task: Task = ledger.load(&task_key)?;
            let claimant: AgentRegistration = ledger.load(&claimant_key)?;
            let claim_key = pda::find_claim_address(&task_key, &claimant_key).0;
            let claim: TaskClaim = ledger.load(&claim_key)?;
            let mut config: ProtocolConfig = ledger.load(&protocol_address())?;

            let parties = DisputeParties {
                task: task_key,
                claimant: claimant_key,
                claimant_authority: claimant.authority,
                initiator,
            };
            let mut dispute = Dispute::default();
            open_dispute(
                &mut dispute,
                dispute_id,
                &mut task,
                &claim,
                &parties,
                evidence_hash,
                resolution_type,
                bump,
                ledger.now,
            )?;
            increment_total_disputes(&mut config)?;

            ledger.create(dispute_key, dispute)?;
            ledger.store(task_key, task);
            ledger.store(protocol_address(), config);
            Ok(dispute_key)
        })
    }

    /// Records a vote. The vote that reaches quorum also settles the escrow
    /// and its settlement is returned.
    pub fn vote_dispute(
        &mut self,
        authority: Pubkey,
        dispute_key: Pubkey,
        approve: bool,
    ) -> Result<Option<DisputeSettlement>> {
        self.transact(|ledger| {
            let arbiter_key = agent_address(&authority);
            let mut arbiter: AgentRegistration = ledger.load(&arbiter_key)?;
            require!(
                arbiter.authority == authority,
                CoordinationError::Unauthorized
            );
            let mut dispute: Dispute = ledger.load(&dispute_key)?;
            let task_key = dispute.task;
            let mut task: Task = ledger.load(&task_key)?;
            let mut config: ProtocolConfig = ledger.load(&protocol_address())?;
            let (vote_key, vote_bump) = pda::find_vote_address(&dispute_key, &arbiter_key);
            let mut vote: DisputeVote = ledger.load_or_default(&vote_key)?;

            let ballot = Ballot {
                dispute: dispute_key,
                arbiter: arbiter_key,
                task_creator: task.creator,
                approve,
            };
            let quorum = cast_vote(
                &mut dispute,
                &mut vote,
                vote_bump,
                &mut arbiter,
                &ballot,
                config.min_arbiter_stake,
                config.dispute_threshold,
                ledger.now,
            )?;
            ledger.store(vote_key, vote);
            ledger.store(arbiter_key, arbiter);

            if !quorum {
                ledger.store(dispute_key, dispute);
                return Ok(None);
            }

            let mut escrow: TaskEscrow = ledger.load(&task.escrow)?;
            let claim_key = pda::find_claim_address(&task_key, &dispute.claimant).0;
            let mut claim: TaskClaim = ledger.load(&claim_key)?;
            let mut claimant: AgentRegistration = ledger.load(&dispute.claimant)?;

            let settlement = settle_dispute(
                &mut dispute,
                &mut task,
                &mut escrow,
                &mut claim,
                &mut claimant,
                ledger.now,
            )?;
            let payout = settlement.payout;
            ledger.pay_out(
                task.escrow,
                &payout,
                claimant.authority,
                config.treasury,
                task.creator,
            )?;

            ledger.store(task.escrow, escrow);
            ledger.store(task_key, task);
            ledger.store(claim_key, claim);
            ledger.store(dispute.claimant, claimant);
            ledger.release_task_claims(task_key, Some(dispute.claimant))?;
            ledger.store(dispute_key, dispute);

            let to_workers = payout
                .to_worker
                .checked_add(payout.to_treasury)
                .ok_or(CoordinationError::ArithmeticOverflow)?;
            update_protocol_stats(&mut config, to_workers, settlement.task_completed)?;
            ledger.store(protocol_address(), config);

            Ok(Some(settlement))
        })
    }

    /// Anyone may expire a dispute once its window closed without quorum.
    pub fn resolve_expired_dispute(&mut self, dispute_key: Pubkey) -> Result<()> {
        self.transact(|ledger| {
            let mut dispute: Dispute = ledger.load(&dispute_key)?;
            let mut task: Task = ledger.load(&dispute.task)?;
            let threshold = ledger.protocol_config()?.dispute_threshold;

            expire_dispute(&mut dispute, &mut task, threshold, ledger.now)?;

            ledger.store(dispute.task, task);
            ledger.store(dispute_key, dispute);
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Filtered scans
    // ------------------------------------------------------------------

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<(Pubkey, &Task)> {
        self.iter::<Task>()
            .filter(|(_, task)| task.status == status)
            .collect()
    }

    pub fn claims_by_worker(&self, worker: &Pubkey) -> Vec<(Pubkey, &TaskClaim)> {
        self.iter::<TaskClaim>()
            .filter(|(_, claim)| claim.worker == *worker)
            .collect()
    }

    pub fn claims_for_task(&self, task: &Pubkey) -> Vec<(Pubkey, &TaskClaim)> {
        self.iter::<TaskClaim>()
            .filter(|(_, claim)| claim.task == *task)
            .collect()
    }

    pub fn votes_for_dispute(&self, dispute: &Pubkey) -> Vec<(Pubkey, &DisputeVote)> {
        self.iter::<DisputeVote>()
            .filter(|(_, vote)| vote.dispute == *dispute)
            .collect()
    }

    /// Open tasks with a free slot the agent could claim right now.
    pub fn eligible_tasks(&self, agent_key: &Pubkey) -> Result<Vec<Pubkey>> {
        let agent: &AgentRegistration = self.get(agent_key)?;
        Ok(self
            .iter::<Task>()
            .filter(|(key, task)| {
                task.status == TaskStatus::Open
                    && task.has_free_slot()
                    && !task.is_expired(self.now)
                    && capability::has_all(agent.capabilities, task.required_capabilities)
                    && !self.contains(&pda::find_claim_address(key, agent_key).0)
            })
            .map(|(key, _)| key)
            .collect())
    }

    /// Names of the capabilities `task_key` requires that the agent lacks.
    pub fn missing_capabilities(
        &self,
        agent_key: &Pubkey,
        task_key: &Pubkey,
    ) -> Result<Vec<&'static str>> {
        let agent: &AgentRegistration = self.get(agent_key)?;
        let task: &Task = self.get(task_key)?;
        Ok(capability::names(task.required_capabilities & !agent.capabilities))
    }

    /// Claim scan over serialized account bytes, matching the worker field
    /// at its published offset.
    pub fn claims_matching_worker_bytes(&self, worker: &Pubkey) -> Result<Vec<Pubkey>> {
        let range = TaskClaim::WORKER_OFFSET..TaskClaim::WORKER_OFFSET + 32;
        let mut matches = Vec::new();
        for (key, claim) in self.iter::<TaskClaim>() {
            let mut data = Vec::with_capacity(TaskClaim::SIZE);
            claim.try_serialize(&mut data)?;
            if data.get(range.clone()) == Some(worker.as_ref()) {
                matches.push(key);
            }
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_coordination::errors::error_matches;
    use agent_coordination::state::{AgentStatus, TaskType};

    const AUTHORITY: Pubkey = Pubkey::new_from_array([0xAA; 32]);
    const TREASURY: Pubkey = Pubkey::new_from_array([0xEE; 32]);
    const CREATOR: Pubkey = Pubkey::new_from_array([1u8; 32]);
    const WORKER: Pubkey = Pubkey::new_from_array([2u8; 32]);

    fn ledger() -> Ledger {
        let mut ledger = Ledger::new(1_000);
        ledger
            .initialize_protocol(AUTHORITY, TREASURY, 1, 100, 0)
            .unwrap();
        ledger.airdrop(CREATOR, 10_000_000);
        ledger
    }

    fn params(task_id: u8, reward: u64) -> TaskParams {
        TaskParams {
            task_id: [task_id; 32],
            required_capabilities: capability::COMPUTE,
            description: [0u8; 64],
            reward_amount: reward,
            max_workers: 1,
            deadline: 0,
            task_type: TaskType::Exclusive as u8,
        }
    }

    #[test]
    fn test_protocol_initializes_once() {
        let mut ledger = ledger();
        let err = ledger
            .initialize_protocol(AUTHORITY, TREASURY, 1, 100, 0)
            .unwrap_err();
        assert!(error_matches(&err, CoordinationError::AddressInUse));
    }

    #[test]
    fn test_failed_instruction_leaves_no_trace() {
        let mut ledger = ledger();
        let before = ledger.fingerprint().unwrap();

        // Reward larger than the creator's balance fails after validation.
        let err = ledger
            .create_task(CREATOR, params(1, 20_000_000))
            .unwrap_err();
        assert!(error_matches(&err, CoordinationError::InsufficientFunds));
        assert_eq!(ledger.fingerprint().unwrap(), before);
    }

    #[test]
    fn test_task_address_collision() {
        let mut ledger = ledger();
        ledger.create_task(CREATOR, params(1, 1_000)).unwrap();
        let err = ledger.create_task(CREATOR, params(1, 1_000)).unwrap_err();
        assert!(error_matches(&err, CoordinationError::AddressInUse));
        assert_eq!(ledger.protocol_config().unwrap().total_tasks, 1);
    }

    #[test]
    fn test_missing_records_report_tagged_errors() {
        let mut ledger = ledger();
        let unknown = Pubkey::new_from_array([77u8; 32]);

        assert!(error_matches(
            &ledger.claim_task(WORKER, unknown).unwrap_err(),
            CoordinationError::AgentNotFound
        ));
        ledger
            .register_agent(WORKER, capability::COMPUTE, "https://w.example", None)
            .unwrap();
        assert!(error_matches(
            &ledger.claim_task(WORKER, unknown).unwrap_err(),
            CoordinationError::TaskNotFound
        ));
        assert!(error_matches(
            &ledger.vote_dispute(WORKER, unknown, true).unwrap_err(),
            CoordinationError::DisputeNotFound
        ));

        let task = ledger.create_task(CREATOR, params(1, 1_000)).unwrap();
        assert!(error_matches(
            &ledger.complete_task(WORKER, task, [0u8; 32], None).unwrap_err(),
            CoordinationError::NotClaimed
        ));
    }

    #[test]
    fn test_worker_scans() {
        let mut ledger = ledger();
        let worker_key = ledger
            .register_agent(WORKER, capability::COMPUTE, "https://w.example", None)
            .unwrap();
        let first = ledger.create_task(CREATOR, params(1, 1_000)).unwrap();
        let second = ledger.create_task(CREATOR, params(2, 1_000)).unwrap();

        assert_eq!(ledger.eligible_tasks(&worker_key).unwrap().len(), 2);
        let claim_key = ledger.claim_task(WORKER, first).unwrap();

        assert_eq!(ledger.eligible_tasks(&worker_key).unwrap(), vec![second]);
        assert_eq!(
            ledger.claims_matching_worker_bytes(&worker_key).unwrap(),
            vec![claim_key]
        );
        assert_eq!(ledger.claims_by_worker(&worker_key).len(), 1);
        assert_eq!(ledger.tasks_with_status(TaskStatus::InProgress).len(), 1);
        assert_eq!(ledger.tasks_with_status(TaskStatus::Open).len(), 1);
        assert_eq!(
            ledger.get::<AgentRegistration>(&worker_key).unwrap().status,
            AgentStatus::Busy
        );
    }

    #[test]
    fn test_missing_capabilities_named() {
        let mut ledger = ledger();
        let worker_key = ledger
            .register_agent(WORKER, capability::COMPUTE, "https://w.example", None)
            .unwrap();
        let mut storage_job = params(1, 1_000);
        storage_job.required_capabilities =
            capability::COMPUTE | capability::STORAGE | capability::VERIFICATION;
        let task = ledger.create_task(CREATOR, storage_job).unwrap();

        assert_eq!(
            ledger.missing_capabilities(&worker_key, &task).unwrap(),
            vec!["STORAGE", "VERIFICATION"]
        );
        assert!(ledger.eligible_tasks(&worker_key).unwrap().is_empty());
        let err = ledger.claim_task(WORKER, task).unwrap_err();
        assert!(error_matches(&err, CoordinationError::CapabilityMismatch));

        let compute_job = ledger.create_task(CREATOR, params(2, 1_000)).unwrap();
        assert!(ledger
            .missing_capabilities(&worker_key, &compute_job)
            .unwrap()
            .is_empty());
    }
}
