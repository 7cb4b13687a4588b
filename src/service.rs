//! Service layer API for transaction lifecycle operations
use super::budget::{ActivityConstraint, BudgetRow};
use super::code::{self, CodeInputs, CodePreview, UniqueCode};
use super::config::{Config, InitialStatus};
use super::error::{EngineError, ErrorKind};
use super::matcher;
use super::sequence::{SequenceAllocator, SledSequenceAllocator};
use super::store::TransactionStore;
use super::transaction::{AuditEntry, Transaction, TransactionDraft};
use super::types::Actor;
use super::utils;
use log::{info, warn};
use std::sync::Arc;

/// Read access to the ledger's budget data. Implementations return unfiltered snapshots.
pub trait BudgetSource {
    fn list_budget_rows(
        &self,
        activity_id: &str,
        zone_id: &str,
        fiscal_year: u16,
    ) -> Result<Vec<BudgetRow>, EngineError>;

    fn activity_constraint(&self, activity_id: &str)
    -> Result<Option<ActivityConstraint>, EngineError>;
}

pub struct TransactionService<A: SequenceAllocator = SledSequenceAllocator> {
    instance: Arc<sled::Db>,
    store: TransactionStore,
    sequences: A,
    config: Config,
}

impl TransactionService<SledSequenceAllocator> {
    /// Uses the database for both transaction records and sequence counters.
    pub fn new(instance: Arc<sled::Db>, config: Config) -> Result<Self, EngineError> {
        let sequences = SledSequenceAllocator::open(&instance)?;
        Self::with_allocator(instance, sequences, config)
    }
}

impl<A: SequenceAllocator> TransactionService<A> {
    pub fn with_allocator(
        instance: Arc<sled::Db>,
        sequences: A,
        config: Config,
    ) -> Result<Self, EngineError> {
        let store = TransactionStore::open(&instance)?;
        Ok(Self {
            instance,
            store,
            sequences,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Placeholder-filled code for display. Never touches the sequence counters.
    pub fn preview_code(&self, inputs: &CodeInputs) -> CodePreview {
        code::preview_code(inputs)
    }

    /// Allocates a sequence number. Call exactly once per committed transaction.
    pub fn finalize_code(&self, inputs: &CodeInputs) -> Result<UniqueCode, EngineError> {
        let code = code::finalize_code(inputs, &self.sequences)?;
        info!("finalized unique code {code}");
        Ok(code)
    }

    pub fn filter_budgets(
        &self,
        rows: &[BudgetRow],
        constraint: Option<&ActivityConstraint>,
        search: Option<&str>,
    ) -> Result<Vec<BudgetRow>, EngineError> {
        Ok(matcher::filter_budgets(rows, constraint, search)?)
    }

    /// The rows a user may pick for the selected activity.
    pub fn eligible_budgets(
        &self,
        source: &impl BudgetSource,
        activity_id: &str,
        zone_id: &str,
        fiscal_year: u16,
        search: Option<&str>,
    ) -> Result<Vec<BudgetRow>, EngineError> {
        let rows = source.list_budget_rows(activity_id, zone_id, fiscal_year)?;
        let constraint = source.activity_constraint(activity_id)?;
        let eligible = self
            .filter_budgets(&rows, constraint.as_ref(), search)
            .inspect_err(|e| warn!("activity {activity_id} has an unusable constraint: {e}"))?;
        Ok(eligible)
    }

    /// Stores a validated draft without a code. The transaction stays in DRAFT.
    pub fn persist(&self, draft: &TransactionDraft, actor: &Actor) -> Result<Transaction, EngineError> {
        let details = draft.validate_and_finalise()?;
        let transaction = Transaction::new(utils::new_transaction_id()?, details, actor);
        self.store.insert(&transaction)?;
        info!("persisted transaction {} by {}", transaction.id, actor.id());
        Ok(transaction)
    }

    /// Draws the sequence number and attaches the final code to a stored draft.
    pub fn assign_code(
        &self,
        id: &str,
        actor: &Actor,
        expected_version: u64,
    ) -> Result<Transaction, EngineError> {
        self.transition(id, "assign code", |txn| {
            txn.ensure_code_assignable(expected_version)?;
            let code = self.finalize_code(&txn.details.code_inputs())?;
            txn.with_code(code, actor, expected_version)
        })
    }

    /// Persist, finalize the code, and enter the configured initial status.
    pub fn submit(&self, draft: &TransactionDraft, actor: &Actor) -> Result<Transaction, EngineError> {
        let created = self.persist(draft, actor)?;
        let coded = self.assign_code(&created.id, actor, created.version)?;
        match self.config.approval.initial_status {
            InitialStatus::Draft => Ok(coded),
            InitialStatus::Pending => self.submit_for_approval(&coded.id, actor, coded.version),
        }
    }

    /// Runs `op` under [`retry_stale`] with the configured attempt cap. Whether a
    /// lost race is worth retrying is the caller's call; `op` must re-read state.
    pub fn retrying_stale<T>(
        &self,
        op: impl FnMut(u32) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        retry_stale(self.config.approval.max_stale_retries, op)
    }

    /// DRAFT -> PENDING_L1.
    pub fn submit_for_approval(
        &self,
        id: &str,
        actor: &Actor,
        expected_version: u64,
    ) -> Result<Transaction, EngineError> {
        self.transition(id, "submit", |txn| txn.submit(actor, expected_version))
    }

    pub fn approve(
        &self,
        id: &str,
        actor: &Actor,
        expected_version: u64,
    ) -> Result<Transaction, EngineError> {
        self.transition(id, "approve", |txn| txn.approve(actor, expected_version))
    }

    pub fn reject(
        &self,
        id: &str,
        actor: &Actor,
        reason: &str,
        expected_version: u64,
    ) -> Result<Transaction, EngineError> {
        self.transition(id, "reject", |txn| txn.reject(actor, reason, expected_version))
    }

    pub fn book(
        &self,
        id: &str,
        actor: &Actor,
        expected_version: u64,
    ) -> Result<Transaction, EngineError> {
        self.transition(id, "book", |txn| txn.book(actor, expected_version))
    }

    pub fn get(&self, id: &str) -> Result<Transaction, EngineError> {
        self.store.get(id)
    }

    pub fn history(&self, id: &str) -> Result<Vec<AuditEntry>, EngineError> {
        Ok(self.store.get(id)?.history)
    }

    pub fn list(&self) -> Result<Vec<Transaction>, EngineError> {
        self.store.list()
    }

    pub fn flush(&self) -> Result<(), EngineError> {
        self.store.flush()?;
        self.instance.flush()?;
        Ok(())
    }

    // Load, compute the next record, then compare-and-swap it in. No retries here.
    fn transition(
        &self,
        id: &str,
        label: &str,
        step: impl FnOnce(&Transaction) -> Result<Transaction, EngineError>,
    ) -> Result<Transaction, EngineError> {
        let result = self.store.load(id).and_then(|snapshot| {
            let next = step(&snapshot.transaction)?;
            self.store.swap(&snapshot, &next)?;
            Ok(next)
        });

        match &result {
            Ok(txn) => info!(
                "{label} {id}: now {} (level {}, version {})",
                txn.status,
                txn.approval_level(),
                txn.version
            ),
            Err(e) => match e.kind() {
                ErrorKind::Permission | ErrorKind::StaleState | ErrorKind::TerminalState => {
                    warn!("{label} {id} refused: {e}")
                }
                _ => log::debug!("{label} {id} failed: {e}"),
            },
        }
        result
    }
}

/// Runs `op` until it succeeds, fails with anything other than a stale-state
/// conflict, or `max_attempts` attempts have been made. `op` receives the
/// attempt number (starting at 1) and must re-fetch state on every call.
pub fn retry_stale<T>(
    max_attempts: u32,
    mut op: impl FnMut(u32) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                log::debug!("attempt {attempt} of {max_attempts} hit a stale state: {e}");
                attempt += 1;
            }
            other => return other,
        }
    }
}
