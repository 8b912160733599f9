// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Vault Ledger
//!
//! Single writer of account state. Every balance change goes through
//! [`VaultLedger::apply_operation`], which validates the operation against
//! the account's sequence number, nonce set and the engine's range proofs,
//! then appends it to the log under the next global position.
//!
//! ## Locking
//!
//! - each account sits behind its own async mutex, so operations on
//!   disjoint accounts run in parallel;
//! - transfers lock both accounts in address order;
//! - the journal mutex is only held to assign a position and append.
//!
//! ## Chain durability
//!
//! Logged operations start `Pending`. The anchor worker drains them into
//! commitments (`InFlight`), then marks them `Committed` (archived) or
//! `Uncommitted`. Uncommitted batches are kept until re-queued.

mod types;

pub use types::*;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::fhe::{Ciphertext, FheEngine, FheError, RangeStatement};
use crate::storage::OperationLog;

/// Longest accepted client nonce, in bytes.
pub const MAX_NONCE_LEN: usize = 128;

// =============================================================================
// Error Type
// =============================================================================

/// Ledger validation and storage errors. None carries a plaintext balance.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("account {0} already exists")]
    AccountExists(AccountId),

    #[error("sequence conflict: expected {expected}, submitted {submitted}")]
    SequenceConflict { expected: u64, submitted: u64 },

    #[error("insufficient funds: underflow proof did not confirm")]
    InsufficientFundsProof,

    #[error("amount is not a positive value within the per-operation limit")]
    InvalidAmount,

    #[error("amount proof does not match the ciphertext and operation")]
    AmountProofRejected,

    #[error("resulting balance would exceed the vault balance limit")]
    BalanceLimitExceeded,

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Engine(#[from] FheError),

    #[error("ledger storage error: {0}")]
    Storage(String),

    #[error("engine task failed: {0}")]
    EngineTask(String),
}

// =============================================================================
// Internal State
// =============================================================================

struct Account {
    balance: Ciphertext,
    sequence: u64,
    nonces: HashMap<String, Receipt>,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Journal {
    log: Vec<LoggedOperation>,
    states: Vec<CommitState>,
    pending: VecDeque<u64>,
    uncommitted: Vec<UncommittedBatch>,
    next_batch_id: u64,
}

impl Journal {
    fn next_position(&self) -> u64 {
        self.log.len() as u64 + 1
    }

    fn state_mut(&mut self, position: u64) -> Option<&mut CommitState> {
        position
            .checked_sub(1)
            .and_then(|i| self.states.get_mut(i as usize))
    }
}

// =============================================================================
// VaultLedger
// =============================================================================

/// Authoritative, process-owned balance store.
pub struct VaultLedger {
    engine: Arc<FheEngine>,
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<Account>>>>,
    journal: Mutex<Journal>,
    store: Option<Arc<OperationLog>>,
}

impl VaultLedger {
    /// Empty in-memory ledger.
    pub fn new(engine: Arc<FheEngine>) -> Self {
        Self {
            engine,
            accounts: RwLock::new(HashMap::new()),
            journal: Mutex::new(Journal::default()),
            store: None,
        }
    }

    /// Rebuild a ledger from its durable journal and keep writing to it.
    ///
    /// Operations are re-applied in position order; each replayed receipt
    /// must reproduce the stored balance fingerprints exactly.
    pub async fn restore(
        engine: Arc<FheEngine>,
        store: Arc<OperationLog>,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(engine);

        let accounts = store.accounts().map_err(storage_err)?;
        let operations = store.operations().map_err(storage_err)?;
        let archived = store.archived().map_err(storage_err)?;

        {
            let mut map = ledger.accounts.write().await;
            for record in &accounts {
                ledger.engine.check_compatible(&record.balance)?;
                map.insert(
                    record.account,
                    Arc::new(Mutex::new(Account {
                        balance: record.balance.clone(),
                        sequence: 0,
                        nonces: HashMap::new(),
                        created_at: record.created_at,
                    })),
                );
            }
        }

        for logged in &operations {
            ledger
                .apply(logged.operation.clone(), Some(&logged.receipt))
                .await?;
        }

        {
            let mut journal = ledger.journal.lock().await;
            for (position, commitment) in &archived {
                if let Some(state) = journal.state_mut(*position) {
                    *state = CommitState::Committed {
                        commitment: *commitment,
                    };
                }
            }
            let pending: VecDeque<u64> = journal
                .states
                .iter()
                .enumerate()
                .filter(|(_, s)| **s == CommitState::Pending)
                .map(|(i, _)| i as u64 + 1)
                .collect();
            journal.pending = pending;
        }

        tracing::info!(
            accounts = accounts.len(),
            operations = operations.len(),
            archived = archived.len(),
            "Ledger restored from journal"
        );

        ledger.store = Some(store);
        Ok(ledger)
    }

    /// Attach a durable journal to an empty ledger.
    pub fn with_store(mut self, store: Arc<OperationLog>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn engine(&self) -> &Arc<FheEngine> {
        &self.engine
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Open an account with an encrypted zero balance.
    pub async fn open_account(&self, account: AccountId) -> Result<AccountSnapshot, LedgerError> {
        let mut map = self.accounts.write().await;
        if map.contains_key(&account) {
            return Err(LedgerError::AccountExists(account));
        }

        let record = AccountRecord {
            account,
            balance: self.engine.zero(),
            created_at: Utc::now(),
        };
        if let Some(store) = &self.store {
            store.record_account(&record).map_err(storage_err)?;
        }

        map.insert(
            account,
            Arc::new(Mutex::new(Account {
                balance: record.balance.clone(),
                sequence: 0,
                nonces: HashMap::new(),
                created_at: record.created_at,
            })),
        );

        tracing::info!(account = %account, "Opened vault account");

        Ok(AccountSnapshot {
            account,
            balance: record.balance,
            sequence: 0,
            created_at: record.created_at,
        })
    }

    pub async fn account(&self, account: &AccountId) -> Result<AccountSnapshot, LedgerError> {
        let handle = self.handle(account).await?;
        let state = handle.lock().await;
        Ok(AccountSnapshot {
            account: *account,
            balance: state.balance.clone(),
            sequence: state.sequence,
            created_at: state.created_at,
        })
    }

    async fn handle(&self, account: &AccountId) -> Result<Arc<Mutex<Account>>, LedgerError> {
        self.accounts
            .read()
            .await
            .get(account)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(*account))
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Validate and apply one operation.
    pub async fn apply_operation(&self, op: Operation) -> Result<ApplyOutcome, LedgerError> {
        self.apply(op, None).await
    }

    async fn apply(
        &self,
        op: Operation,
        replay: Option<&Receipt>,
    ) -> Result<ApplyOutcome, LedgerError> {
        validate_shape(&op)?;
        self.engine.check_compatible(&op.amount)?;

        match op.kind.clone() {
            OperationKind::Deposit { account } | OperationKind::Withdraw { account } => {
                let handle = self.handle(&account).await?;
                let mut source = handle.lock().await;

                if let Some(original) = self.precheck(&source, &op).await? {
                    return Ok(ApplyOutcome::Duplicate(original));
                }

                let balance = if matches!(op.kind, OperationKind::Deposit { .. }) {
                    self.credit(&source.balance, &op.amount).await?
                } else {
                    self.debit(&source.balance, &op.amount).await?
                };

                let receipt = self
                    .record(&op, (account, &*source, &balance), None, replay)
                    .await?;
                commit_account(&mut source, balance, Some((&op.nonce, &receipt)));
                self.log_applied(&op, &receipt, replay.is_some());
                Ok(ApplyOutcome::Applied(receipt))
            }
            OperationKind::Transfer { from, to } => {
                let from_handle = self.handle(&from).await?;
                let to_handle = self.handle(&to).await?;

                // Address order prevents lock-order inversion between
                // opposing transfers.
                let (mut source, mut dest) = if from < to {
                    let s = from_handle.lock().await;
                    let d = to_handle.lock().await;
                    (s, d)
                } else {
                    let d = to_handle.lock().await;
                    let s = from_handle.lock().await;
                    (s, d)
                };

                if let Some(original) = self.precheck(&source, &op).await? {
                    return Ok(ApplyOutcome::Duplicate(original));
                }

                let source_balance = self.debit(&source.balance, &op.amount).await?;
                let dest_balance = self.credit(&dest.balance, &op.amount).await?;

                let receipt = self
                    .record(
                        &op,
                        (from, &*source, &source_balance),
                        Some((to, &*dest, &dest_balance)),
                        replay,
                    )
                    .await?;
                commit_account(&mut source, source_balance, Some((&op.nonce, &receipt)));
                commit_account(&mut dest, dest_balance, None);
                self.log_applied(&op, &receipt, replay.is_some());
                Ok(ApplyOutcome::Applied(receipt))
            }
        }
    }

    /// Nonce, sequence and amount checks against the locked source account.
    ///
    /// Returns the original receipt when the nonce was already used. The
    /// amount proof is checked before the engine attests anything about
    /// the ciphertext.
    async fn precheck(
        &self,
        source: &Account,
        op: &Operation,
    ) -> Result<Option<Receipt>, LedgerError> {
        if let Some(original) = source.nonces.get(&op.nonce) {
            tracing::debug!(
                account = %op.kind.source(),
                position = original.position,
                "Duplicate nonce, returning original receipt"
            );
            return Ok(Some(original.clone()));
        }

        let expected = source.sequence + 1;
        if op.sequence != expected {
            return Err(LedgerError::SequenceConflict {
                expected,
                submitted: op.sequence,
            });
        }

        if !op.amount_proof.verify(&op.amount, op.amount_context()) {
            return Err(LedgerError::AmountProofRejected);
        }

        let amount = op.amount.clone();
        let confirmed = self
            .with_engine(move |engine| {
                let proof = engine.prove_amount(&amount)?;
                Ok(proof.confirms(
                    engine.attestation_key(),
                    RangeStatement::PositiveAmount,
                    &amount,
                ))
            })
            .await?;
        if !confirmed {
            return Err(LedgerError::InvalidAmount);
        }

        Ok(None)
    }

    async fn credit(
        &self,
        balance: &Ciphertext,
        amount: &Ciphertext,
    ) -> Result<Ciphertext, LedgerError> {
        let (balance, amount) = (balance.clone(), amount.clone());
        let (updated, confirmed) = self
            .with_engine(move |engine| {
                let updated = engine.add(&balance, &amount)?;
                let proof = engine.prove_within_limit(&updated)?;
                let confirmed =
                    proof.confirms(engine.attestation_key(), RangeStatement::WithinLimit, &updated);
                Ok((updated, confirmed))
            })
            .await?;
        if !confirmed {
            return Err(LedgerError::BalanceLimitExceeded);
        }
        Ok(updated)
    }

    async fn debit(
        &self,
        balance: &Ciphertext,
        amount: &Ciphertext,
    ) -> Result<Ciphertext, LedgerError> {
        let (balance, amount) = (balance.clone(), amount.clone());
        let (updated, confirmed) = self
            .with_engine(move |engine| {
                let (updated, proof) = engine.subtract_with_underflow_proof(&balance, &amount)?;
                let confirmed =
                    proof.confirms(engine.attestation_key(), RangeStatement::NonNegative, &updated);
                Ok((updated, confirmed))
            })
            .await?;
        if !confirmed {
            return Err(LedgerError::InsufficientFundsProof);
        }
        Ok(updated)
    }

    /// Run decrypting engine work on the blocking pool; a bounded discrete
    /// log must not stall the request runtime.
    async fn with_engine<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&FheEngine) -> Result<T, FheError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || work(engine.as_ref()))
            .await
            .map_err(|e| LedgerError::EngineTask(e.to_string()))?
            .map_err(LedgerError::from)
    }

    /// Assign the next position and append to the journal (durable store
    /// first). Nothing in account state has changed yet when this runs.
    async fn record(
        &self,
        op: &Operation,
        source: (AccountId, &Account, &Ciphertext),
        counterparty: Option<(AccountId, &Account, &Ciphertext)>,
        replay: Option<&Receipt>,
    ) -> Result<Receipt, LedgerError> {
        let effect = |(account, state, balance): (AccountId, &Account, &Ciphertext)| AccountEffect {
            account,
            sequence: state.sequence + 1,
            balance_fingerprint: balance.fingerprint(),
        };

        let mut journal = self.journal.lock().await;
        let position = journal.next_position();

        let computed = Receipt {
            operation_id: op.id,
            position,
            source: effect(source),
            counterparty: counterparty.map(effect),
            applied_at: Utc::now(),
        };

        let receipt = match replay {
            Some(stored) => {
                let matches = stored.position == computed.position
                    && stored.operation_id == computed.operation_id
                    && stored.source == computed.source
                    && stored.counterparty == computed.counterparty;
                if !matches {
                    return Err(LedgerError::Storage(format!(
                        "replay diverged at position {position}"
                    )));
                }
                stored.clone()
            }
            None => computed,
        };

        let logged = LoggedOperation {
            operation: op.clone(),
            receipt: receipt.clone(),
        };
        if replay.is_none() {
            if let Some(store) = &self.store {
                store.append_operation(&logged).map_err(storage_err)?;
            }
        }

        journal.log.push(logged);
        journal.states.push(CommitState::Pending);
        journal.pending.push_back(position);

        Ok(receipt)
    }

    fn log_applied(&self, op: &Operation, receipt: &Receipt, replayed: bool) {
        if replayed {
            return;
        }
        tracing::info!(
            position = receipt.position,
            kind = op.kind.name(),
            account = %receipt.source.account,
            sequence = receipt.source.sequence,
            counterparty = ?receipt.counterparty.as_ref().map(|c| c.account.to_string()),
            "Applied operation"
        );
    }

    /// Page through the operation log starting after `since`.
    pub async fn operations(&self, since: u64, limit: usize) -> Vec<OperationEntry> {
        let journal = self.journal.lock().await;
        journal
            .log
            .iter()
            .zip(journal.states.iter())
            .skip(since as usize)
            .take(limit)
            .map(|(logged, state)| OperationEntry {
                logged: logged.clone(),
                commit: *state,
            })
            .collect()
    }

    // =========================================================================
    // Commitment Bookkeeping
    // =========================================================================

    /// Take up to `max` pending operations, oldest first, and mark them
    /// in flight.
    pub async fn take_pending_batch(&self, max: usize) -> Vec<LoggedOperation> {
        let mut journal = self.journal.lock().await;
        let mut batch = Vec::new();

        while batch.len() < max {
            let Some(position) = journal.pending.pop_front() else {
                break;
            };
            if let Some(state) = journal.state_mut(position) {
                *state = CommitState::InFlight;
            }
            if let Some(logged) = journal.log.get(position as usize - 1) {
                batch.push(logged.clone());
            }
        }

        batch
    }

    /// Archive a batch covered by a confirmed commitment.
    ///
    /// The chain has already accepted the batch, so the in-memory state
    /// turns `Committed` even when the journal write fails; the error only
    /// reports that a restart would see these positions as pending again.
    pub async fn mark_committed(
        &self,
        positions: &[u64],
        commitment: u64,
    ) -> Result<(), LedgerError> {
        {
            let mut journal = self.journal.lock().await;
            for position in positions {
                if let Some(state) = journal.state_mut(*position) {
                    *state = CommitState::Committed { commitment };
                }
            }
        }

        if let Some(store) = &self.store {
            store.archive(positions, commitment).map_err(storage_err)?;
        }
        Ok(())
    }

    /// Park a batch whose commitment failed. The operations stay valid and
    /// are kept for re-queueing.
    pub async fn mark_uncommitted(&self, positions: Vec<u64>, reason: impl Into<String>) -> u64 {
        let mut journal = self.journal.lock().await;
        for position in &positions {
            if let Some(state) = journal.state_mut(*position) {
                *state = CommitState::Uncommitted;
            }
        }

        journal.next_batch_id += 1;
        let batch_id = journal.next_batch_id;
        journal.uncommitted.push(UncommittedBatch {
            batch_id,
            positions,
            reason: reason.into(),
            failed_at: Utc::now(),
        });
        batch_id
    }

    pub async fn uncommitted_batches(&self) -> Vec<UncommittedBatch> {
        self.journal.lock().await.uncommitted.clone()
    }

    /// Move every uncommitted batch back to the front of the pending queue,
    /// preserving log order. Returns the number of operations re-queued.
    pub async fn requeue_uncommitted(&self) -> usize {
        let mut journal = self.journal.lock().await;
        let batches = std::mem::take(&mut journal.uncommitted);

        let mut positions: Vec<u64> = batches.into_iter().flat_map(|b| b.positions).collect();
        positions.sort_unstable();

        for position in positions.iter().rev() {
            if let Some(state) = journal.state_mut(*position) {
                *state = CommitState::Pending;
            }
            journal.pending.push_front(*position);
        }

        positions.len()
    }

    pub async fn stats(&self) -> LedgerStats {
        let accounts = self.accounts.read().await.len();
        let journal = self.journal.lock().await;

        let mut stats = LedgerStats {
            accounts,
            operations: journal.log.len() as u64,
            ..LedgerStats::default()
        };
        for state in &journal.states {
            match state {
                CommitState::Pending => stats.pending += 1,
                CommitState::InFlight => stats.in_flight += 1,
                CommitState::Committed { .. } => stats.committed += 1,
                CommitState::Uncommitted => stats.uncommitted += 1,
            }
        }
        stats
    }
}

fn validate_shape(op: &Operation) -> Result<(), LedgerError> {
    if op.nonce.is_empty() || op.nonce.len() > MAX_NONCE_LEN {
        return Err(LedgerError::InvalidOperation(format!(
            "nonce must be 1..={MAX_NONCE_LEN} bytes"
        )));
    }
    if let OperationKind::Transfer { from, to } = &op.kind {
        if from == to {
            return Err(LedgerError::InvalidOperation(
                "transfer source and destination must differ".into(),
            ));
        }
    }
    Ok(())
}

fn commit_account(account: &mut Account, balance: Ciphertext, nonce: Option<(&str, &Receipt)>) {
    account.balance = balance;
    account.sequence += 1;
    if let Some((nonce, receipt)) = nonce {
        account.nonces.insert(nonce.to_string(), receipt.clone());
    }
}

fn storage_err(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use tempfile::TempDir;

    fn alice() -> AccountId {
        AccountId(Address::repeat_byte(0xa1))
    }

    fn bob() -> AccountId {
        AccountId(Address::repeat_byte(0xb2))
    }

    async fn ledger_with_accounts() -> VaultLedger {
        let ledger = VaultLedger::new(Arc::new(FheEngine::generate().unwrap()));
        ledger.open_account(alice()).await.unwrap();
        ledger.open_account(bob()).await.unwrap();
        ledger
    }

    fn op(ledger: &VaultLedger, kind: OperationKind, amount: u64, nonce: &str, seq: u64) -> Operation {
        Operation::encrypt(ledger.engine(), kind, amount, nonce, seq).unwrap()
    }

    async fn balance(ledger: &VaultLedger, account: AccountId) -> Option<i64> {
        let snapshot = ledger.account(&account).await.unwrap();
        ledger.engine().reveal(&snapshot.balance)
    }

    #[tokio::test]
    async fn deposit_withdraw_transfer_scenario() {
        let ledger = ledger_with_accounts().await;
        let a = alice();
        let b = bob();

        ledger
            .apply_operation(op(&ledger, OperationKind::Deposit { account: a }, 10, "n1", 1))
            .await
            .unwrap();
        ledger
            .apply_operation(op(&ledger, OperationKind::Withdraw { account: a }, 3, "n2", 2))
            .await
            .unwrap();
        let outcome = ledger
            .apply_operation(op(&ledger, OperationKind::Transfer { from: a, to: b }, 2, "n3", 3))
            .await
            .unwrap();

        assert_eq!(balance(&ledger, a).await, Some(5));
        assert_eq!(balance(&ledger, b).await, Some(2));

        let receipt = outcome.receipt();
        assert_eq!(receipt.position, 3);
        assert_eq!(receipt.source.sequence, 3);
        assert_eq!(receipt.counterparty.as_ref().map(|c| c.sequence), Some(1));
        assert_eq!(ledger.account(&b).await.unwrap().sequence, 1);

        let positions: Vec<u64> = ledger
            .operations(0, 10)
            .await
            .iter()
            .map(|e| e.logged.position())
            .collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn duplicate_nonce_returns_original_receipt() {
        let ledger = ledger_with_accounts().await;
        let a = alice();

        let first = ledger
            .apply_operation(op(&ledger, OperationKind::Deposit { account: a }, 4, "same", 1))
            .await
            .unwrap();
        assert!(!first.is_duplicate());

        let again = ledger
            .apply_operation(op(&ledger, OperationKind::Deposit { account: a }, 4, "same", 2))
            .await
            .unwrap();
        assert!(again.is_duplicate());
        assert_eq!(again.receipt(), first.receipt());

        assert_eq!(balance(&ledger, a).await, Some(4));
        assert_eq!(ledger.stats().await.operations, 1);
    }

    #[tokio::test]
    async fn underflow_leaves_balance_untouched() {
        let ledger = ledger_with_accounts().await;
        let a = alice();

        ledger
            .apply_operation(op(&ledger, OperationKind::Deposit { account: a }, 2, "n1", 1))
            .await
            .unwrap();
        let before = ledger.account(&a).await.unwrap();

        let err = ledger
            .apply_operation(op(&ledger, OperationKind::Withdraw { account: a }, 5, "n2", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFundsProof));

        let after = ledger.account(&a).await.unwrap();
        assert_eq!(after.balance, before.balance);
        assert_eq!(after.sequence, 1);
        assert_eq!(ledger.stats().await.operations, 1);
    }

    #[tokio::test]
    async fn concurrent_same_sequence_applies_once() {
        let ledger = Arc::new(ledger_with_accounts().await);
        let a = alice();

        let first = op(&ledger, OperationKind::Deposit { account: a }, 1, "x", 1);
        let second = op(&ledger, OperationKind::Deposit { account: a }, 1, "y", 1);

        let (l1, l2) = (ledger.clone(), ledger.clone());
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { l1.apply_operation(first).await }),
            tokio::spawn(async move { l2.apply_operation(second).await }),
        );
        let results = [r1.unwrap(), r2.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(LedgerError::SequenceConflict {
                expected: 2,
                submitted: 1
            })
        )));
        assert_eq!(balance(&ledger, a).await, Some(1));
    }

    #[tokio::test]
    async fn rejects_invalid_operations() {
        let ledger = ledger_with_accounts().await;
        let a = alice();
        let stranger = AccountId(Address::repeat_byte(0xcc));

        let zero = op(&ledger, OperationKind::Deposit { account: a }, 0, "z", 1);
        assert!(matches!(
            ledger.apply_operation(zero).await,
            Err(LedgerError::InvalidAmount)
        ));

        let self_transfer = op(&ledger, OperationKind::Transfer { from: a, to: a }, 1, "s", 1);
        assert!(matches!(
            ledger.apply_operation(self_transfer).await,
            Err(LedgerError::InvalidOperation(_))
        ));

        let missing = op(&ledger, OperationKind::Transfer { from: a, to: stranger }, 1, "m", 1);
        assert!(matches!(
            ledger.apply_operation(missing).await,
            Err(LedgerError::AccountNotFound(id)) if id == stranger
        ));

        let skipped = op(&ledger, OperationKind::Deposit { account: a }, 1, "k", 3);
        assert!(matches!(
            ledger.apply_operation(skipped).await,
            Err(LedgerError::SequenceConflict { expected: 1, submitted: 3 })
        ));

        let foreign = FheEngine::generate().unwrap();
        let foreign_op =
            Operation::encrypt(&foreign, OperationKind::Deposit { account: a }, 1, "f", 1).unwrap();
        assert!(matches!(
            ledger.apply_operation(foreign_op).await,
            Err(LedgerError::Engine(FheError::SchemeMismatch(_)))
        ));

        assert!(matches!(
            ledger.open_account(a).await,
            Err(LedgerError::AccountExists(_))
        ));
        assert_eq!(ledger.stats().await.operations, 0);
    }

    #[tokio::test]
    async fn amounts_derived_from_another_balance_are_rejected() {
        use k256::{ProjectivePoint, Scalar};

        let ledger = ledger_with_accounts().await;
        let (victim, attacker) = (alice(), bob());
        ledger
            .apply_operation(op(&ledger, OperationKind::Deposit { account: victim }, 10, "v1", 1))
            .await
            .unwrap();

        // Enc(balance - 7) under the victim's blinding, which the attacker
        // never learns.
        let target = ledger.account(&victim).await.unwrap().balance;
        let (c1, c2) = target.points().unwrap();
        let shifted = Ciphertext::from_points(
            &c1,
            &(c2 - ProjectivePoint::GENERATOR * Scalar::from(7u64)),
            ledger.engine().key_fingerprint(),
        );

        // A proof lifted from the attacker's own honest submission.
        let mut lifted = op(&ledger, OperationKind::Deposit { account: attacker }, 1, "a1", 1);
        lifted.amount = shifted.clone();
        assert!(matches!(
            ledger.apply_operation(lifted).await,
            Err(LedgerError::AmountProofRejected)
        ));

        // The victim's balance itself, with a proof for a different slot.
        let honest = op(&ledger, OperationKind::Deposit { account: attacker }, 1, "a2", 1);
        let replayed = Operation::new(
            OperationKind::Withdraw { account: attacker },
            target,
            honest.amount_proof.clone(),
            "a3",
            1,
        );
        assert!(matches!(
            ledger.apply_operation(replayed).await,
            Err(LedgerError::AmountProofRejected)
        ));

        assert_eq!(ledger.account(&attacker).await.unwrap().sequence, 0);
        assert_eq!(balance(&ledger, attacker).await, Some(0));
        assert_eq!(ledger.stats().await.operations, 1);

        ledger.apply_operation(honest).await.unwrap();
        assert_eq!(balance(&ledger, attacker).await, Some(1));
    }

    #[tokio::test]
    async fn commit_bookkeeping_and_requeue() {
        let ledger = ledger_with_accounts().await;
        let a = alice();
        for seq in 1..=3 {
            ledger
                .apply_operation(op(
                    &ledger,
                    OperationKind::Deposit { account: a },
                    1,
                    &format!("n{seq}"),
                    seq,
                ))
                .await
                .unwrap();
        }

        let batch = ledger.take_pending_batch(2).await;
        assert_eq!(batch.iter().map(|l| l.position()).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(ledger.stats().await.in_flight, 2);

        ledger.mark_uncommitted(vec![1, 2], "rpc down").await;
        let parked = ledger.uncommitted_batches().await;
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].positions, vec![1, 2]);

        assert_eq!(ledger.requeue_uncommitted().await, 2);
        assert!(ledger.uncommitted_batches().await.is_empty());

        let batch = ledger.take_pending_batch(10).await;
        assert_eq!(
            batch.iter().map(|l| l.position()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        ledger.mark_committed(&[1, 2, 3], 1).await.unwrap();
        let stats = ledger.stats().await;
        assert_eq!(stats.committed, 3);
        assert_eq!(stats.pending, 0);
        assert_eq!(
            ledger.operations(2, 1).await[0].commit,
            CommitState::Committed { commitment: 1 }
        );
    }

    #[tokio::test]
    async fn confirmed_batch_stays_committed_when_archive_fails() {
        let ledger = ledger_with_accounts().await;
        let a = alice();
        for seq in 1..=2 {
            ledger
                .apply_operation(op(
                    &ledger,
                    OperationKind::Deposit { account: a },
                    1,
                    &format!("n{seq}"),
                    seq,
                ))
                .await
                .unwrap();
        }

        // A journal that never saw these operations refuses the archive.
        let dir = TempDir::new().unwrap();
        let store = Arc::new(OperationLog::open(&dir.path().join("vault.redb")).unwrap());
        let ledger = ledger.with_store(store);

        let batch = ledger.take_pending_batch(10).await;
        assert_eq!(batch.len(), 2);
        assert!(matches!(
            ledger.mark_committed(&[1, 2], 7).await,
            Err(LedgerError::Storage(_))
        ));

        let stats = ledger.stats().await;
        assert_eq!(stats.committed, 2);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(
            ledger.operations(0, 1).await[0].commit,
            CommitState::Committed { commitment: 7 }
        );
        assert!(ledger.take_pending_batch(10).await.is_empty());
    }

    #[tokio::test]
    async fn restore_replays_journal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.redb");
        let engine = Arc::new(FheEngine::generate().unwrap());
        let a = alice();
        let b = bob();

        let before = {
            let store = Arc::new(OperationLog::open(&path).unwrap());
            let ledger = VaultLedger::new(engine.clone()).with_store(store);
            ledger.open_account(a).await.unwrap();
            ledger.open_account(b).await.unwrap();
            ledger
                .apply_operation(op(&ledger, OperationKind::Deposit { account: a }, 9, "n1", 1))
                .await
                .unwrap();
            ledger
                .apply_operation(op(&ledger, OperationKind::Transfer { from: a, to: b }, 4, "n2", 2))
                .await
                .unwrap();
            let batch = ledger.take_pending_batch(1).await;
            ledger.mark_committed(&[batch[0].position()], 1).await.unwrap();
            ledger.account(&a).await.unwrap()
        };

        let store = Arc::new(OperationLog::open(&path).unwrap());
        let restored = VaultLedger::restore(engine, store).await.unwrap();

        let after = restored.account(&a).await.unwrap();
        assert_eq!(after.balance, before.balance);
        assert_eq!(after.sequence, 2);
        assert_eq!(balance(&restored, a).await, Some(5));
        assert_eq!(balance(&restored, b).await, Some(4));

        let stats = restored.stats().await;
        assert_eq!(stats.operations, 2);
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.pending, 1);

        // Nonces survive the restart.
        let replayed = restored
            .apply_operation(op(&restored, OperationKind::Deposit { account: a }, 9, "n1", 3))
            .await
            .unwrap();
        assert!(replayed.is_duplicate());
        assert_eq!(replayed.receipt().position, 1);
    }
}
