// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable ledger journal backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: account address → serialized AccountRecord (opening balance)
//! - `operations`: global position → serialized LoggedOperation
//! - `archived`: global position → commitment index that covered it
//!
//! Balances are never stored directly; they are rebuilt by replaying
//! `operations` in position order on top of the opening records.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::ledger::{AccountRecord, LoggedOperation};

// =============================================================================
// Table Definitions
// =============================================================================

/// Account openings: lowercase address → AccountRecord (JSON bytes).
const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

/// Append-only log: position → LoggedOperation (JSON bytes).
const OPERATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("operations");

/// Archive marks: position → commitment index.
const ARCHIVED: TableDefinition<u64, u64> = TableDefinition::new("archived");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OpLogError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("operation position {0} already written")]
    PositionTaken(u64),

    #[error("operation position {0} was never written")]
    UnknownPosition(u64),

    #[error("journal directory error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OpLogResult<T> = Result<T, OpLogError>;

// =============================================================================
// OperationLog
// =============================================================================

/// Embedded ACID journal for the vault ledger.
pub struct OperationLog {
    db: Database,
}

impl OperationLog {
    /// Open (or create) the journal at the given path.
    pub fn open(path: &Path) -> OpLogResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(OPERATIONS)?;
            let _ = write_txn.open_table(ARCHIVED)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub fn record_account(&self, record: &AccountRecord) -> OpLogResult<()> {
        let key = record.account.to_string().to_lowercase();
        let json = serde_json::to_vec(record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ACCOUNTS)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn accounts(&self) -> OpLogResult<Vec<AccountRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Append one operation. Positions are write-once.
    pub fn append_operation(&self, logged: &LoggedOperation) -> OpLogResult<()> {
        let position = logged.position();
        let json = serde_json::to_vec(logged)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OPERATIONS)?;
            if table.get(position)?.is_some() {
                return Err(OpLogError::PositionTaken(position));
            }
            table.insert(position, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All operations in position order.
    pub fn operations(&self) -> OpLogResult<Vec<LoggedOperation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OPERATIONS)?;

        let mut ops = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            ops.push(serde_json::from_slice(value.value())?);
        }
        Ok(ops)
    }

    // =========================================================================
    // Archive
    // =========================================================================

    /// Mark positions as covered by a confirmed commitment. Every position
    /// must already be in the log; nothing is written otherwise.
    pub fn archive(&self, positions: &[u64], commitment: u64) -> OpLogResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            {
                let operations = write_txn.open_table(OPERATIONS)?;
                for position in positions {
                    if operations.get(*position)?.is_none() {
                        return Err(OpLogError::UnknownPosition(*position));
                    }
                }
            }

            let mut table = write_txn.open_table(ARCHIVED)?;
            for position in positions {
                table.insert(*position, commitment)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// `(position, commitment)` pairs in position order.
    pub fn archived(&self) -> OpLogResult<Vec<(u64, u64)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARCHIVED)?;

        let mut marks = Vec::new();
        for entry in table.iter()? {
            let (position, commitment) = entry?;
            marks.push((position.value(), commitment.value()));
        }
        Ok(marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhe::FheEngine;
    use crate::ledger::{AccountEffect, AccountId, Operation, OperationKind, Receipt};
    use alloy::primitives::{Address, B256};
    use chrono::Utc;
    use tempfile::TempDir;

    fn temp_log() -> (OperationLog, TempDir) {
        let dir = TempDir::new().unwrap();
        let log = OperationLog::open(&dir.path().join("vault.redb")).unwrap();
        (log, dir)
    }

    fn sample(engine: &FheEngine, position: u64) -> LoggedOperation {
        let account = AccountId(Address::repeat_byte(7));
        let operation = Operation::encrypt(
            engine,
            OperationKind::Deposit { account },
            5,
            format!("nonce-{position}"),
            position,
        )
        .unwrap();
        let receipt = Receipt {
            operation_id: operation.id,
            position,
            source: AccountEffect {
                account,
                sequence: position,
                balance_fingerprint: B256::repeat_byte(position as u8),
            },
            counterparty: None,
            applied_at: Utc::now(),
        };
        LoggedOperation { operation, receipt }
    }

    #[test]
    fn operations_come_back_in_position_order() {
        let (log, _dir) = temp_log();
        let engine = FheEngine::generate().unwrap();

        for position in [1u64, 2, 3] {
            log.append_operation(&sample(&engine, position)).unwrap();
        }

        let ops = log.operations().unwrap();
        let positions: Vec<u64> = ops.iter().map(LoggedOperation::position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(ops[0].operation.nonce, "nonce-1");
    }

    #[test]
    fn positions_are_write_once() {
        let (log, _dir) = temp_log();
        let engine = FheEngine::generate().unwrap();

        log.append_operation(&sample(&engine, 1)).unwrap();
        assert!(matches!(
            log.append_operation(&sample(&engine, 1)),
            Err(OpLogError::PositionTaken(1))
        ));
    }

    #[test]
    fn accounts_and_archive_marks_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.redb");
        let engine = FheEngine::generate().unwrap();
        let record = AccountRecord {
            account: AccountId(Address::repeat_byte(9)),
            balance: engine.zero(),
            created_at: Utc::now(),
        };

        {
            let log = OperationLog::open(&path).unwrap();
            log.record_account(&record).unwrap();
            log.append_operation(&sample(&engine, 1)).unwrap();
            log.append_operation(&sample(&engine, 2)).unwrap();
            log.archive(&[1, 2], 4).unwrap();
        }

        let reopened = OperationLog::open(&path).unwrap();
        assert_eq!(reopened.accounts().unwrap(), vec![record]);
        assert_eq!(reopened.archived().unwrap(), vec![(1, 4), (2, 4)]);
    }

    #[test]
    fn archive_rejects_unlogged_positions() {
        let (log, _dir) = temp_log();
        let engine = FheEngine::generate().unwrap();
        log.append_operation(&sample(&engine, 1)).unwrap();

        assert!(matches!(
            log.archive(&[1, 2], 1),
            Err(OpLogError::UnknownPosition(2))
        ));
        assert!(log.archived().unwrap().is_empty());
    }

    #[test]
    fn open_reports_unusable_directory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let result = OperationLog::open(&blocker.join("vault.redb"));
        assert!(matches!(result, Err(OpLogError::Io(_))));
    }
}
