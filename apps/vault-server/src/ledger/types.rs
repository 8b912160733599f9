// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger data model.
//!
//! Everything here is safe to hand to clients: balances and amounts only
//! ever appear as ciphertexts or fingerprints.

use std::str::FromStr;

use alloy::primitives::{keccak256, Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::fhe::{Ciphertext, FheEngine, FheError, RandomnessProof};

const AMOUNT_CONTEXT_DOMAIN: &[u8] = b"confidential-vault/amount/v1";

// =============================================================================
// Account Identifier
// =============================================================================

/// EVM address identifying a vault account.
///
/// The secp256k1 key controlling the address is the account credential.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
#[schema(value_type = String, example = "0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12")]
pub struct AccountId(pub Address);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_str(s.trim())
            .map(AccountId)
            .map_err(|e| format!("invalid account address: {e}"))
    }
}

impl From<Address> for AccountId {
    fn from(value: Address) -> Self {
        AccountId(value)
    }
}

// =============================================================================
// Operations
// =============================================================================

/// The fixed set of ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationKind {
    /// Credit `account`.
    Deposit { account: AccountId },
    /// Debit `account`.
    Withdraw { account: AccountId },
    /// Move value from `from` to `to`.
    Transfer { from: AccountId, to: AccountId },
}

impl OperationKind {
    /// The account whose credential authorizes the operation and whose
    /// sequence number and nonce set gate it.
    pub fn source(&self) -> AccountId {
        match self {
            OperationKind::Deposit { account } | OperationKind::Withdraw { account } => *account,
            OperationKind::Transfer { from, .. } => *from,
        }
    }

    /// Receiving side of a transfer.
    pub fn counterparty(&self) -> Option<AccountId> {
        match self {
            OperationKind::Transfer { to, .. } => Some(*to),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Deposit { .. } => "deposit",
            OperationKind::Withdraw { .. } => "withdraw",
            OperationKind::Transfer { .. } => "transfer",
        }
    }
}

/// An immutable ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Operation {
    pub id: Uuid,
    pub kind: OperationKind,
    /// Encrypted amount.
    pub amount: Ciphertext,
    /// Submitter's proof that it encrypted `amount` itself, bound to
    /// [`amount_context`] of this operation.
    pub amount_proof: RandomnessProof,
    /// Client-chosen nonce, unique per source account.
    pub nonce: String,
    /// Sequence number the source account takes when this applies.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl Operation {
    pub fn new(
        kind: OperationKind,
        amount: Ciphertext,
        amount_proof: RandomnessProof,
        nonce: impl Into<String>,
        sequence: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            amount_proof,
            nonce: nonce.into(),
            sequence,
            timestamp: Utc::now(),
        }
    }

    /// Encrypt `amount` under the engine key with a proof bound to this
    /// operation's source, nonce and sequence.
    pub fn encrypt(
        engine: &FheEngine,
        kind: OperationKind,
        amount: u64,
        nonce: impl Into<String>,
        sequence: u64,
    ) -> Result<Self, FheError> {
        let nonce = nonce.into();
        let context = amount_context(kind.source(), &nonce, sequence);
        let (ciphertext, proof) = engine.encrypt_with_proof(amount, context)?;
        Ok(Self::new(kind, ciphertext, proof, nonce, sequence))
    }

    /// Context the amount proof must be bound to.
    pub fn amount_context(&self) -> B256 {
        amount_context(self.kind.source(), &self.nonce, self.sequence)
    }
}

/// `keccak256(domain || source || sequence (u64 BE) || nonce)`.
///
/// Ties an amount proof to one submission slot of one account, so a proof
/// cannot be lifted onto another account's operation.
pub fn amount_context(source: AccountId, nonce: &str, sequence: u64) -> B256 {
    let mut buf = Vec::with_capacity(AMOUNT_CONTEXT_DOMAIN.len() + 20 + 8 + nonce.len());
    buf.extend_from_slice(AMOUNT_CONTEXT_DOMAIN);
    buf.extend_from_slice(source.0.as_slice());
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(nonce.as_bytes());
    keccak256(&buf)
}

// =============================================================================
// Receipts
// =============================================================================

/// Resulting state of one account touched by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccountEffect {
    pub account: AccountId,
    /// Account sequence number after the operation.
    pub sequence: u64,
    /// Fingerprint of the account's new balance ciphertext.
    #[schema(value_type = String)]
    pub balance_fingerprint: B256,
}

/// Proof of application returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Receipt {
    pub operation_id: Uuid,
    /// Global order position (1-based, contiguous).
    pub position: u64,
    pub source: AccountEffect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<AccountEffect>,
    pub applied_at: DateTime<Utc>,
}

impl Receipt {
    pub fn effects(&self) -> impl Iterator<Item = &AccountEffect> {
        std::iter::once(&self.source).chain(self.counterparty.as_ref())
    }
}

/// Result of [`super::VaultLedger::apply_operation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The operation was applied now.
    Applied(Receipt),
    /// The nonce was already used; this is the original receipt and nothing
    /// changed.
    Duplicate(Receipt),
}

impl ApplyOutcome {
    pub fn receipt(&self) -> &Receipt {
        match self {
            ApplyOutcome::Applied(r) | ApplyOutcome::Duplicate(r) => r,
        }
    }

    pub fn into_receipt(self) -> Receipt {
        match self {
            ApplyOutcome::Applied(r) | ApplyOutcome::Duplicate(r) => r,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, ApplyOutcome::Duplicate(_))
    }
}

// =============================================================================
// Log & Snapshots
// =============================================================================

/// An applied operation as stored in the append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LoggedOperation {
    pub operation: Operation,
    pub receipt: Receipt,
}

impl LoggedOperation {
    pub fn position(&self) -> u64 {
        self.receipt.position
    }
}

/// Durable record of an account opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account: AccountId,
    pub balance: Ciphertext,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time view of an account.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountSnapshot {
    pub account: AccountId,
    pub balance: Ciphertext,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

/// Chain-durability state of a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CommitState {
    /// Waiting for the next commitment.
    Pending,
    /// Part of a commitment being submitted.
    InFlight,
    /// Covered by a confirmed commitment (archived).
    Committed { commitment: u64 },
    /// Commitment failed after bounded retries; awaiting re-queue.
    Uncommitted,
}

/// A batch whose commitment could not be confirmed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UncommittedBatch {
    pub batch_id: u64,
    pub positions: Vec<u64>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Log entry with its commit state, as listed by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OperationEntry {
    #[serde(flatten)]
    pub logged: LoggedOperation,
    pub commit: CommitState,
}

/// Counters for health and commitment endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct LedgerStats {
    pub accounts: usize,
    pub operations: u64,
    pub pending: usize,
    pub in_flight: usize,
    pub committed: usize,
    pub uncommitted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_parses_and_displays() {
        let id: AccountId = "0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12".parse().unwrap();
        assert_eq!(
            id.to_string().to_lowercase(),
            "0x742d35cc6634c0532925a3b844bc9e7595f4ab12"
        );
        assert!("not-an-address".parse::<AccountId>().is_err());
    }

    #[test]
    fn source_and_counterparty() {
        let a = AccountId(Address::repeat_byte(1));
        let b = AccountId(Address::repeat_byte(2));

        let deposit = OperationKind::Deposit { account: a };
        assert_eq!(deposit.source(), a);
        assert_eq!(deposit.counterparty(), None);

        let transfer = OperationKind::Transfer { from: a, to: b };
        assert_eq!(transfer.source(), a);
        assert_eq!(transfer.counterparty(), Some(b));
        assert_eq!(transfer.name(), "transfer");
    }

    #[test]
    fn amount_context_separates_slots() {
        let a = AccountId(Address::repeat_byte(1));
        let b = AccountId(Address::repeat_byte(2));
        let base = amount_context(a, "n1", 1);
        assert_eq!(base, amount_context(a, "n1", 1));
        assert_ne!(base, amount_context(b, "n1", 1));
        assert_ne!(base, amount_context(a, "n2", 1));
        assert_ne!(base, amount_context(a, "n1", 2));
    }

    #[test]
    fn kind_serializes_with_tag() {
        let a = AccountId(Address::repeat_byte(1));
        let json = serde_json::to_value(OperationKind::Withdraw { account: a }).unwrap();
        assert_eq!(json["kind"], "withdraw");
        assert!(json["account"].is_string());
    }
}
