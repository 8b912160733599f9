// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Commitment derivation.
//!
//! ```text
//! balance_root      = keccak256(sorted (account || last fingerprint) leaves)
//! operations_digest = keccak256((position || operation id) for each op)
//! new_root          = keccak256(prior_root || balance_root || operations_digest)
//! ```

use std::collections::BTreeMap;

use alloy::primitives::{keccak256, B256};
use serde::Serialize;
use utoipa::ToSchema;

use crate::ledger::{AccountId, LoggedOperation};

/// A batch summary ready for on-chain submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Commitment {
    /// 1-based commitment index on the contract.
    pub index: u64,
    #[schema(value_type = String)]
    pub prior_root: B256,
    #[schema(value_type = String)]
    pub balance_root: B256,
    #[schema(value_type = String)]
    pub operations_digest: B256,
    #[schema(value_type = String)]
    pub new_root: B256,
    /// Log positions covered, in order.
    pub positions: Vec<u64>,
}

impl Commitment {
    /// Derive the commitment for `batch` on top of `prior_root`.
    pub fn derive(batch: &[LoggedOperation], prior_root: B256, index: u64) -> Self {
        let balance_root = balance_root(batch);
        let operations_digest = operations_digest(batch);

        let mut preimage = [0u8; 96];
        preimage[..32].copy_from_slice(prior_root.as_slice());
        preimage[32..64].copy_from_slice(balance_root.as_slice());
        preimage[64..].copy_from_slice(operations_digest.as_slice());

        Self {
            index,
            prior_root,
            balance_root,
            operations_digest,
            new_root: keccak256(preimage),
            positions: batch.iter().map(LoggedOperation::position).collect(),
        }
    }
}

/// Root over exactly the accounts the batch touched, each at its last
/// resulting fingerprint within the batch.
pub fn balance_root(batch: &[LoggedOperation]) -> B256 {
    let mut latest: BTreeMap<AccountId, B256> = BTreeMap::new();
    for logged in batch {
        for effect in logged.receipt.effects() {
            latest.insert(effect.account, effect.balance_fingerprint);
        }
    }

    let mut leaves = Vec::with_capacity(latest.len() * 52);
    for (account, fingerprint) in &latest {
        leaves.extend_from_slice(account.0.as_slice());
        leaves.extend_from_slice(fingerprint.as_slice());
    }
    keccak256(&leaves)
}

pub fn operations_digest(batch: &[LoggedOperation]) -> B256 {
    let mut buf = Vec::with_capacity(batch.len() * 24);
    for logged in batch {
        buf.extend_from_slice(&logged.position().to_be_bytes());
        buf.extend_from_slice(logged.operation.id.as_bytes());
    }
    keccak256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhe::FheEngine;
    use crate::ledger::{AccountEffect, Operation, OperationKind, Receipt};
    use alloy::primitives::Address;
    use chrono::Utc;

    fn logged(
        engine: &FheEngine,
        position: u64,
        effects: &[(u8, u8)],
    ) -> LoggedOperation {
        let effect = |(account, fp): (u8, u8)| AccountEffect {
            account: AccountId(Address::repeat_byte(account)),
            sequence: position,
            balance_fingerprint: B256::repeat_byte(fp),
        };
        let source = effect(effects[0]);
        let operation = Operation::encrypt(
            engine,
            OperationKind::Deposit {
                account: source.account,
            },
            1,
            format!("n{position}"),
            position,
        )
        .unwrap();
        LoggedOperation {
            receipt: Receipt {
                operation_id: operation.id,
                position,
                source,
                counterparty: effects.get(1).copied().map(effect),
                applied_at: Utc::now(),
            },
            operation,
        }
    }

    #[test]
    fn new_root_chains_prior_root() {
        let engine = FheEngine::generate().unwrap();
        let batch = vec![logged(&engine, 1, &[(1, 10)]), logged(&engine, 2, &[(2, 20)])];

        let genesis = Commitment::derive(&batch, B256::ZERO, 1);
        let rebased = Commitment::derive(&batch, B256::repeat_byte(7), 2);

        assert_eq!(genesis.positions, vec![1, 2]);
        assert_eq!(genesis.balance_root, rebased.balance_root);
        assert_eq!(genesis.operations_digest, rebased.operations_digest);
        assert_ne!(genesis.new_root, rebased.new_root);
    }

    #[test]
    fn balance_root_uses_last_fingerprint_per_account() {
        let engine = FheEngine::generate().unwrap();
        let overwritten = vec![
            logged(&engine, 1, &[(1, 10)]),
            logged(&engine, 2, &[(1, 11), (2, 20)]),
        ];
        let final_only = vec![logged(&engine, 3, &[(2, 20), (1, 11)])];

        assert_eq!(balance_root(&overwritten), balance_root(&final_only));
        assert_ne!(
            balance_root(&overwritten),
            balance_root(&[logged(&engine, 1, &[(1, 10)])])
        );
    }

    #[test]
    fn digest_depends_on_order() {
        let engine = FheEngine::generate().unwrap();
        let a = logged(&engine, 1, &[(1, 1)]);
        let b = logged(&engine, 2, &[(1, 2)]);
        assert_ne!(
            operations_digest(&[a.clone(), b.clone()]),
            operations_digest(&[b, a])
        );
    }
}
