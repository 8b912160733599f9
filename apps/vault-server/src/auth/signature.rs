// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operation digests and EIP-191 signature checks.

use alloy::primitives::{keccak256, Address, Signature, B256};

use super::AuthError;
use crate::fhe::Ciphertext;
use crate::ledger::OperationKind;

/// Domain separator mixed into every operation digest.
pub const OPERATION_DOMAIN: &[u8] = b"confidential-vault/operation/v1";

/// The 32 bytes a client signs (with `personal_sign`) to authorize an
/// operation.
///
/// Covers kind, source, counterparty, amount fingerprint, nonce and
/// sequence, so none of them can be swapped after signing.
pub fn operation_digest(
    kind: &OperationKind,
    amount: &Ciphertext,
    nonce: &str,
    sequence: u64,
) -> B256 {
    let tag: u8 = match kind {
        OperationKind::Deposit { .. } => 1,
        OperationKind::Withdraw { .. } => 2,
        OperationKind::Transfer { .. } => 3,
    };
    let counterparty = kind.counterparty().map(|c| c.0).unwrap_or(Address::ZERO);

    let mut buf =
        Vec::with_capacity(OPERATION_DOMAIN.len() + 1 + 20 + 20 + 32 + 4 + nonce.len() + 8);
    buf.extend_from_slice(OPERATION_DOMAIN);
    buf.push(tag);
    buf.extend_from_slice(kind.source().0.as_slice());
    buf.extend_from_slice(counterparty.as_slice());
    buf.extend_from_slice(amount.fingerprint().as_slice());
    buf.extend_from_slice(&(nonce.len() as u32).to_be_bytes());
    buf.extend_from_slice(nonce.as_bytes());
    buf.extend_from_slice(&sequence.to_be_bytes());
    keccak256(&buf)
}

/// Check that `signature_hex` is `expected`'s personal_sign over `digest`.
pub fn verify_operation_signature(
    digest: B256,
    signature_hex: &str,
    expected: Address,
) -> Result<(), AuthError> {
    let trimmed = signature_hex.trim();
    let bytes = alloy::hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
        .map_err(|e| AuthError::MalformedSignature(e.to_string()))?;
    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|e| AuthError::MalformedSignature(e.to_string()))?;

    let recovered = signature
        .recover_address_from_msg(digest.as_slice())
        .map_err(|_| AuthError::RecoveryFailed)?;

    if recovered != expected {
        return Err(AuthError::WrongSigner {
            expected,
            recovered,
        });
    }
    Ok(())
}
