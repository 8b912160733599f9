// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Encrypted Arithmetic Engine
//!
//! Vault balances and amounts are exponential ElGamal ciphertexts over
//! secp256k1:
//!
//! ```text
//! Enc(m; r) = (r·G, m·G + r·P)        P = s·G is the vault public key
//! ```
//!
//! The scheme is additively homomorphic, so deposits, withdrawals and
//! transfers are point additions and never need the plaintext.
//!
//! ## Key Isolation
//!
//! The secret scalar `s` lives inside [`keys::KeyHolder`], which is private
//! to this module. The only code that decrypts is the range attestation
//! path in [`FheEngine`], which emits a signed one-bit verdict
//! ([`RangeProof`]) rather than a value. There is no public decrypt.
//!
//! ## Plaintext Space
//!
//! Decryption solves a bounded discrete log (see [`dlog`]), so values are
//! restricted to `|m| <= MAX_BALANCE`. Single operation amounts are further
//! capped at `MAX_AMOUNT`.

pub mod ciphertext;
mod dlog;
pub mod engine;
pub mod keys;
pub mod proof;

pub use ciphertext::{Ciphertext, EncryptedBool, SCHEME, SCHEME_VERSION};
pub use engine::{FheEngine, PublicKeyInfo};
pub use proof::{RandomnessProof, RangeProof, RangeStatement};

/// Largest balance the ledger will hold (inclusive).
pub const MAX_BALANCE: u64 = u32::MAX as u64;

/// Largest amount accepted for a single operation (inclusive).
pub const MAX_AMOUNT: u64 = (1 << 24) - 1;

/// Errors raised by the encrypted arithmetic engine.
///
/// None of these variants carry plaintext values.
#[derive(Debug, thiserror::Error)]
pub enum FheError {
    #[error("ciphertext scheme mismatch: {0}")]
    SchemeMismatch(String),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("amount outside the supported range (max {max})")]
    AmountOutOfRange { max: u64 },

    #[error("key material error: {0}")]
    KeyMaterial(String),
}
