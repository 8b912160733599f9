// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Operation Authentication
//!
//! Vault accounts are EVM addresses, and the key controlling an address is
//! the account credential. A client authorizes an operation by signing its
//! digest with `personal_sign` (EIP-191):
//!
//! 1. Client builds the operation and computes [`operation_digest`]
//! 2. Client signs the 32-byte digest with the source account's key
//! 3. Gateway recovers the signer and compares it to the source account
//!
//! ## Security
//!
//! - Verification happens before the ledger sees the operation
//! - The digest covers the sequence number, so a signature is single-use
//!   even without the nonce check
//! - Failures are logged on the `vault::security` target

pub mod error;
pub mod signature;

pub use error::AuthError;
pub use signature::{operation_digest, verify_operation_signature};
