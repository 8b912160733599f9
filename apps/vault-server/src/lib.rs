// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Confidential Vault - Encrypted Balance Ledger Service
//!
//! Account balances are held as additively homomorphic ciphertexts. Deposits,
//! withdrawals and transfers are applied without decrypting them, and the
//! ledger is anchored on-chain as a hash chain of commitments.
//!
//! ## Modules
//!
//! - `fhe` - Encrypted arithmetic engine (EC-ElGamal, range attestations)
//! - `ledger` - Per-account encrypted state and the ordered operation log
//! - `anchor` - Commitment derivation, bounded-retry submission, worker
//! - `blockchain` - ConfidentialVault contract bindings (alloy)
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Operation signature verification (EIP-191)
//! - `storage` - Durable operation journal (redb)

pub mod anchor;
pub mod api;
pub mod auth;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod fhe;
pub mod ledger;
pub mod logging;
pub mod state;
pub mod storage;
