// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain integration for commitment anchoring.
//!
//! This module provides:
//! - the signing RPC client for the anchor account
//! - `ConfidentialVault` bindings, deployed or simulated
//! - network configuration with Stable testnet defaults

pub mod client;
pub mod contract;
pub mod types;

pub use client::ChainClient;
pub use contract::{AcceptedCommitment, SimulatedVault, TxStatus, VaultContract};
pub use types::*;
