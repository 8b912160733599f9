// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain configuration and client errors.

use alloy::primitives::Address;

/// Stable testnet RPC endpoint.
pub const STABLE_TESTNET_RPC: &str = "https://rpc.testnet.stable.xyz";

/// Stable testnet chain id.
pub const STABLE_TESTNET_CHAIN_ID: u64 = 2201;

/// Network the anchor talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Display name used in logs.
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Deployed `ConfidentialVault`; `None` runs the simulated contract.
    pub contract_address: Option<Address>,
}

impl ChainConfig {
    pub fn stable_testnet() -> Self {
        Self {
            name: "Stable Testnet".to_string(),
            chain_id: STABLE_TESTNET_CHAIN_ID,
            rpc_url: STABLE_TESTNET_RPC.to_string(),
            contract_address: None,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.contract_address.is_none()
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::stable_testnet()
    }
}

/// Errors that can occur while talking to the chain.
#[derive(Debug, thiserror::Error)]
pub enum ChainClientError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("No contract code at {0}")]
    NotDeployed(Address),

    #[error("Chain id mismatch: configured {configured}, node reports {reported}")]
    ChainIdMismatch { configured: u64, reported: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_stable_testnet() {
        let config = ChainConfig::default();
        assert_eq!(config.chain_id, 2201);
        assert_eq!(config.rpc_url, "https://rpc.testnet.stable.xyz");
        assert!(config.is_simulated());
    }
}
