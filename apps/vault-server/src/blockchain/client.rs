// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing RPC client for the anchor chain.

use alloy::{
    network::EthereumWallet,
    primitives::{utils::format_ether, Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
};

use super::types::{ChainClientError, ChainConfig};

/// RPC client whose transactions are signed by the anchor key.
#[derive(Clone)]
pub struct ChainClient {
    config: ChainConfig,
    provider: DynProvider,
    sender: Address,
}

impl ChainClient {
    /// Connect to the configured RPC with a wallet built from `private_key_hex`.
    pub fn connect(config: ChainConfig, private_key_hex: &str) -> Result<Self, ChainClientError> {
        let url: url::Url = config
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainClientError::InvalidRpcUrl(e.to_string()))?;

        let signer = Self::create_signer(private_key_hex)?;
        let sender = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        Ok(Self {
            config,
            provider,
            sender,
        })
    }

    /// Create a signer from a hex private key (with or without `0x`).
    pub fn create_signer(private_key_hex: &str) -> Result<PrivateKeySigner, ChainClientError> {
        let trimmed = private_key_hex.trim();
        let key_bytes = alloy::hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| ChainClientError::InvalidPrivateKey(e.to_string()))?;

        PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| ChainClientError::InvalidPrivateKey(e.to_string()))
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    async fn native_balance(&self, address: Address) -> Result<U256, ChainClientError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| ChainClientError::RpcError(e.to_string()))
    }

    /// Check the node's chain id and that contract code exists at `address`.
    pub async fn verify_deployment(&self, address: Address) -> Result<(), ChainClientError> {
        let reported = self
            .provider
            .get_chain_id()
            .await
            .map_err(|e| ChainClientError::RpcError(e.to_string()))?;
        if reported != self.config.chain_id {
            return Err(ChainClientError::ChainIdMismatch {
                configured: self.config.chain_id,
                reported,
            });
        }

        let code = self
            .provider
            .get_code_at(address)
            .await
            .map_err(|e| ChainClientError::RpcError(e.to_string()))?;
        if code.is_empty() {
            return Err(ChainClientError::NotDeployed(address));
        }

        tracing::info!(
            contract = %address,
            chain_id = reported,
            code_len = code.len(),
            "ConfidentialVault deployment verified"
        );
        Ok(())
    }

    /// Log the anchor sender and its gas balance. Never fails.
    pub async fn log_sender(&self) {
        match self.native_balance(self.sender).await {
            Ok(balance) => tracing::info!(
                sender = %self.sender,
                network = %self.config.name,
                chain_id = self.config.chain_id,
                balance = %format_ether(balance),
                "Anchor sender ready"
            ),
            Err(e) => tracing::warn!(
                sender = %self.sender,
                error = %e,
                "Could not fetch anchor sender balance"
            ),
        }
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("config", &self.config)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}
