// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `ConfidentialVault` contract access.
//!
//! The contract keeps one root and a commitment counter, and accepts a new
//! root only when the submitted prior root equals the current one. That
//! rule is the cross-instance source of truth for commitment order.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::{
    primitives::{keccak256, Address, TxHash, B256, U256},
    providers::{DynProvider, Provider},
    rpc::types::Filter,
    sol,
    sol_types::SolEvent,
};
use tokio::sync::Mutex;

use super::client::ChainClient;
use super::types::ChainClientError;

sol! {
    #[sol(rpc, all_derives)]
    interface IConfidentialVault {
        event CommitmentAccepted(uint64 indexed index, bytes32 priorRoot, bytes32 newRoot);

        function currentRoot() external view returns (bytes32);
        function commitmentCount() external view returns (uint64);
        function submitCommitment(bytes32 priorRoot, bytes32 newRoot, uint64 index) external;
    }
}

/// Observed state of a submitted commitment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed { block_number: u64 },
    Reverted,
}

/// A commitment the contract has accepted, as read back from its
/// `CommitmentAccepted` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedCommitment {
    pub index: u64,
    pub prior_root: B256,
    pub new_root: B256,
    pub block_number: Option<u64>,
    pub tx_hash: Option<TxHash>,
}

/// The vault contract, deployed or simulated.
#[derive(Debug, Clone)]
pub enum VaultContract {
    Onchain(OnchainVault),
    Simulated(SimulatedVault),
}

impl VaultContract {
    pub fn onchain(client: &ChainClient, address: Address) -> Self {
        VaultContract::Onchain(OnchainVault {
            address,
            provider: client.provider().clone(),
        })
    }

    pub fn simulated() -> Self {
        VaultContract::Simulated(SimulatedVault::default())
    }

    /// Short description for logs and health output.
    pub fn describe(&self) -> String {
        match self {
            VaultContract::Onchain(vault) => format!("onchain:{}", vault.address),
            VaultContract::Simulated(_) => "simulated".to_string(),
        }
    }

    pub async fn current_root(&self) -> Result<B256, ChainClientError> {
        match self {
            VaultContract::Onchain(vault) => vault.current_root().await,
            VaultContract::Simulated(vault) => vault.current_root().await,
        }
    }

    pub async fn commitment_count(&self) -> Result<u64, ChainClientError> {
        match self {
            VaultContract::Onchain(vault) => vault.commitment_count().await,
            VaultContract::Simulated(vault) => vault.commitment_count().await,
        }
    }

    /// Send `submitCommitment` and return the transaction hash.
    pub async fn submit(
        &self,
        prior_root: B256,
        new_root: B256,
        index: u64,
    ) -> Result<TxHash, ChainClientError> {
        match self {
            VaultContract::Onchain(vault) => vault.submit(prior_root, new_root, index).await,
            VaultContract::Simulated(vault) => vault.submit(prior_root, new_root, index).await,
        }
    }

    pub async fn status(&self, tx: TxHash) -> Result<TxStatus, ChainClientError> {
        match self {
            VaultContract::Onchain(vault) => vault.status(tx).await,
            VaultContract::Simulated(vault) => vault.status(tx).await,
        }
    }

    /// The commitment accepted at `index`, if any.
    pub async fn accepted_at(
        &self,
        index: u64,
    ) -> Result<Option<AcceptedCommitment>, ChainClientError> {
        match self {
            VaultContract::Onchain(vault) => vault.accepted_at(index).await,
            VaultContract::Simulated(vault) => vault.accepted_at(index).await,
        }
    }
}

// =============================================================================
// On-chain
// =============================================================================

/// Deployed contract reached through a signing provider.
#[derive(Clone)]
pub struct OnchainVault {
    address: Address,
    provider: DynProvider,
}

impl std::fmt::Debug for OnchainVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnchainVault")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl OnchainVault {
    fn instance(&self) -> IConfidentialVault::IConfidentialVaultInstance<DynProvider> {
        IConfidentialVault::new(self.address, self.provider.clone())
    }

    async fn current_root(&self) -> Result<B256, ChainClientError> {
        self.instance()
            .currentRoot()
            .call()
            .await
            .map_err(|e| ChainClientError::ContractError(e.to_string()))
    }

    async fn commitment_count(&self) -> Result<u64, ChainClientError> {
        self.instance()
            .commitmentCount()
            .call()
            .await
            .map_err(|e| ChainClientError::ContractError(e.to_string()))
    }

    async fn submit(
        &self,
        prior_root: B256,
        new_root: B256,
        index: u64,
    ) -> Result<TxHash, ChainClientError> {
        let pending = self
            .instance()
            .submitCommitment(prior_root, new_root, index)
            .send()
            .await
            .map_err(|e| ChainClientError::ContractError(format!("submit failed: {e}")))?;
        Ok(*pending.tx_hash())
    }

    async fn status(&self, tx: TxHash) -> Result<TxStatus, ChainClientError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx)
            .await
            .map_err(|e| ChainClientError::RpcError(format!("Failed to get receipt: {e}")))?;

        Ok(match receipt {
            None => TxStatus::Pending,
            Some(r) if r.status() => TxStatus::Confirmed {
                block_number: r.block_number.unwrap_or(0),
            },
            Some(_) => TxStatus::Reverted,
        })
    }

    async fn accepted_at(&self, index: u64) -> Result<Option<AcceptedCommitment>, ChainClientError> {
        let filter = Filter::new()
            .address(self.address)
            .event_signature(IConfidentialVault::CommitmentAccepted::SIGNATURE_HASH)
            .topic1(B256::from(U256::from(index)))
            .from_block(0u64);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainClientError::RpcError(format!("Failed to get logs: {e}")))?;

        // Data is (bytes32 priorRoot, bytes32 newRoot); the index is topic 1.
        let Some(log) = logs.iter().rev().find(|log| log.data().data.len() >= 64) else {
            return Ok(None);
        };
        let data = &log.data().data;
        Ok(Some(AcceptedCommitment {
            index,
            prior_root: B256::from_slice(&data[..32]),
            new_root: B256::from_slice(&data[32..64]),
            block_number: log.block_number,
            tx_hash: log.transaction_hash,
        }))
    }
}

// =============================================================================
// Simulated
// =============================================================================

#[derive(Debug, Default)]
struct SimState {
    root: B256,
    count: u64,
    block: u64,
    txs: HashMap<TxHash, TxStatus>,
    events: Vec<IConfidentialVault::CommitmentAccepted>,
    landed: HashMap<u64, AcceptedCommitment>,
    failing_calls: u32,
    hidden_receipts: u32,
}

impl SimState {
    fn take_failure(&mut self) -> Result<(), ChainClientError> {
        if self.failing_calls > 0 {
            self.failing_calls -= 1;
            return Err(ChainClientError::RpcError("simulated RPC outage".to_string()));
        }
        Ok(())
    }

    fn accept(&mut self, prior_root: B256, new_root: B256, index: u64, tx: Option<TxHash>) -> bool {
        if prior_root != self.root || index != self.count + 1 {
            return false;
        }
        self.root = new_root;
        self.count = index;
        self.events.push(IConfidentialVault::CommitmentAccepted {
            index,
            priorRoot: prior_root,
            newRoot: new_root,
        });
        self.landed.insert(
            index,
            AcceptedCommitment {
                index,
                prior_root,
                new_root,
                block_number: Some(self.block),
                tx_hash: tx,
            },
        );
        true
    }
}

/// In-process contract with the same acceptance rule as the deployed one.
///
/// Transactions are mined immediately, one per block.
#[derive(Debug, Clone, Default)]
pub struct SimulatedVault {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedVault {
    async fn current_root(&self) -> Result<B256, ChainClientError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        Ok(state.root)
    }

    async fn commitment_count(&self) -> Result<u64, ChainClientError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        Ok(state.count)
    }

    async fn submit(
        &self,
        prior_root: B256,
        new_root: B256,
        index: u64,
    ) -> Result<TxHash, ChainClientError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        state.block += 1;
        let mut preimage = Vec::with_capacity(32 * 2 + 16);
        preimage.extend_from_slice(prior_root.as_slice());
        preimage.extend_from_slice(new_root.as_slice());
        preimage.extend_from_slice(&index.to_be_bytes());
        preimage.extend_from_slice(&state.block.to_be_bytes());
        let tx = keccak256(&preimage);

        if !state.accept(prior_root, new_root, index, Some(tx)) {
            state.txs.insert(tx, TxStatus::Reverted);
        } else if state.hidden_receipts > 0 {
            // Mined, but the receipt never shows up for this client.
            state.hidden_receipts -= 1;
        } else {
            let block_number = state.block;
            state.txs.insert(tx, TxStatus::Confirmed { block_number });
        }
        Ok(tx)
    }

    async fn accepted_at(&self, index: u64) -> Result<Option<AcceptedCommitment>, ChainClientError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        Ok(state.landed.get(&index).copied())
    }

    async fn status(&self, tx: TxHash) -> Result<TxStatus, ChainClientError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        Ok(state.txs.get(&tx).copied().unwrap_or(TxStatus::Pending))
    }

    /// Accept a commitment from some other writer, moving the root under
    /// anyone holding a stale view.
    pub async fn advance_root(&self, new_root: B256) {
        let mut state = self.state.lock().await;
        let (prior, index) = (state.root, state.count + 1);
        state.block += 1;
        state.accept(prior, new_root, index, None);
    }

    /// Accept the next `submissions` commitments on chain but keep their
    /// receipts pending forever, as when confirmation outlives the poll
    /// window.
    pub async fn hide_next_receipts(&self, submissions: u32) {
        self.state.lock().await.hidden_receipts = submissions;
    }

    /// Make the next `calls` contract calls fail with an RPC error.
    pub async fn fail_next_calls(&self, calls: u32) {
        self.state.lock().await.failing_calls = calls;
    }

    /// Emitted `CommitmentAccepted` events, in order.
    pub async fn accepted(&self) -> Vec<IConfidentialVault::CommitmentAccepted> {
        self.state.lock().await.events.clone()
    }
}
