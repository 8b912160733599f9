// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Chain Anchor Adapter
//!
//! Turns batches of logged operations into hash-chained commitments and
//! gets them accepted by the `ConfidentialVault` contract.
//!
//! ## Commit Loop
//!
//! Each attempt derives the commitment against the anchor's view of the
//! chain (the last root it confirmed, or a fresh read), submits it, and
//! polls the transaction until it confirms, reverts or times out. A revert
//! usually means another writer moved the root; the next attempt re-reads
//! the chain and re-derives. A timeout may hide a commitment that did land,
//! so a re-read first compares the contract's latest accepted commitment
//! with this batch and reports it confirmed on a match. After
//! `max_retries` attempts the batch is handed back as
//! [`AnchorError::ChainCommitFailed`].
//!
//! No ledger lock is held here: the batch is an owned copy.

pub mod commitment;
pub mod worker;

pub use commitment::Commitment;
pub use worker::AnchorWorker;

use std::collections::VecDeque;
use std::time::Duration;

use alloy::primitives::{TxHash, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use utoipa::ToSchema;

use crate::blockchain::{AcceptedCommitment, ChainClientError, TxStatus, VaultContract};
use crate::ledger::LoggedOperation;

/// Commitment records kept for `GET /vault/commitments`.
const HISTORY_LIMIT: usize = 100;

/// Retry and polling knobs.
#[derive(Debug, Clone)]
pub struct AnchorSettings {
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub confirm_timeout: Duration,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            poll_interval: Duration::from_millis(2000),
            confirm_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("cannot commit an empty batch")]
    EmptyBatch,

    #[error("chain commit failed after {attempts} attempts: {last_error}")]
    ChainCommitFailed { attempts: u32, last_error: String },
}

/// Final state of a commitment attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommitmentRecord {
    /// Last derived commitment; absent if no attempt got that far.
    pub commitment: Option<Commitment>,
    pub positions: Vec<u64>,
    pub status: CommitStatus,
    #[schema(value_type = Option<String>)]
    pub tx_hash: Option<TxHash>,
    pub attempts: u32,
    pub block_number: Option<u64>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Why a single attempt did not confirm.
#[derive(Debug)]
enum AttemptError {
    Reverted,
    Timeout,
    Chain(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Reverted => write!(f, "commitment reverted (stale prior root)"),
            AttemptError::Timeout => write!(f, "confirmation timed out"),
            AttemptError::Chain(e) => write!(f, "{e}"),
        }
    }
}

/// Chain tip as last seen by this anchor.
#[derive(Debug, Clone, Copy)]
struct ChainView {
    root: B256,
    count: u64,
}

pub struct ChainAnchor {
    contract: VaultContract,
    settings: AnchorSettings,
    view: Mutex<Option<ChainView>>,
    history: Mutex<VecDeque<CommitmentRecord>>,
}

impl ChainAnchor {
    pub fn new(contract: VaultContract, settings: AnchorSettings) -> Self {
        Self {
            contract,
            settings,
            view: Mutex::new(None),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
        }
    }

    pub fn contract(&self) -> &VaultContract {
        &self.contract
    }

    /// Commit `batch`, retrying with a re-derived commitment on failure.
    ///
    /// Whenever the chain tip is re-read, the latest accepted commitment is
    /// checked first: a submission whose receipt never arrived may still
    /// have landed, and must not be anchored a second time.
    pub async fn commit(&self, batch: &[LoggedOperation]) -> Result<CommitmentRecord, AnchorError> {
        if batch.is_empty() {
            return Err(AnchorError::EmptyBatch);
        }

        // One commit in flight per anchor; the view is only valid under it.
        let mut view = self.view.lock().await;
        let positions: Vec<u64> = batch.iter().map(LoggedOperation::position).collect();
        let attempts_allowed = self.settings.max_retries.max(1);

        let mut submitted: Vec<Commitment> = Vec::new();
        let mut last_error = String::new();

        for attempt in 1..=attempts_allowed {
            let tip = match *view {
                Some(tip) => tip,
                None => match self.read_landed(batch, &submitted).await {
                    Ok((tip, None)) => tip,
                    Ok((tip, Some((commitment, landed)))) => {
                        *view = Some(tip);
                        tracing::info!(
                            index = commitment.index,
                            tx_hash = ?landed.tx_hash,
                            attempts = attempt,
                            "Commitment already accepted on chain"
                        );
                        let record = self
                            .confirmed(
                                commitment,
                                positions,
                                landed.tx_hash,
                                landed.block_number,
                                attempt,
                            )
                            .await;
                        return Ok(record);
                    }
                    Err(e) => {
                        last_error = e.to_string();
                        tracing::warn!(attempt, error = %last_error, "Could not read chain tip");
                        tokio::time::sleep(self.settings.poll_interval).await;
                        continue;
                    }
                },
            };

            let commitment = Commitment::derive(batch, tip.root, tip.count + 1);
            tracing::debug!(
                attempt,
                index = commitment.index,
                prior_root = %commitment.prior_root,
                new_root = %commitment.new_root,
                operations = positions.len(),
                "Submitting commitment"
            );

            match self.attempt(&commitment).await {
                Ok((tx_hash, block_number)) => {
                    *view = Some(ChainView {
                        root: commitment.new_root,
                        count: commitment.index,
                    });
                    tracing::info!(
                        index = commitment.index,
                        tx_hash = %tx_hash,
                        block_number,
                        attempts = attempt,
                        operations = positions.len(),
                        "Commitment confirmed"
                    );
                    let record = self
                        .confirmed(
                            commitment,
                            positions,
                            Some(tx_hash),
                            Some(block_number),
                            attempt,
                        )
                        .await;
                    return Ok(record);
                }
                Err((tx_hash, e)) => {
                    *view = None;
                    last_error = e.to_string();
                    tracing::warn!(
                        attempt,
                        index = commitment.index,
                        tx_hash = ?tx_hash,
                        error = %last_error,
                        "Commitment attempt failed, re-deriving"
                    );
                    submitted.push(commitment);
                    if !matches!(e, AttemptError::Reverted) {
                        tokio::time::sleep(self.settings.poll_interval).await;
                    }
                }
            }
        }

        self.remember(CommitmentRecord {
            commitment: submitted.pop(),
            positions,
            status: CommitStatus::Failed,
            tx_hash: None,
            attempts: attempts_allowed,
            block_number: None,
            confirmed_at: None,
            last_error: Some(last_error.clone()),
        })
        .await;

        Err(AnchorError::ChainCommitFailed {
            attempts: attempts_allowed,
            last_error,
        })
    }

    async fn confirmed(
        &self,
        commitment: Commitment,
        positions: Vec<u64>,
        tx_hash: Option<TxHash>,
        block_number: Option<u64>,
        attempts: u32,
    ) -> CommitmentRecord {
        let record = CommitmentRecord {
            commitment: Some(commitment),
            positions,
            status: CommitStatus::Confirmed,
            tx_hash,
            attempts,
            block_number,
            confirmed_at: Some(Utc::now()),
            last_error: None,
        };
        self.remember(record.clone()).await;
        record
    }

    /// Fresh chain tip, plus the commitment that already carries `batch`
    /// if there is one: any of this call's `submitted` commitments that the
    /// contract accepted, or the latest accepted commitment when it derives
    /// from exactly this batch (an earlier run's submission).
    async fn read_landed(
        &self,
        batch: &[LoggedOperation],
        submitted: &[Commitment],
    ) -> Result<(ChainView, Option<(Commitment, AcceptedCommitment)>), ChainClientError> {
        let tip = self.read_tip().await?;

        for commitment in submitted.iter().filter(|c| c.index <= tip.count) {
            if let Some(landed) = self.contract.accepted_at(commitment.index).await? {
                if landed.new_root == commitment.new_root {
                    return Ok((tip, Some((commitment.clone(), landed))));
                }
            }
        }

        if tip.count == 0 {
            return Ok((tip, None));
        }
        let Some(landed) = self.contract.accepted_at(tip.count).await? else {
            return Ok((tip, None));
        };
        let commitment = Commitment::derive(batch, landed.prior_root, tip.count);
        if commitment.new_root == landed.new_root {
            Ok((tip, Some((commitment, landed))))
        } else {
            Ok((tip, None))
        }
    }

    async fn read_tip(&self) -> Result<ChainView, ChainClientError> {
        Ok(ChainView {
            root: self.contract.current_root().await?,
            count: self.contract.commitment_count().await?,
        })
    }

    /// Submit once and wait for a verdict.
    async fn attempt(
        &self,
        commitment: &Commitment,
    ) -> Result<(TxHash, u64), (Option<TxHash>, AttemptError)> {
        let tx_hash = self
            .contract
            .submit(commitment.prior_root, commitment.new_root, commitment.index)
            .await
            .map_err(|e| (None, AttemptError::Chain(e.to_string())))?;

        let verdict = tokio::time::timeout(self.settings.confirm_timeout, async {
            loop {
                match self.contract.status(tx_hash).await {
                    Ok(TxStatus::Confirmed { block_number }) => return Ok(block_number),
                    Ok(TxStatus::Reverted) => return Err(AttemptError::Reverted),
                    Ok(TxStatus::Pending) => {}
                    Err(e) => {
                        tracing::debug!(tx_hash = %tx_hash, error = %e, "Receipt poll failed");
                    }
                }
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        })
        .await;

        match verdict {
            Ok(Ok(block_number)) => Ok((tx_hash, block_number)),
            Ok(Err(e)) => Err((Some(tx_hash), e)),
            Err(_) => Err((Some(tx_hash), AttemptError::Timeout)),
        }
    }

    async fn remember(&self, record: CommitmentRecord) {
        let mut history = self.history.lock().await;
        if history.len() == HISTORY_LIMIT {
            history.pop_back();
        }
        history.push_front(record);
    }

    /// Recent commitment records, newest first.
    pub async fn history(&self) -> Vec<CommitmentRecord> {
        self.history.lock().await.iter().cloned().collect()
    }
}
