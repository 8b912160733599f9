// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Anchor Worker
//!
//! Background task that drains the ledger's pending operations into chain
//! commitments.
//!
//! Every `commit_interval` (default 10 s) the worker:
//! 1. Optionally moves uncommitted batches back to the pending queue.
//! 2. Takes up to `batch_size` pending operations.
//! 3. Commits them through [`ChainAnchor`] and archives the batch, or parks
//!    it as uncommitted and raises an operator alert.
//!
//! Request handlers never wait on this loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::ChainAnchor;
use crate::ledger::{LoggedOperation, VaultLedger};

pub struct AnchorWorker {
    ledger: Arc<VaultLedger>,
    anchor: Arc<ChainAnchor>,
    interval: Duration,
    batch_size: usize,
    auto_requeue: bool,
}

impl AnchorWorker {
    pub fn new(ledger: Arc<VaultLedger>, anchor: Arc<ChainAnchor>) -> Self {
        Self {
            ledger,
            anchor,
            interval: Duration::from_secs(10),
            batch_size: 64,
            auto_requeue: true,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_auto_requeue(mut self, auto_requeue: bool) -> Self {
        self.auto_requeue = auto_requeue;
        self
    }

    /// Run until the token is cancelled.
    ///
    /// ```rust,ignore
    /// tokio::spawn(worker.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            contract = %self.anchor.contract().describe(),
            "Anchor worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            // Drain fully before sleeping so a backlog doesn't wait a
            // whole interval per batch.
            while self.sweep().await > 0 && !shutdown.is_cancelled() {}

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Anchor worker shutting down");
    }

    /// One sweep: commit at most one batch. Returns the number of
    /// operations that became chain-durable.
    pub async fn sweep(&self) -> usize {
        if self.auto_requeue {
            let requeued = self.ledger.requeue_uncommitted().await;
            if requeued > 0 {
                info!(operations = requeued, "Re-queued uncommitted operations");
            }
        }

        let batch = self.ledger.take_pending_batch(self.batch_size).await;
        if batch.is_empty() {
            return 0;
        }
        let positions: Vec<u64> = batch.iter().map(LoggedOperation::position).collect();

        match self.anchor.commit(&batch).await {
            Ok(record) => {
                let index = record.commitment.as_ref().map(|c| c.index).unwrap_or_default();
                if let Err(e) = self.ledger.mark_committed(&positions, index).await {
                    error!(
                        target: "vault::alert",
                        commitment = index,
                        error = %e,
                        "Commitment confirmed but journal archive failed"
                    );
                }
                positions.len()
            }
            Err(e) => {
                let first = positions.first().copied().unwrap_or_default();
                let last = positions.last().copied().unwrap_or_default();
                let batch_id = self.ledger.mark_uncommitted(positions, e.to_string()).await;
                error!(
                    target: "vault::alert",
                    batch_id,
                    first_position = first,
                    last_position = last,
                    error = %e,
                    "Batch left uncommitted"
                );
                0
            }
        }
    }
}
