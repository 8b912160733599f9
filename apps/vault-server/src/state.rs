// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::anchor::{AnchorSettings, ChainAnchor};
use crate::blockchain::VaultContract;
use crate::fhe::{FheEngine, FheError};
use crate::ledger::VaultLedger;

/// Shared handles for request handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FheEngine>,
    pub ledger: Arc<VaultLedger>,
    pub anchor: Arc<ChainAnchor>,
    /// Whether the ledger writes to a durable journal.
    pub durable: bool,
}

impl AppState {
    pub fn new(ledger: Arc<VaultLedger>, anchor: Arc<ChainAnchor>, durable: bool) -> Self {
        Self {
            engine: ledger.engine().clone(),
            ledger,
            anchor,
            durable,
        }
    }

    /// Fresh key, in-memory ledger and simulated contract.
    pub fn ephemeral() -> Result<Self, FheError> {
        let engine = Arc::new(FheEngine::generate()?);
        let ledger = Arc::new(VaultLedger::new(engine));
        let anchor = Arc::new(ChainAnchor::new(
            VaultContract::simulated(),
            AnchorSettings::default(),
        ));
        Ok(Self::new(ledger, anchor, false))
    }
}
