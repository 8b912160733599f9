// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Durable Storage
//!
//! The ledger journal lives in a single redb file under `DATA_DIR`.
//! Without `DATA_DIR` the service runs fully in memory.

pub mod op_log;

pub use op_log::{OpLogError, OpLogResult, OperationLog};
