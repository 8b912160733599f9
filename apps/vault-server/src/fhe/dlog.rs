// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded discrete log for exponential ElGamal decryption.
//!
//! Baby-step/giant-step with `2^16` baby steps covers `|m| < 2^32`. The
//! table only depends on the generator, so one immutable copy is shared by
//! every key holder in the process.

use std::collections::HashMap;
use std::sync::OnceLock;

use k256::{ProjectivePoint, Scalar};

use super::ciphertext::{encode_point, POINT_LEN};

const BABY_STEPS: u64 = 1 << 16;

/// Exclusive bound on the magnitude of solvable plaintexts.
pub(crate) const SEARCH_BOUND: u64 = BABY_STEPS * BABY_STEPS;

static TABLE: OnceLock<DlogTable> = OnceLock::new();

pub(crate) struct DlogTable {
    baby: HashMap<[u8; POINT_LEN], u32>,
    giant_stride: ProjectivePoint,
}

pub(crate) fn table() -> &'static DlogTable {
    TABLE.get_or_init(DlogTable::build)
}

impl DlogTable {
    fn build() -> Self {
        tracing::debug!(baby_steps = BABY_STEPS, "Building discrete log table");

        let mut baby = HashMap::with_capacity(BABY_STEPS as usize);
        let mut acc = ProjectivePoint::IDENTITY;
        for j in 0..BABY_STEPS {
            baby.insert(encode_point(&acc), j as u32);
            acc += ProjectivePoint::GENERATOR;
        }

        Self {
            baby,
            giant_stride: ProjectivePoint::GENERATOR * Scalar::from(BABY_STEPS),
        }
    }

    /// Find `m` with `m·G == target` and `|m| < SEARCH_BOUND`.
    ///
    /// Positive and negative candidates are searched in lockstep so small
    /// magnitudes of either sign resolve in the first giant step.
    pub(crate) fn solve(&self, target: &ProjectivePoint) -> Option<i64> {
        let mut pos = *target;
        let mut neg = -*target;

        for i in 0..BABY_STEPS {
            if let Some(j) = self.baby.get(&encode_point(&pos)) {
                return Some((i * BABY_STEPS + u64::from(*j)) as i64);
            }
            if let Some(j) = self.baby.get(&encode_point(&neg)) {
                return Some(-((i * BABY_STEPS + u64::from(*j)) as i64));
            }
            pos -= self.giant_stride;
            neg -= self.giant_stride;
        }

        None
    }
}
