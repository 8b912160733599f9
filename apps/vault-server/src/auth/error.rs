// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operation authentication errors.

use alloy::primitives::Address;
use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Signature is not 65 bytes of hex.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// Signature is well-formed but no address could be recovered.
    #[error("signature recovery failed")]
    RecoveryFailed,

    /// Signature was made by some other key.
    #[error("operation not signed by {expected}")]
    WrongSigner { expected: Address, recovered: Address },
}

impl AuthError {
    /// Every variant reports as `bad_signature`; the detail stays in logs.
    pub fn error_code(&self) -> &'static str {
        "bad_signature"
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedSignature(_)
            | AuthError::RecoveryFailed
            | AuthError::WrongSigner { .. } => StatusCode::UNAUTHORIZED,
        }
    }
}
