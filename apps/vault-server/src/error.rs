// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthError;
use crate::fhe::FheError;
use crate::ledger::LedgerError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
}

/// Error body returned by every endpoint.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code.to_string(),
        });
        (self.status, body).into_response()
    }
}

impl From<FheError> for ApiError {
    fn from(e: FheError) -> Self {
        match &e {
            FheError::SchemeMismatch(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "scheme_mismatch", e.to_string())
            }
            FheError::MalformedCiphertext(_) => {
                Self::new(StatusCode::BAD_REQUEST, "malformed_ciphertext", e.to_string())
            }
            FheError::AmountOutOfRange { .. } => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_amount", e.to_string())
            }
            FheError::KeyMaterial(_) => {
                tracing::error!(error = %e, "Key material failure");
                Self::internal("internal error")
            }
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let message = e.to_string();
        let (status, code) = match e {
            LedgerError::Engine(inner) => return inner.into(),
            LedgerError::Storage(_) => {
                tracing::error!(target: "vault::alert", error = %message, "Ledger storage failure");
                return Self::internal("internal error");
            }
            LedgerError::EngineTask(_) => {
                tracing::error!(error = %message, "Engine task failed");
                return Self::internal("internal error");
            }
            LedgerError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "account_not_found"),
            LedgerError::AccountExists(_) => (StatusCode::CONFLICT, "account_exists"),
            LedgerError::SequenceConflict { .. } => (StatusCode::CONFLICT, "sequence_conflict"),
            LedgerError::InsufficientFundsProof => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds")
            }
            LedgerError::InvalidAmount => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_amount"),
            LedgerError::AmountProofRejected => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_amount_proof")
            }
            LedgerError::BalanceLimitExceeded => {
                (StatusCode::UNPROCESSABLE_ENTITY, "balance_limit_exceeded")
            }
            LedgerError::InvalidOperation(_) => (StatusCode::BAD_REQUEST, "invalid_operation"),
        };
        Self::new(status, code, message)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::new(e.status_code(), e.error_code(), "operation signature is not valid")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AccountId;
    use alloy::primitives::Address;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_code() {
        let internal = ApiError::internal("boom");
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.error_code, "internal_error");
        assert_eq!(internal.message, "boom");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.error_code, "bad_request");
    }

    #[test]
    fn ledger_errors_map_to_codes() {
        let cases = [
            (
                LedgerError::SequenceConflict {
                    expected: 2,
                    submitted: 5,
                },
                StatusCode::CONFLICT,
                "sequence_conflict",
            ),
            (
                LedgerError::InsufficientFundsProof,
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_funds",
            ),
            (
                LedgerError::AccountNotFound(AccountId(Address::ZERO)),
                StatusCode::NOT_FOUND,
                "account_not_found",
            ),
            (
                LedgerError::Engine(FheError::SchemeMismatch("x".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
                "scheme_mismatch",
            ),
            (
                LedgerError::Storage("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
            (
                LedgerError::AmountProofRejected,
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_amount_proof",
            ),
            (
                LedgerError::EngineTask("panicked".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
        ];
        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status);
            assert_eq!(api.error_code, code);
        }
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"bad_request"}"#);
    }
}
