// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ciphertext utilities for clients.
//!
//! Nothing here ever returns a plaintext.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ApiJson;
use crate::{
    error::{ApiError, ErrorBody},
    fhe::{Ciphertext, PublicKeyInfo, RandomnessProof},
    ledger::{amount_context, AccountId},
    state::AppState,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RerandomizeRequest {
    pub ciphertext: Ciphertext,
}

/// The operation slot an encrypted amount will be submitted in.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AmountBinding {
    /// Source account of the operation.
    pub account: AccountId,
    pub nonce: String,
    pub sequence: u64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EncryptRequest {
    /// Plain amount, at most `max_amount` from the public key info.
    pub amount: u64,
    /// When set, the response carries the amount proof for this slot.
    #[serde(default)]
    pub binding: Option<AmountBinding>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CiphertextResponse {
    pub ciphertext: Ciphertext,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EncryptResponse {
    pub ciphertext: Ciphertext,
    /// Pass as `amount_proof` when submitting the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<RandomnessProof>,
}

/// Vault public key and scheme parameters.
#[utoipa::path(
    get,
    path = "/fhe/publickey",
    tag = "FHE",
    responses(
        (status = 200, description = "Public key", body = PublicKeyInfo)
    )
)]
pub async fn public_key(State(state): State<AppState>) -> Json<PublicKeyInfo> {
    Json(state.engine.public_key().clone())
}

#[utoipa::path(
    post,
    path = "/fhe/rerandomize",
    tag = "FHE",
    request_body = RerandomizeRequest,
    responses(
        (status = 200, description = "Same value, fresh blinding", body = CiphertextResponse),
        (status = 422, description = "Foreign scheme or key", body = ErrorBody)
    )
)]
pub async fn rerandomize(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RerandomizeRequest>,
) -> Result<Json<CiphertextResponse>, ApiError> {
    let ciphertext = state.engine.rerandomize(&request.ciphertext)?;
    Ok(Json(CiphertextResponse { ciphertext }))
}

/// Encrypt an amount server-side, for clients without local crypto.
#[utoipa::path(
    post,
    path = "/fhe/encrypt",
    tag = "FHE",
    request_body = EncryptRequest,
    responses(
        (status = 200, description = "Encrypted amount", body = EncryptResponse),
        (status = 422, description = "Amount out of range", body = ErrorBody)
    )
)]
pub async fn encrypt(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EncryptRequest>,
) -> Result<Json<EncryptResponse>, ApiError> {
    match request.binding {
        Some(binding) => {
            let context = amount_context(binding.account, &binding.nonce, binding.sequence);
            let (ciphertext, proof) = state.engine.encrypt_with_proof(request.amount, context)?;
            Ok(Json(EncryptResponse {
                ciphertext,
                proof: Some(proof),
            }))
        }
        None => Ok(Json(EncryptResponse {
            ciphertext: state.engine.encrypt(request.amount)?,
            proof: None,
        })),
    }
}
