// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::FromRequest,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    anchor::{Commitment, CommitStatus, CommitmentRecord},
    error::{ApiError, ErrorBody},
    fhe::{Ciphertext, PublicKeyInfo, RandomnessProof},
    ledger::{
        AccountEffect, AccountId, CommitState, LedgerStats, LoggedOperation, Operation,
        OperationEntry, OperationKind, Receipt, UncommittedBatch,
    },
    state::AppState,
};

pub mod fhe;
pub mod health;
pub mod vault;

/// JSON body extractor whose rejections use the common error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

pub fn router(state: AppState) -> Router {
    let vault_routes = Router::new()
        .route("/accounts", post(vault::open_account))
        .route("/accounts/{id}", get(vault::get_account))
        .route("/accounts/{id}/balance", get(vault::get_balance))
        .route(
            "/operations",
            get(vault::list_operations).post(vault::submit_operation),
        )
        .route("/commitments", get(vault::list_commitments))
        .route("/commitments/requeue", post(vault::requeue_commitments));

    let fhe_routes = Router::new()
        .route("/publickey", get(fhe::public_key))
        .route("/rerandomize", post(fhe::rerandomize))
        .route("/encrypt", post(fhe::encrypt));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/vault", vault_routes)
        .nest("/fhe", fhe_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        vault::open_account,
        vault::get_account,
        vault::get_balance,
        vault::submit_operation,
        vault::list_operations,
        vault::list_commitments,
        vault::requeue_commitments,
        fhe::public_key,
        fhe::rerandomize,
        fhe::encrypt
    ),
    components(
        schemas(
            ErrorBody,
            Ciphertext,
            RandomnessProof,
            PublicKeyInfo,
            AccountId,
            AccountEffect,
            Receipt,
            Operation,
            OperationKind,
            LoggedOperation,
            OperationEntry,
            CommitState,
            UncommittedBatch,
            LedgerStats,
            Commitment,
            CommitStatus,
            CommitmentRecord,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            vault::OpenAccountRequest,
            vault::AccountResponse,
            vault::BalanceResponse,
            vault::OperationKindName,
            vault::SubmitOperationRequest,
            vault::OperationResponse,
            vault::OperationsPage,
            vault::CommitmentsResponse,
            vault::RequeueResponse,
            fhe::RerandomizeRequest,
            fhe::AmountBinding,
            fhe::EncryptRequest,
            fhe::EncryptResponse,
            fhe::CiphertextResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Vault", description = "Encrypted accounts and signed operations"),
        (name = "Commitments", description = "On-chain ledger commitments"),
        (name = "FHE", description = "Ciphertext utilities")
    )
)]
struct ApiDoc;
