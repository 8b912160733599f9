// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vault account and operation endpoints.
//!
//! Every balance and amount crosses this boundary as a ciphertext. The
//! gateway checks signatures and shapes requests; all validation of
//! encrypted values happens in the ledger.

use alloy::primitives::B256;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::ApiJson;
use crate::{
    anchor::CommitmentRecord,
    auth::{operation_digest, verify_operation_signature},
    error::{ApiError, ErrorBody},
    fhe::{Ciphertext, RandomnessProof},
    ledger::{
        AccountId, AccountSnapshot, LedgerStats, Operation, OperationEntry, OperationKind,
        Receipt, UncommittedBatch,
    },
    state::AppState,
};

const DEFAULT_PAGE: usize = 100;
const MAX_PAGE: usize = 500;

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OpenAccountRequest {
    /// EVM address that will control the account.
    pub account: AccountId,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountResponse {
    pub account: AccountId,
    pub sequence: u64,
    pub balance: Ciphertext,
    #[schema(value_type = String)]
    pub balance_fingerprint: B256,
    pub created_at: DateTime<Utc>,
}

impl From<AccountSnapshot> for AccountResponse {
    fn from(snapshot: AccountSnapshot) -> Self {
        Self {
            account: snapshot.account,
            sequence: snapshot.sequence,
            balance_fingerprint: snapshot.balance.fingerprint(),
            balance: snapshot.balance,
            created_at: snapshot.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub account: AccountId,
    pub sequence: u64,
    pub ciphertext: Ciphertext,
    #[schema(value_type = String)]
    pub fingerprint: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKindName {
    Deposit,
    Withdraw,
    Transfer,
}

/// A signed operation.
///
/// Deposits and withdrawals name `account`; transfers name `from` and `to`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitOperationRequest {
    pub kind: OperationKindName,
    #[serde(default)]
    pub account: Option<AccountId>,
    #[serde(default)]
    pub from: Option<AccountId>,
    #[serde(default)]
    pub to: Option<AccountId>,
    /// Encrypted amount.
    pub amount: Ciphertext,
    /// Proof of knowledge of the amount's blinding scalar, bound to the
    /// source account, nonce and sequence (see `/fhe/encrypt`).
    pub amount_proof: RandomnessProof,
    pub nonce: String,
    /// The source account's next sequence number.
    pub sequence: u64,
    /// 65-byte `personal_sign` signature over the operation digest, hex.
    pub signature: String,
}

impl SubmitOperationRequest {
    fn operation_kind(&self) -> Result<OperationKind, ApiError> {
        let missing = |field: &str| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "invalid_operation",
                format!("{field} is required for this operation kind"),
            )
        };

        match self.kind {
            OperationKindName::Deposit => Ok(OperationKind::Deposit {
                account: self.account.ok_or_else(|| missing("account"))?,
            }),
            OperationKindName::Withdraw => Ok(OperationKind::Withdraw {
                account: self.account.ok_or_else(|| missing("account"))?,
            }),
            OperationKindName::Transfer => Ok(OperationKind::Transfer {
                from: self.from.ok_or_else(|| missing("from"))?,
                to: self.to.ok_or_else(|| missing("to"))?,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OperationResponse {
    pub receipt: Receipt,
    /// True when the nonce was already used and this is the original receipt.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OperationsQuery {
    /// Return operations after this log position.
    pub since: Option<u64>,
    /// Page size (default 100, max 500).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OperationsPage {
    pub operations: Vec<OperationEntry>,
    /// Position to pass as `since` for the next page.
    pub next_since: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommitmentsResponse {
    /// `simulated` or `onchain:<address>`.
    pub contract: String,
    /// Most recent first.
    pub records: Vec<CommitmentRecord>,
    pub uncommitted: Vec<UncommittedBatch>,
    pub stats: LedgerStats,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequeueResponse {
    /// Number of operations moved back to the pending queue.
    pub requeued: usize,
}

fn parse_account(raw: &str) -> Result<AccountId, ApiError> {
    raw.parse().map_err(ApiError::bad_request)
}

// =============================================================================
// Handlers
// =============================================================================

/// Open an account with an encrypted zero balance.
#[utoipa::path(
    post,
    path = "/vault/accounts",
    tag = "Vault",
    request_body = OpenAccountRequest,
    responses(
        (status = 201, description = "Account opened", body = AccountResponse),
        (status = 409, description = "Account already exists", body = ErrorBody)
    )
)]
pub async fn open_account(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<OpenAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let snapshot = state.ledger.open_account(request.account).await?;
    Ok((StatusCode::CREATED, Json(snapshot.into())))
}

#[utoipa::path(
    get,
    path = "/vault/accounts/{id}",
    tag = "Vault",
    params(("id" = String, Path, description = "Account address")),
    responses(
        (status = 200, description = "Account state", body = AccountResponse),
        (status = 404, description = "Unknown account", body = ErrorBody)
    )
)]
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = parse_account(&id)?;
    let snapshot = state.ledger.account(&account).await?;
    Ok(Json(snapshot.into()))
}

/// Current encrypted balance.
#[utoipa::path(
    get,
    path = "/vault/accounts/{id}/balance",
    tag = "Vault",
    params(("id" = String, Path, description = "Account address")),
    responses(
        (status = 200, description = "Encrypted balance", body = BalanceResponse),
        (status = 404, description = "Unknown account", body = ErrorBody)
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = parse_account(&id)?;
    let snapshot = state.ledger.account(&account).await?;
    Ok(Json(BalanceResponse {
        account: snapshot.account,
        sequence: snapshot.sequence,
        fingerprint: snapshot.balance.fingerprint(),
        ciphertext: snapshot.balance,
    }))
}

/// Submit a signed deposit, withdrawal or transfer.
///
/// The signature is checked against the source account before the ledger
/// sees the operation. Resubmitting a used nonce returns the original
/// receipt with `duplicate: true`.
#[utoipa::path(
    post,
    path = "/vault/operations",
    tag = "Vault",
    request_body = SubmitOperationRequest,
    responses(
        (status = 200, description = "Operation applied", body = OperationResponse),
        (status = 400, description = "Malformed operation", body = ErrorBody),
        (status = 401, description = "Bad signature", body = ErrorBody),
        (status = 404, description = "Unknown account", body = ErrorBody),
        (status = 409, description = "Sequence conflict", body = ErrorBody),
        (status = 422, description = "Rejected by range proof or scheme check", body = ErrorBody)
    )
)]
pub async fn submit_operation(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SubmitOperationRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let kind = request.operation_kind()?;
    let digest = operation_digest(&kind, &request.amount, &request.nonce, request.sequence);

    if let Err(e) = verify_operation_signature(digest, &request.signature, kind.source().0) {
        tracing::warn!(
            target: "vault::security",
            account = %kind.source(),
            kind = kind.name(),
            sequence = request.sequence,
            error = %e,
            "Rejected operation signature"
        );
        return Err(e.into());
    }

    let operation = Operation::new(
        kind,
        request.amount,
        request.amount_proof,
        request.nonce,
        request.sequence,
    );
    let outcome = state.ledger.apply_operation(operation).await?;
    let duplicate = outcome.is_duplicate();

    Ok(Json(OperationResponse {
        receipt: outcome.into_receipt(),
        duplicate,
    }))
}

/// Page through the operation log with commit states.
#[utoipa::path(
    get,
    path = "/vault/operations",
    tag = "Vault",
    params(OperationsQuery),
    responses(
        (status = 200, description = "Operation log page", body = OperationsPage)
    )
)]
pub async fn list_operations(
    State(state): State<AppState>,
    Query(query): Query<OperationsQuery>,
) -> Json<OperationsPage> {
    let since = query.since.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);

    let operations = state.ledger.operations(since, limit).await;
    let next_since = operations
        .last()
        .map(|entry| entry.logged.position())
        .unwrap_or(since);

    Json(OperationsPage {
        operations,
        next_since,
    })
}

/// Recent commitments, uncommitted batches and ledger counters.
#[utoipa::path(
    get,
    path = "/vault/commitments",
    tag = "Commitments",
    responses(
        (status = 200, description = "Commitment status", body = CommitmentsResponse)
    )
)]
pub async fn list_commitments(State(state): State<AppState>) -> Json<CommitmentsResponse> {
    Json(CommitmentsResponse {
        contract: state.anchor.contract().describe(),
        records: state.anchor.history().await,
        uncommitted: state.ledger.uncommitted_batches().await,
        stats: state.ledger.stats().await,
    })
}

/// Put every uncommitted batch back in the pending queue.
#[utoipa::path(
    post,
    path = "/vault/commitments/requeue",
    tag = "Commitments",
    responses(
        (status = 200, description = "Batches re-queued", body = RequeueResponse)
    )
)]
pub async fn requeue_commitments(State(state): State<AppState>) -> Json<RequeueResponse> {
    let requeued = state.ledger.requeue_uncommitted().await;
    if requeued > 0 {
        tracing::info!(requeued, "Operator re-queued uncommitted operations");
    }
    Json(RequeueResponse { requeued })
}
