//! # Approval Handlers
//!
//! Submission, sign-off and queue endpoints over the approval workflow. The acting user's
//! role for approve/reject comes from `X-User-Role`; the user id comes from the body.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::access::AccessDecision;
use crate::auth::{CallerRole, OperatorAuth, RoleHeader, TenantExtension, TenantHeader};
use crate::error::ApiError;
use crate::models::approval_history::{self, ApprovalAction};
use crate::models::approval_step::ApproverRole;
use crate::models::permission_grant::Capability;
use crate::server::AppState;
use crate::workflow::ApprovalView;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitRequest {
    #[schema(example = "cmp-2041")]
    pub campaign_id: String,
    pub submitter_id: Uuid,
    /// Ordered sign-off chain; step 1 is the first role
    pub approver_roles: Vec<ApproverRole>,
    /// When present, the tenant must hold write access on this account to submit
    #[serde(default)]
    pub advertiser_account_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PendingQuery {
    pub user_id: Uuid,
    pub role: ApproverRole,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PendingResponse {
    pub user_id: Uuid,
    pub role: ApproverRole,
    pub approvals: Vec<ApprovalView>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecisionRequest {
    pub step_number: i32,
    pub actor_id: Uuid,
    /// Required when rejecting
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApprovalHistoryEntry {
    pub id: Uuid,
    pub approval_id: Uuid,
    pub step_number: Option<i32>,
    pub action: ApprovalAction,
    pub actor_id: Uuid,
    pub actor_role: Option<ApproverRole>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<approval_history::Model> for ApprovalHistoryEntry {
    fn from(model: approval_history::Model) -> Self {
        Self {
            id: model.id,
            approval_id: model.approval_id,
            step_number: model.step_number,
            action: model.action,
            actor_id: model.actor_id,
            actor_role: model.actor_role,
            comment: model.comment,
            created_at: model.created_at,
        }
    }
}

/// Submit a campaign for sequential approval
#[utoipa::path(
    post,
    path = "/approvals",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = SubmitRequest,
    responses(
        (status = 201, description = "Approval opened with step 1 pending", body = ApprovalView),
        (status = 400, description = "Empty role list or campaign already pending", body = ApiError),
        (status = 403, description = "Tenant lacks write access on the advertiser account", body = ApiError)
    ),
    tag = "approvals"
)]
pub async fn submit_approval(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApprovalView>), ApiError> {
    let Json(request) = payload?;

    if let Some(account) = request.advertiser_account_id.as_deref() {
        if let AccessDecision::Denied(reason) = state
            .access
            .authorize(tenant.0, account, Capability::Write)
            .await?
        {
            return Err(ApiError::new(
                StatusCode::FORBIDDEN,
                "ACCESS_DENIED".to_string(),
                format!("Tenant may not submit campaigns for account {account}"),
            )
            .with_details(serde_json::json!({ "denial": reason })));
        }
    }

    let view = state
        .workflow
        .submit(
            tenant.0,
            &request.campaign_id,
            request.submitter_id,
            &request.approver_roles,
            request.advertiser_account_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Approvals currently waiting on the caller's role
#[utoipa::path(
    get,
    path = "/approvals",
    security(("bearer_auth" = [])),
    params(PendingQuery),
    responses(
        (status = 200, description = "Pending approvals, oldest first", body = PendingResponse)
    ),
    tag = "approvals"
)]
pub async fn pending_approvals(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(query): Query<PendingQuery>,
) -> Result<Json<PendingResponse>, ApiError> {
    let approvals = state
        .workflow
        .pending_approvals_for(query.user_id, query.role)
        .await?;
    Ok(Json(PendingResponse {
        user_id: query.user_id,
        role: query.role,
        approvals,
    }))
}

#[utoipa::path(
    get,
    path = "/approvals/{approval_id}",
    security(("bearer_auth" = [])),
    params(("approval_id" = Uuid, Path, description = "Approval id")),
    responses(
        (status = 200, description = "Approval with its steps", body = ApprovalView),
        (status = 404, description = "Unknown approval", body = ApiError)
    ),
    tag = "approvals"
)]
pub async fn get_approval(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(approval_id): Path<Uuid>,
) -> Result<Json<ApprovalView>, ApiError> {
    Ok(Json(state.workflow.get(approval_id).await?))
}

#[utoipa::path(
    get,
    path = "/approvals/{approval_id}/history",
    security(("bearer_auth" = [])),
    params(("approval_id" = Uuid, Path, description = "Approval id")),
    responses(
        (status = 200, description = "Approval ledger in transition order", body = [ApprovalHistoryEntry]),
        (status = 404, description = "Unknown approval", body = ApiError)
    ),
    tag = "approvals"
)]
pub async fn approval_history(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(approval_id): Path<Uuid>,
) -> Result<Json<Vec<ApprovalHistoryEntry>>, ApiError> {
    let entries = state.workflow.history(approval_id).await?;
    Ok(Json(
        entries.into_iter().map(ApprovalHistoryEntry::from).collect(),
    ))
}

/// Approve the lowest pending step
#[utoipa::path(
    post,
    path = "/approvals/{approval_id}/approve",
    security(("bearer_auth" = [])),
    params(("approval_id" = Uuid, Path, description = "Approval id"), RoleHeader),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Step approved", body = ApprovalView),
        (status = 403, description = "Caller role does not match the step", body = ApiError),
        (status = 409, description = "Step out of order or already resolved", body = ApiError)
    ),
    tag = "approvals"
)]
pub async fn approve_step(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    CallerRole(role): CallerRole,
    Path(approval_id): Path<Uuid>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<ApprovalView>, ApiError> {
    let Json(request) = payload?;
    let view = state
        .workflow
        .approve(
            approval_id,
            request.step_number,
            request.actor_id,
            role,
            request.comment.as_deref(),
        )
        .await?;
    Ok(Json(view))
}

/// Reject the lowest pending step; the approval becomes REJECTED
#[utoipa::path(
    post,
    path = "/approvals/{approval_id}/reject",
    security(("bearer_auth" = [])),
    params(("approval_id" = Uuid, Path, description = "Approval id"), RoleHeader),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Step rejected", body = ApprovalView),
        (status = 400, description = "Comment missing", body = ApiError),
        (status = 403, description = "Caller role does not match the step", body = ApiError),
        (status = 409, description = "Step out of order or already resolved", body = ApiError)
    ),
    tag = "approvals"
)]
pub async fn reject_step(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    CallerRole(role): CallerRole,
    Path(approval_id): Path<Uuid>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<ApprovalView>, ApiError> {
    let Json(request) = payload?;
    let comment = request.comment.unwrap_or_default();
    let view = state
        .workflow
        .reject(
            approval_id,
            request.step_number,
            request.actor_id,
            role,
            &comment,
        )
        .await?;
    Ok(Json(view))
}
