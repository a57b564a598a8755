//! # Access Handlers
//!
//! Decision endpoints for the host application. A denial is a normal answer and comes back
//! as 200 with `allowed: false`; only infrastructure failures produce error statuses.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::{AccessDecision, CredentialSource, DenialReason, ReleaseDecision, ResolvedAccess};
use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::ApiError;
use crate::models::permission_grant::{Capability, CapabilitySet};
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    pub advertiser_account_id: String,
    pub capability: Capability,
}

/// Credential and capability details of an allowed decision. Token material is not included.
#[derive(Debug, Serialize, ToSchema)]
pub struct GrantedAccess {
    pub advertiser_account_id: String,
    pub capabilities: CapabilitySet,
    pub credential_source: CredentialSource,
    pub principal_id: Uuid,
}

impl From<&ResolvedAccess> for GrantedAccess {
    fn from(access: &ResolvedAccess) -> Self {
        Self {
            advertiser_account_id: access.advertiser_account_id.clone(),
            capabilities: access.capabilities,
            credential_source: access.credential_source,
            principal_id: access.principal_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizeResponse {
    pub tenant_id: Uuid,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<GrantedAccess>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialReason>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReleaseCheckRequest {
    pub advertiser_account_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReleaseCheckResponse {
    pub tenant_id: Uuid,
    pub campaign_id: String,
    pub release: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<GrantedAccess>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialReason>,
}

/// Decide whether the tenant may perform an operation needing `capability` on the account
#[utoipa::path(
    post,
    path = "/access/authorize",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Access decision", body = AuthorizeResponse),
        (status = 400, description = "Missing tenant header or invalid body", body = ApiError)
    ),
    tag = "access"
)]
pub async fn authorize(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    payload: Result<Json<AuthorizeRequest>, JsonRejection>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    let Json(request) = payload?;
    let decision = state
        .access
        .authorize(tenant.0, &request.advertiser_account_id, request.capability)
        .await?;

    let response = match &decision {
        AccessDecision::Allowed(access) => AuthorizeResponse {
            tenant_id: tenant.0,
            allowed: true,
            access: Some(access.into()),
            denial: None,
        },
        AccessDecision::Denied(reason) => AuthorizeResponse {
            tenant_id: tenant.0,
            allowed: false,
            access: None,
            denial: Some(reason.clone()),
        },
    };
    Ok(Json(response))
}

/// Pre-push check for a governed campaign: write access plus an approved workflow
#[utoipa::path(
    post,
    path = "/campaigns/{campaign_id}/release-check",
    security(("bearer_auth" = [])),
    params(
        ("campaign_id" = String, Path, description = "Host application campaign id"),
        TenantHeader
    ),
    request_body = ReleaseCheckRequest,
    responses(
        (status = 200, description = "Release decision", body = ReleaseCheckResponse),
        (status = 400, description = "Missing tenant header or invalid body", body = ApiError)
    ),
    tag = "access"
)]
pub async fn release_check(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(campaign_id): Path<String>,
    payload: Result<Json<ReleaseCheckRequest>, JsonRejection>,
) -> Result<Json<ReleaseCheckResponse>, ApiError> {
    let Json(request) = payload?;
    let decision = state
        .access
        .check_release(tenant.0, &request.advertiser_account_id, &campaign_id)
        .await?;

    let response = match decision {
        ReleaseDecision::Release {
            access,
            approval_id,
        } => ReleaseCheckResponse {
            tenant_id: tenant.0,
            campaign_id,
            release: true,
            approval_id: Some(approval_id),
            access: Some((&access).into()),
            denial: None,
        },
        ReleaseDecision::Denied(reason) => ReleaseCheckResponse {
            tenant_id: tenant.0,
            campaign_id,
            release: false,
            approval_id: None,
            access: None,
            denial: Some(reason),
        },
    };
    Ok(Json(response))
}
