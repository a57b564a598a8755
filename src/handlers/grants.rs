//! # Grant Handlers

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::ApiError;
use crate::models::grant_history::{self, GrantAction};
use crate::models::permission_grant::{self, CapabilitySet};
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantRequest {
    pub tenant_id: Uuid,
    #[schema(example = "123-456-7890")]
    pub advertiser_account_id: String,
    /// Replaces the pair's capability set as a whole
    pub capabilities: CapabilitySet,
    /// Manager credential owning the account's hierarchy
    #[serde(default)]
    pub manager_principal_id: Option<Uuid>,
    /// Administrator performing the change, recorded in the ledger
    #[serde(default)]
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GrantResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub advertiser_account_id: String,
    pub capabilities: CapabilitySet,
    pub active: bool,
    pub manager_principal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<permission_grant::Model> for GrantResponse {
    fn from(model: permission_grant::Model) -> Self {
        Self {
            capabilities: model.capabilities(),
            id: model.id,
            tenant_id: model.tenant_id,
            advertiser_account_id: model.advertiser_account_id,
            active: model.active,
            manager_principal_id: model.manager_principal_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GrantsResponse {
    pub tenant_id: Uuid,
    pub grants: Vec<GrantResponse>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RevokeQuery {
    /// Administrator performing the revocation
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeResponse {
    pub advertiser_account_id: String,
    /// Grants flipped to inactive by this call; 0 when nothing was active
    pub deactivated: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GrantHistoryEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub advertiser_account_id: String,
    pub action: GrantAction,
    pub capabilities: CapabilitySet,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<grant_history::Model> for GrantHistoryEntry {
    fn from(model: grant_history::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            advertiser_account_id: model.advertiser_account_id,
            action: model.action,
            capabilities: CapabilitySet {
                read: model.can_read,
                write: model.can_write,
                admin: model.can_admin,
            },
            actor_id: model.actor_id,
            created_at: model.created_at,
        }
    }
}

/// Create or replace the grant for a (tenant, advertiser account) pair
#[utoipa::path(
    post,
    path = "/grants",
    security(("bearer_auth" = [])),
    request_body = GrantRequest,
    responses(
        (status = 200, description = "Grant stored and active", body = GrantResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "grants"
)]
pub async fn create_grant(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<GrantRequest>, JsonRejection>,
) -> Result<Json<GrantResponse>, ApiError> {
    let Json(request) = payload?;
    let grant = state
        .grants
        .grant(
            request.tenant_id,
            &request.advertiser_account_id,
            request.capabilities,
            request.manager_principal_id,
            request.actor_id,
        )
        .await?;
    Ok(Json(grant.into()))
}

/// Active grants of the tenant in `X-Tenant-Id`
#[utoipa::path(
    get,
    path = "/grants",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "Active grants", body = GrantsResponse),
        (status = 400, description = "Missing or invalid tenant header", body = ApiError)
    ),
    tag = "grants"
)]
pub async fn list_grants(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
) -> Result<Json<GrantsResponse>, ApiError> {
    let grants = state.grants.list_active_grants(tenant.0).await?;
    Ok(Json(GrantsResponse {
        tenant_id: tenant.0,
        grants: grants.into_iter().map(GrantResponse::from).collect(),
    }))
}

/// Deactivate every tenant's grant to the advertiser account
///
/// Revocation is keyed by account only: unlinking an account removes access for all tenants.
#[utoipa::path(
    post,
    path = "/grants/{advertiser_account_id}/revoke",
    security(("bearer_auth" = [])),
    params(
        ("advertiser_account_id" = String, Path, description = "Advertiser account id"),
        RevokeQuery
    ),
    responses(
        (status = 200, description = "Number of grants deactivated", body = RevokeResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "grants"
)]
pub async fn revoke_grants(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(advertiser_account_id): Path<String>,
    Query(query): Query<RevokeQuery>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let deactivated = state
        .grants
        .revoke(&advertiser_account_id, query.actor_id)
        .await?;
    Ok(Json(RevokeResponse {
        advertiser_account_id,
        deactivated,
    }))
}

#[utoipa::path(
    get,
    path = "/grants/{advertiser_account_id}/history",
    security(("bearer_auth" = [])),
    params(("advertiser_account_id" = String, Path, description = "Advertiser account id")),
    responses(
        (status = 200, description = "Grant ledger, oldest first", body = [GrantHistoryEntry])
    ),
    tag = "grants"
)]
pub async fn grant_history(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(advertiser_account_id): Path<String>,
) -> Result<Json<Vec<GrantHistoryEntry>>, ApiError> {
    let entries = state
        .history
        .grant_history(advertiser_account_id.trim())
        .await?;
    Ok(Json(entries.into_iter().map(GrantHistoryEntry::from).collect()))
}
