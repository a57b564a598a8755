//! # Directory Handlers
//!
//! Administrative listing of advertiser accounts reachable through a linked credential,
//! used when choosing accounts to grant.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::platform::AdvertiserAccount;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountsResponse {
    pub principal_id: Uuid,
    pub accounts: Vec<AdvertiserAccount>,
}

#[utoipa::path(
    get,
    path = "/directory/{principal_id}/accounts",
    security(("bearer_auth" = [])),
    params(("principal_id" = Uuid, Path, description = "Principal whose credential is used")),
    responses(
        (status = 200, description = "Leaf advertiser accounts, sorted by id", body = AccountsResponse),
        (status = 409, description = "Credential not connected or rejected", body = ApiError),
        (status = 502, description = "Platform unreachable; retry later", body = ApiError)
    ),
    tag = "directory"
)]
pub async fn list_accounts(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(principal_id): Path<Uuid>,
) -> Result<Json<AccountsResponse>, ApiError> {
    let accounts = state.directory.list_for_principal(principal_id).await?;
    Ok(Json(AccountsResponse {
        principal_id,
        accounts,
    }))
}

#[utoipa::path(
    get,
    path = "/directory/{principal_id}/accounts/{account_id}",
    security(("bearer_auth" = [])),
    params(
        ("principal_id" = Uuid, Path, description = "Principal whose credential is used"),
        ("account_id" = String, Path, description = "Advertiser account id")
    ),
    responses(
        (status = 200, description = "Account details", body = AdvertiserAccount),
        (status = 404, description = "Unknown account", body = ApiError),
        (status = 502, description = "Platform unreachable; retry later", body = ApiError)
    ),
    tag = "directory"
)]
pub async fn describe_account(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path((principal_id, account_id)): Path<(Uuid, String)>,
) -> Result<Json<AdvertiserAccount>, ApiError> {
    Ok(Json(
        state
            .directory
            .describe_for_principal(principal_id, &account_id)
            .await?,
    ))
}
