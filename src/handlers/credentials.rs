//! # Credential Handlers
//!
//! OAuth linking of manager and tenant credentials, plus status and lifecycle endpoints.
//! Token material never leaves the vault through these routes.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::models::linked_credential::PrincipalKind;
use crate::server::AppState;
use crate::token_vault::CredentialSummary;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectRequest {
    /// Principal that will own the credential (administrator id, or tenant id for a
    /// standalone link)
    pub principal_id: Uuid,
    pub principal_kind: PrincipalKind,
    /// Where the platform sends the user back with `code` and `state`
    #[schema(example = "https://app.example.com/ads/callback")]
    pub redirect_uri: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectResponse {
    pub authorize_url: String,
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackRequest {
    pub state: String,
    pub code: String,
    /// Manager customer id used as the login header for hierarchy calls
    #[serde(default)]
    pub login_customer_id: Option<String>,
}

/// Start linking a credential
#[utoipa::path(
    post,
    path = "/credentials/connect",
    security(("bearer_auth" = [])),
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "Consent URL issued", body = ConnectResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn connect(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let Json(request) = payload?;
    let started = state
        .vault
        .begin_link(
            request.principal_id,
            request.principal_kind,
            &request.redirect_uri,
        )
        .await?;

    Ok(Json(ConnectResponse {
        authorize_url: started.authorize_url.to_string(),
        state: started.state,
        expires_at: started.expires_at,
    }))
}

/// Finish linking: consume the state and exchange the authorization code
#[utoipa::path(
    post,
    path = "/credentials/callback",
    security(("bearer_auth" = [])),
    request_body = CallbackRequest,
    responses(
        (status = 200, description = "Credential stored", body = CredentialSummary),
        (status = 400, description = "Unknown, reused or expired state", body = ApiError),
        (status = 409, description = "Authorization code rejected", body = ApiError),
        (status = 503, description = "Platform unavailable", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn callback(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> Result<Json<CredentialSummary>, ApiError> {
    let Json(request) = payload?;
    let summary = state
        .vault
        .complete_link(
            &request.state,
            &request.code,
            request
                .login_customer_id
                .filter(|login| !login.trim().is_empty()),
        )
        .await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/credentials/{principal_id}",
    security(("bearer_auth" = [])),
    params(("principal_id" = Uuid, Path, description = "Credential owner")),
    responses(
        (status = 200, description = "Credential status", body = CredentialSummary),
        (status = 404, description = "No credential for principal", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn get_credential(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(principal_id): Path<Uuid>,
) -> Result<Json<CredentialSummary>, ApiError> {
    Ok(Json(state.vault.status(principal_id).await?))
}

/// Refresh the credential if it is within the refresh margin of expiry
#[utoipa::path(
    post,
    path = "/credentials/{principal_id}/refresh",
    security(("bearer_auth" = [])),
    params(("principal_id" = Uuid, Path, description = "Credential owner")),
    responses(
        (status = 200, description = "Credential valid", body = CredentialSummary),
        (status = 409, description = "Not connected or rejected by the platform", body = ApiError),
        (status = 503, description = "Refresh failed and token expired", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn refresh_credential(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(principal_id): Path<Uuid>,
) -> Result<Json<CredentialSummary>, ApiError> {
    Ok(Json(state.vault.refresh_if_expiring(principal_id).await?))
}

#[utoipa::path(
    post,
    path = "/credentials/{principal_id}/disconnect",
    security(("bearer_auth" = [])),
    params(("principal_id" = Uuid, Path, description = "Credential owner")),
    responses(
        (status = 200, description = "Credential disconnected", body = CredentialSummary),
        (status = 404, description = "No credential for principal", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn disconnect_credential(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(principal_id): Path<Uuid>,
) -> Result<Json<CredentialSummary>, ApiError> {
    Ok(Json(state.vault.disconnect(principal_id).await?))
}

/// Make this manager credential the primary fallback for grants without a recorded manager
#[utoipa::path(
    post,
    path = "/credentials/{principal_id}/primary",
    security(("bearer_auth" = [])),
    params(("principal_id" = Uuid, Path, description = "Manager principal")),
    responses(
        (status = 200, description = "Primary credential updated", body = CredentialSummary),
        (status = 400, description = "Credential is not a manager credential", body = ApiError),
        (status = 409, description = "Credential not connected", body = ApiError)
    ),
    tag = "credentials"
)]
pub async fn set_primary_credential(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(principal_id): Path<Uuid>,
) -> Result<Json<CredentialSummary>, ApiError> {
    Ok(Json(state.vault.set_primary(principal_id).await?))
}
