//! # Authentication and Caller Context
//!
//! The calling application authenticates with an operator bearer token. Identity is not
//! issued here: the caller forwards the acting tenant (`X-Tenant-Id`) and, for approval
//! decisions, the acting user's role (`X-User-Role`). Both are trusted as given.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, unauthorized_with_trace_id, validation_error};
use crate::models::approval_step::ApproverRole;
use crate::server::AppState;
use crate::telemetry::TraceContext;

pub const TENANT_HEADER: &str = "X-Tenant-Id";
pub const ROLE_HEADER: &str = "X-User-Role";

/// Tenant ID wrapper for type safety
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantId(pub Uuid);

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

/// Tenant the request acts for; rejected with 400 when the header was absent
#[derive(Debug, Clone, Copy)]
pub struct TenantExtension(pub TenantId);

/// Role the acting user holds in the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerRole(pub ApproverRole);

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Validates the operator bearer token and records the tenant header when present
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let headers = request.headers();
    let token = extract_bearer_token(headers, trace_id.as_deref())?;
    validate_token(&config, token, trace_id.as_deref())?;

    let tenant = extract_tenant_id(headers)?;
    match tenant {
        Some(tenant) => {
            tracing::debug!(tenant_id = %tenant.0, "Authenticated operator request");
            request.extensions_mut().insert(TenantExtension(tenant));
        }
        None => tracing::debug!("Authenticated operator request without tenant context"),
    }
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn reject(message: &str, trace_id: Option<&str>) -> ApiError {
    match trace_id {
        Some(trace_id) => unauthorized_with_trace_id(Some(message), trace_id.to_string()),
        None => unauthorized(Some(message)),
    }
}

fn extract_bearer_token<'a>(
    headers: &'a HeaderMap,
    trace_id: Option<&str>,
) -> Result<&'a str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| reject("Missing Authorization header", trace_id))?;
    let header = value
        .to_str()
        .map_err(|_| reject("Invalid Authorization header", trace_id))?;
    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| reject("Authorization header must use Bearer scheme", trace_id))
}

fn validate_token(config: &AppConfig, token: &str, trace_id: Option<&str>) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(reject("Invalid bearer token", trace_id))
    }
}

fn extract_tenant_id(headers: &HeaderMap) -> Result<Option<TenantId>, ApiError> {
    let Some(value) = headers.get(TENANT_HEADER) else {
        return Ok(None);
    };

    let raw = value.to_str().map_err(|_| {
        validation_error(
            "Invalid tenant header",
            serde_json::json!({ TENANT_HEADER: "Header must be valid UTF-8" }),
        )
    })?;

    raw.trim().parse::<Uuid>().map(|id| Some(TenantId(id))).map_err(|_| {
        validation_error(
            "Invalid tenant ID",
            serde_json::json!({ TENANT_HEADER: "Must be a valid UUID" }),
        )
    })
}

/// OpenAPI header parameter for X-Tenant-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct TenantHeader {
    /// Tenant identifier (UUID) that scopes the request to a specific tenant
    #[serde(rename = "X-Tenant-Id")]
    #[param(rename = "X-Tenant-Id", value_type = String)]
    pub tenant_id: String,
}

/// OpenAPI header parameter for X-User-Role
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct RoleHeader {
    /// Role of the acting user: ADMIN, ACCOUNT_MANAGER or CLIENT
    #[serde(rename = "X-User-Role")]
    #[param(rename = "X-User-Role", value_type = String)]
    pub role: String,
}

impl<S> FromRequestParts<S> for TenantExtension
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantExtension>()
            .copied()
            .ok_or_else(|| {
                validation_error(
                    "Missing required header",
                    serde_json::json!({ TENANT_HEADER: "Required header is missing" }),
                )
            })
    }
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}

impl<S> FromRequestParts<S> for CallerRole
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ROLE_HEADER)
            .ok_or_else(|| {
                validation_error(
                    "Missing required header",
                    serde_json::json!({ ROLE_HEADER: "Required header is missing" }),
                )
            })?
            .to_str()
            .map_err(|_| {
                validation_error(
                    "Invalid role header",
                    serde_json::json!({ ROLE_HEADER: "Header must be valid UTF-8" }),
                )
            })?;

        raw.parse::<ApproverRole>().map(CallerRole).map_err(|reason| {
            validation_error(
                "Invalid role",
                serde_json::json!({ ROLE_HEADER: reason }),
            )
        })
    }
}
