//! # Error Handling
//!
//! Domain errors raised by the governance core ([`GovernanceError`]) and the unified
//! problem+json response ([`ApiError`]) they are rendered as, with trace ID propagation.
//!
//! Authorization refusals are not errors: the access resolver returns them as
//! `AccessDecision::Denied` values.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::crypto::CryptoError;
use crate::models::approval_step::ApproverRole;
use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Trace ID of the active request, or a generated correlation ID outside one
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Errors raised by the governance core.
///
/// `AccountUnreachable` and `CredentialUnavailable` are transient and safe to retry with
/// backoff. Workflow-ordering errors are caller mistakes and must not be retried.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("step {requested} cannot be resolved before step {lowest_pending}")]
    StepOutOfOrder { requested: i32, lowest_pending: i32 },

    #[error("a non-empty comment is required to reject a step")]
    CommentRequired,

    #[error("approval {approval_id} is already resolved")]
    AlreadyResolved { approval_id: Uuid },

    #[error("step {step_number} requires role {required}, caller acts as {actual}")]
    RoleMismatch {
        step_number: i32,
        required: ApproverRole,
        actual: ApproverRole,
    },

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("invalid or expired OAuth state")]
    InvalidOAuthState,

    #[error("no connected credential for principal {principal_id}")]
    NotConnected { principal_id: Uuid },

    #[error("credential for principal {principal_id} was rejected by the platform")]
    CredentialExpired { principal_id: Uuid },

    #[error("credential for principal {principal_id} is unavailable: {reason}")]
    CredentialUnavailable { principal_id: Uuid, reason: String },

    #[error("advertiser account unreachable: {reason}")]
    AccountUnreachable {
        reason: String,
        retry_after_seconds: u64,
    },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("token encryption error: {0}")]
    Crypto(#[from] CryptoError),
}

impl GovernanceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        GovernanceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable code shared by logs, metrics labels and API responses
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::NotFound { .. } => "NOT_FOUND",
            GovernanceError::InvalidWorkflow(_) => "INVALID_WORKFLOW",
            GovernanceError::StepOutOfOrder { .. } => "STEP_OUT_OF_ORDER",
            GovernanceError::CommentRequired => "COMMENT_REQUIRED",
            GovernanceError::AlreadyResolved { .. } => "ALREADY_RESOLVED",
            GovernanceError::RoleMismatch { .. } => "ROLE_MISMATCH",
            GovernanceError::InvalidGrant(_) => "INVALID_GRANT",
            GovernanceError::InvalidOAuthState => "INVALID_OAUTH_STATE",
            GovernanceError::NotConnected { .. } => "CREDENTIAL_NOT_CONNECTED",
            GovernanceError::CredentialExpired { .. } => "CREDENTIAL_EXPIRED",
            GovernanceError::CredentialUnavailable { .. } => "CREDENTIAL_UNAVAILABLE",
            GovernanceError::AccountUnreachable { .. } => "ACCOUNT_UNREACHABLE",
            GovernanceError::Database(_) => "DATABASE_ERROR",
            GovernanceError::Crypto(_) => "CRYPTO_ERROR",
        }
    }
}

pub(crate) fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error.code().is_some_and(|code| {
        let code_str = code.as_ref();
        code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str)
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<GovernanceError> for ApiError {
    fn from(error: GovernanceError) -> Self {
        let code = error.code();
        let message = error.to_string();

        match error {
            GovernanceError::Database(db_err) => db_err.into(),
            GovernanceError::Crypto(crypto_err) => {
                tracing::error!(error = %crypto_err, "Token decryption failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred",
                )
            }
            GovernanceError::NotFound { entity, ref id } => {
                let details = json!({ "entity": entity, "id": id });
                Self::new(StatusCode::NOT_FOUND, code, message.as_str()).with_details(details)
            }
            GovernanceError::InvalidWorkflow(_)
            | GovernanceError::CommentRequired
            | GovernanceError::InvalidGrant(_)
            | GovernanceError::InvalidOAuthState => {
                Self::new(StatusCode::BAD_REQUEST, code, message.as_str())
            }
            GovernanceError::StepOutOfOrder {
                requested,
                lowest_pending,
            } => Self::new(StatusCode::CONFLICT, code, message.as_str()).with_details(json!({
                "requested_step": requested,
                "lowest_pending_step": lowest_pending,
            })),
            GovernanceError::AlreadyResolved { .. }
            | GovernanceError::NotConnected { .. }
            | GovernanceError::CredentialExpired { .. } => {
                Self::new(StatusCode::CONFLICT, code, message.as_str())
            }
            GovernanceError::RoleMismatch { required, .. } => {
                Self::new(StatusCode::FORBIDDEN, code, message.as_str())
                    .with_details(json!({ "required_role": required }))
            }
            GovernanceError::CredentialUnavailable { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message.as_str())
            }
            GovernanceError::AccountUnreachable {
                retry_after_seconds,
                ..
            } => Self::new(StatusCode::BAD_GATEWAY, code, message.as_str())
                .with_retry_after(retry_after_seconds),
        }
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create an unauthorized error (401) with explicit trace_id
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let mut error = unauthorized(message);
    error.trace_id = Some(trace_id.into_boxed_str());
    error
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}
