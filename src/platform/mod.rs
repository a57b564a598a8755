//! Advertising platform client seam.
//!
//! The governance core only needs the OAuth code exchange, token refresh and the manager
//! hierarchy listing. Campaign mutations are pushed by callers outside this crate once an
//! approval reaches `APPROVED`.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

use crate::token_vault::Credential;

pub mod http;

pub use http::HttpAdsPlatform;

/// Advertiser account as reported by the platform. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdvertiserAccount {
    /// External account identifier
    #[schema(example = "123-456-7890")]
    pub id: String,
    pub display_name: String,
    #[schema(example = "USD")]
    pub currency: String,
    /// Manager nodes are excluded from leaf-level grants
    pub is_manager: bool,
}

/// Token pair returned by the platform's OAuth endpoints.
#[derive(Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    /// Some platforms omit the refresh token on refresh responses; the stored one is kept.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// Credential rejected: revoked, expired refresh token, or invalid client
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    /// Network failure or platform-side 5xx
    #[error("platform unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected platform response: {0}")]
    InvalidResponse(String),
    #[error("platform client misconfigured: {0}")]
    Configuration(String),
}

impl PlatformError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::RateLimited { .. } | PlatformError::Unavailable(_)
        )
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PlatformError::InvalidResponse(err.to_string())
        } else {
            PlatformError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
pub trait AdsPlatform: Send + Sync {
    /// Consent URL the linking principal is redirected to.
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<Url, PlatformError>;

    async fn exchange_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokens, PlatformError>;

    async fn refresh_access_token(&self, refresh_token: &str)
    -> Result<OAuthTokens, PlatformError>;

    /// Every account under the credential's hierarchy, manager nodes included.
    async fn list_sub_accounts(
        &self,
        credential: &Credential,
    ) -> Result<Vec<AdvertiserAccount>, PlatformError>;

    async fn describe_account(
        &self,
        credential: &Credential,
        account_id: &str,
    ) -> Result<AdvertiserAccount, PlatformError>;
}
