//! # Token Vault
//!
//! One OAuth credential per linking principal, stored encrypted. Reads refresh transparently
//! when the token is inside the configured margin of its expiry. Refresh writes are
//! compare-and-set on the row's `updated_at`, so replicas racing on the same credential never
//! overwrite each other's tokens; the loser re-reads the winner's row.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use rand::Rng;
use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::TokenVaultConfig;
use crate::crypto::{CryptoKey, decrypt_token, encrypt_token};
use crate::error::GovernanceError;
use crate::models::linked_credential::{self, CredentialStatus, PrincipalKind};
use crate::platform::{AdsPlatform, OAuthTokens, PlatformError};
use crate::repositories::credential::{CredentialRepository, SealedTokens};
use crate::repositories::oauth_state::OAuthStateRepository;

const STATE_TOKEN_BYTES: usize = 32;

/// Decrypted access token. Zeroized on drop and redacted from debug output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// A usable credential handed to platform calls.
#[derive(Debug, Clone)]
pub struct Credential {
    pub principal_id: Uuid,
    pub principal_kind: PrincipalKind,
    pub access_token: AccessToken,
    pub expires_at: DateTime<Utc>,
    /// Manager customer id sent as the login header on hierarchy calls
    pub login_customer_id: Option<String>,
}

/// Credential metadata safe to return over the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CredentialSummary {
    pub principal_id: Uuid,
    pub principal_kind: PrincipalKind,
    pub status: CredentialStatus,
    pub is_primary: bool,
    pub login_customer_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&linked_credential::Model> for CredentialSummary {
    fn from(row: &linked_credential::Model) -> Self {
        Self {
            principal_id: row.principal_id,
            principal_kind: row.principal_kind,
            status: row.status,
            is_primary: row.is_primary,
            login_customer_id: row.login_customer_id.clone(),
            expires_at: row.expires_at,
            connected_at: row.connected_at,
            updated_at: row.updated_at,
        }
    }
}

/// Outcome of starting an OAuth link.
#[derive(Debug, Clone)]
pub struct LinkStart {
    pub authorize_url: Url,
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

/// Why a refresh attempt did not produce new tokens.
#[derive(Debug)]
enum RefreshFailure {
    /// The platform rejected the refresh token; retrying cannot help.
    Rejected(String),
    /// Network trouble, throttling or timeout.
    Transient(String),
}

#[derive(Clone)]
pub struct TokenVault {
    credentials: CredentialRepository,
    oauth_states: OAuthStateRepository,
    platform: Arc<dyn AdsPlatform>,
    crypto_key: CryptoKey,
    config: TokenVaultConfig,
}

impl TokenVault {
    pub fn new(
        credentials: CredentialRepository,
        oauth_states: OAuthStateRepository,
        platform: Arc<dyn AdsPlatform>,
        crypto_key: CryptoKey,
        config: TokenVaultConfig,
    ) -> Self {
        Self {
            credentials,
            oauth_states,
            platform,
            crypto_key,
            config,
        }
    }

    /// Return a credential that is valid for at least the refresh margin, refreshing first
    /// if needed.
    #[instrument(skip(self), fields(principal_id = %principal_id))]
    pub async fn get_valid_credential(
        &self,
        principal_id: Uuid,
    ) -> Result<Credential, GovernanceError> {
        let row = self.load_connected(principal_id).await?;
        self.ensure_fresh(row).await
    }

    /// Apply the refresh policy without handing out the token.
    pub async fn refresh_if_expiring(
        &self,
        principal_id: Uuid,
    ) -> Result<CredentialSummary, GovernanceError> {
        let row = self.load_connected(principal_id).await?;
        self.ensure_fresh(row).await?;
        self.status(principal_id).await
    }

    /// Store tokens for the principal, replacing any previous ones in place. The first
    /// manager credential linked becomes primary.
    #[instrument(skip(self, tokens), fields(principal_id = %principal_id))]
    pub async fn upsert_credential(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        tokens: OAuthTokens,
        login_customer_id: Option<String>,
    ) -> Result<CredentialSummary, GovernanceError> {
        let sealed = self.seal(principal_id, &tokens)?;
        let row = self
            .credentials
            .upsert(principal_id, kind, sealed, login_customer_id)
            .await?;

        if kind == PrincipalKind::Manager
            && !row.is_primary
            && self.credentials.claim_primary_if_unset(principal_id).await?
        {
            info!("Manager credential became primary");
        }

        info!(kind = ?kind, expires_at = %tokens.expires_at, "Credential stored");
        self.status(principal_id).await
    }

    /// Mark the credential disconnected. Idempotent.
    #[instrument(skip(self), fields(principal_id = %principal_id))]
    pub async fn disconnect(&self, principal_id: Uuid) -> Result<CredentialSummary, GovernanceError> {
        if self.credentials.mark_disconnected(principal_id).await? {
            info!("Credential disconnected");
        }
        self.status(principal_id).await
    }

    /// Make this principal's manager credential the primary one.
    #[instrument(skip(self), fields(principal_id = %principal_id))]
    pub async fn set_primary(&self, principal_id: Uuid) -> Result<CredentialSummary, GovernanceError> {
        let row = self.load_connected(principal_id).await?;
        if row.principal_kind != PrincipalKind::Manager {
            return Err(GovernanceError::InvalidGrant(
                "only manager credentials can be primary".to_string(),
            ));
        }
        if !self.credentials.set_primary(principal_id).await? {
            return Err(GovernanceError::NotConnected { principal_id });
        }
        info!("Primary manager credential changed");
        self.status(principal_id).await
    }

    /// Principal id of the primary manager credential, if one is flagged.
    pub async fn primary_manager(&self) -> Result<Option<Uuid>, GovernanceError> {
        Ok(self
            .credentials
            .find_primary_manager()
            .await?
            .map(|row| row.principal_id))
    }

    pub async fn status(&self, principal_id: Uuid) -> Result<CredentialSummary, GovernanceError> {
        self.credentials
            .find_by_principal(principal_id)
            .await?
            .map(|row| CredentialSummary::from(&row))
            .ok_or_else(|| GovernanceError::not_found("credential", principal_id))
    }

    /// Persist a single-use state token and build the consent URL.
    #[instrument(skip(self), fields(principal_id = %principal_id))]
    pub async fn begin_link(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        redirect_uri: &str,
    ) -> Result<LinkStart, GovernanceError> {
        let redirect = Url::parse(redirect_uri).map_err(|err| {
            GovernanceError::InvalidGrant(format!("invalid redirect_uri: {}", err))
        })?;

        let purged = self.oauth_states.purge_expired().await?;
        if purged > 0 {
            tracing::debug!(purged, "Expired OAuth states removed");
        }

        let state = generate_state_token();
        let stored = self
            .oauth_states
            .create(
                principal_id,
                kind,
                &state,
                redirect.as_str(),
                chrono::Duration::minutes(self.config.oauth_state_ttl_minutes),
            )
            .await?;

        let authorize_url = self
            .platform
            .authorize_url(&state, redirect.as_str())
            .map_err(|err| GovernanceError::CredentialUnavailable {
                principal_id,
                reason: err.to_string(),
            })?;

        Ok(LinkStart {
            authorize_url,
            state,
            expires_at: stored.expires_at,
        })
    }

    /// Consume the state, exchange the code and store the resulting credential.
    #[instrument(skip(self, state, code))]
    pub async fn complete_link(
        &self,
        state: &str,
        code: &str,
        login_customer_id: Option<String>,
    ) -> Result<CredentialSummary, GovernanceError> {
        let pending = self
            .oauth_states
            .consume(state)
            .await?
            .ok_or(GovernanceError::InvalidOAuthState)?;

        let exchange = tokio::time::timeout(
            self.config.refresh_timeout(),
            self.platform
                .exchange_authorization_code(code, &pending.redirect_uri),
        )
        .await;

        let tokens = match exchange {
            Ok(Ok(tokens)) => tokens,
            Ok(Err(PlatformError::AuthenticationFailed(reason))) => {
                warn!(principal_id = %pending.principal_id, %reason, "Authorization code rejected");
                return Err(GovernanceError::CredentialExpired {
                    principal_id: pending.principal_id,
                });
            }
            Ok(Err(err)) => {
                return Err(GovernanceError::CredentialUnavailable {
                    principal_id: pending.principal_id,
                    reason: err.to_string(),
                });
            }
            Err(_) => {
                return Err(GovernanceError::CredentialUnavailable {
                    principal_id: pending.principal_id,
                    reason: "authorization code exchange timed out".to_string(),
                });
            }
        };

        self.upsert_credential(
            pending.principal_id,
            pending.principal_kind,
            tokens,
            login_customer_id,
        )
        .await
    }

    async fn load_connected(
        &self,
        principal_id: Uuid,
    ) -> Result<linked_credential::Model, GovernanceError> {
        self.credentials
            .find_by_principal(principal_id)
            .await?
            .filter(linked_credential::Model::is_connected)
            .ok_or(GovernanceError::NotConnected { principal_id })
    }

    async fn ensure_fresh(
        &self,
        row: linked_credential::Model,
    ) -> Result<Credential, GovernanceError> {
        let now = Utc::now();
        if row.expires_at - now > self.config.refresh_margin() {
            return self.open(&row);
        }

        if row.refresh_token_ciphertext.is_none() && row.expires_at > now {
            warn!(principal_id = %row.principal_id, "No refresh token stored, serving token until expiry");
            return self.open(&row);
        }

        let principal_id = row.principal_id;
        match self.refresh(&row).await {
            Ok(credential) => {
                counter!("token_refresh_total", "outcome" => "success").increment(1);
                Ok(credential)
            }
            Err(RefreshFailure::Rejected(reason)) => {
                counter!("token_refresh_total", "outcome" => "rejected").increment(1);
                warn!(%reason, "Refresh rejected, disconnecting credential");
                self.credentials.mark_disconnected(principal_id).await?;
                Err(GovernanceError::CredentialExpired { principal_id })
            }
            Err(RefreshFailure::Transient(reason)) if row.expires_at > now => {
                counter!("token_refresh_total", "outcome" => "transient").increment(1);
                warn!(%reason, expires_at = %row.expires_at, "Refresh failed, serving stored token");
                self.open(&row)
            }
            Err(RefreshFailure::Transient(reason)) => {
                counter!("token_refresh_total", "outcome" => "transient").increment(1);
                warn!(%reason, "Refresh failed and stored token has expired");
                Err(GovernanceError::CredentialUnavailable {
                    principal_id,
                    reason,
                })
            }
        }
    }

    async fn refresh(
        &self,
        row: &linked_credential::Model,
    ) -> Result<Credential, RefreshFailure> {
        let Some(sealed_refresh) = row.refresh_token_ciphertext.as_deref() else {
            return Err(RefreshFailure::Rejected("no refresh token stored".to_string()));
        };
        let mut refresh_token = decrypt_token(&self.crypto_key, row.principal_id, sealed_refresh)
            .map_err(|err| RefreshFailure::Transient(err.to_string()))?;

        let outcome = tokio::time::timeout(
            self.config.refresh_timeout(),
            self.platform.refresh_access_token(&refresh_token),
        )
        .await;
        refresh_token.zeroize();

        let tokens = match outcome {
            Ok(Ok(tokens)) => tokens,
            Ok(Err(PlatformError::AuthenticationFailed(reason))) => {
                return Err(RefreshFailure::Rejected(reason));
            }
            Ok(Err(err)) => return Err(RefreshFailure::Transient(err.to_string())),
            Err(_) => return Err(RefreshFailure::Transient("refresh timed out".to_string())),
        };

        let sealed = self
            .seal(row.principal_id, &tokens)
            .map_err(|err| RefreshFailure::Transient(err.to_string()))?;

        let written = self
            .credentials
            .update_tokens_if_unchanged(row.principal_id, row.updated_at, sealed)
            .await
            .map_err(|err| RefreshFailure::Transient(err.to_string()))?;

        if written {
            info!(expires_at = %tokens.expires_at, "Credential refreshed");
            return Ok(Credential {
                principal_id: row.principal_id,
                principal_kind: row.principal_kind,
                access_token: AccessToken::new(tokens.access_token),
                expires_at: tokens.expires_at,
                login_customer_id: row.login_customer_id.clone(),
            });
        }

        // Another writer changed the row first; use whatever it stored.
        counter!("token_refresh_total", "outcome" => "lost_race").increment(1);
        let current = self
            .credentials
            .find_by_principal(row.principal_id)
            .await
            .map_err(|err| RefreshFailure::Transient(err.to_string()))?
            .filter(linked_credential::Model::is_connected)
            .ok_or_else(|| {
                RefreshFailure::Rejected("credential disconnected by a concurrent writer".to_string())
            })?;
        self.open(&current)
            .map_err(|err| RefreshFailure::Transient(err.to_string()))
    }

    fn open(&self, row: &linked_credential::Model) -> Result<Credential, GovernanceError> {
        let access = decrypt_token(&self.crypto_key, row.principal_id, &row.access_token_ciphertext)?;
        Ok(Credential {
            principal_id: row.principal_id,
            principal_kind: row.principal_kind,
            access_token: AccessToken::new(access),
            expires_at: row.expires_at,
            login_customer_id: row.login_customer_id.clone(),
        })
    }

    fn seal(&self, principal_id: Uuid, tokens: &OAuthTokens) -> Result<SealedTokens, GovernanceError> {
        let access_token_ciphertext =
            encrypt_token(&self.crypto_key, principal_id, &tokens.access_token)?;
        let refresh_token_ciphertext = tokens
            .refresh_token
            .as_deref()
            .map(|token| encrypt_token(&self.crypto_key, principal_id, token))
            .transpose()?;
        Ok(SealedTokens {
            access_token_ciphertext,
            refresh_token_ciphertext,
            expires_at: tokens.expires_at,
        })
    }
}

fn generate_state_token() -> String {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    base64_url::encode(&bytes)
}
