//! Test utilities for database and platform fakes.
//!
//! Suites include this module with `#[path = "test_utils/mod.rs"] mod test_utils;` and use
//! only the helpers they need.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use adgate::config::{AppConfig, TokenVaultConfig};
use adgate::crypto::CryptoKey;
use adgate::models::linked_credential::PrincipalKind;
use adgate::notify::{GovernanceEvent, Notifier};
use adgate::platform::{AdsPlatform, AdvertiserAccount, OAuthTokens, PlatformError};
use adgate::repositories::{CredentialRepository, OAuthStateRepository};
use adgate::server::AppState;
use adgate::token_vault::{Credential, TokenVault};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use url::Url;
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Sets up an in-memory SQLite database with all migrations applied and returns an Arc.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![0u8; 32]).expect("valid test key")
}

/// How the fake answers token refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshBehavior {
    /// Issue a fresh token valid for an hour
    Succeed,
    /// `invalid_grant`: the refresh token is revoked
    Reject,
    /// Platform down
    Unavailable,
    /// Answer like `Succeed`, but only after sleeping this long
    Stall(std::time::Duration),
}

/// In-memory platform with scripted answers.
pub struct FakePlatform {
    pub refresh_behavior: Mutex<RefreshBehavior>,
    pub refresh_calls: AtomicUsize,
    pub accounts: Mutex<Vec<AdvertiserAccount>>,
    pub listing_error: Mutex<Option<PlatformError>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            refresh_behavior: Mutex::new(RefreshBehavior::Succeed),
            refresh_calls: AtomicUsize::new(0),
            accounts: Mutex::new(Vec::new()),
            listing_error: Mutex::new(None),
        }
    }
}

impl FakePlatform {
    pub fn set_refresh_behavior(&self, behavior: RefreshBehavior) {
        *self.refresh_behavior.lock().unwrap() = behavior;
    }

    pub fn set_accounts(&self, accounts: Vec<AdvertiserAccount>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    pub fn fail_listing(&self, error: PlatformError) {
        *self.listing_error.lock().unwrap() = Some(error);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdsPlatform for FakePlatform {
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<Url, PlatformError> {
        let mut url = Url::parse("https://ads.example.test/o/oauth2/auth")
            .map_err(|err| PlatformError::Configuration(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("state", state)
            .append_pair("redirect_uri", redirect_uri);
        Ok(url)
    }

    async fn exchange_authorization_code(
        &self,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<OAuthTokens, PlatformError> {
        match code {
            "bad-code" => Err(PlatformError::AuthenticationFailed("invalid_grant".to_string())),
            "down" => Err(PlatformError::Unavailable("503".to_string())),
            _ => Ok(OAuthTokens {
                access_token: format!("access-{code}"),
                refresh_token: Some(format!("refresh-{code}")),
                expires_at: Utc::now() + Duration::hours(1),
            }),
        }
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<OAuthTokens, PlatformError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = *self.refresh_behavior.lock().unwrap();
        if let RefreshBehavior::Stall(delay) = behavior {
            tokio::time::sleep(delay).await;
        }
        match behavior {
            RefreshBehavior::Succeed | RefreshBehavior::Stall(_) => Ok(OAuthTokens {
                access_token: format!("refreshed-{call}-{refresh_token}"),
                refresh_token: None,
                expires_at: Utc::now() + Duration::hours(1),
            }),
            RefreshBehavior::Reject => Err(PlatformError::AuthenticationFailed(
                "invalid_grant".to_string(),
            )),
            RefreshBehavior::Unavailable => {
                Err(PlatformError::Unavailable("platform down".to_string()))
            }
        }
    }

    async fn list_sub_accounts(
        &self,
        _credential: &Credential,
    ) -> Result<Vec<AdvertiserAccount>, PlatformError> {
        if let Some(err) = self.listing_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn describe_account(
        &self,
        _credential: &Credential,
        account_id: &str,
    ) -> Result<AdvertiserAccount, PlatformError> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|account| account.id == account_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(account_id.to_string()))
    }
}

pub fn account(id: &str, is_manager: bool) -> AdvertiserAccount {
    AdvertiserAccount {
        id: id.to_string(),
        display_name: format!("Account {id}"),
        currency: "USD".to_string(),
        is_manager,
    }
}

/// Records every event instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<GovernanceEvent>>,
}

impl RecordingNotifier {
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|event| event.name()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: GovernanceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn build_vault(db: Arc<DatabaseConnection>, platform: Arc<FakePlatform>) -> TokenVault {
    build_vault_with(db, platform, TokenVaultConfig::default())
}

pub fn build_vault_with(
    db: Arc<DatabaseConnection>,
    platform: Arc<FakePlatform>,
    config: TokenVaultConfig,
) -> TokenVault {
    TokenVault::new(
        CredentialRepository::new(db.clone()),
        OAuthStateRepository::new(db),
        platform,
        test_crypto_key(),
        config,
    )
}

/// Stores a connected credential expiring `expires_in` from now.
pub async fn link_credential(
    vault: &TokenVault,
    principal_id: Uuid,
    kind: PrincipalKind,
    expires_in: Duration,
) -> Uuid {
    vault
        .upsert_credential(
            principal_id,
            kind,
            OAuthTokens {
                access_token: format!("access-{principal_id}"),
                refresh_token: Some(format!("refresh-{principal_id}")),
                expires_at: Utc::now() + expires_in,
            },
            None,
        )
        .await
        .expect("credential stored");
    principal_id
}

pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec!["test-operator-token".to_string()],
        crypto_key: Some(vec![0u8; 32]),
        ..AppConfig::default()
    }
}

/// Full application state over in-memory SQLite and the fake platform.
pub async fn test_state(
    platform: Arc<FakePlatform>,
    notifier: Arc<RecordingNotifier>,
) -> AppState {
    let db = setup_test_db_arc().await.expect("test database");
    AppState::new(
        Arc::new(test_config()),
        db,
        test_crypto_key(),
        platform,
        notifier,
    )
}
