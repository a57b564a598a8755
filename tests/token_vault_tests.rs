//! Integration tests for the token vault: OAuth linking, refresh policy and lifecycle.

use std::sync::Arc;

use adgate::config::TokenVaultConfig;
use adgate::crypto::is_encrypted_payload;
use adgate::error::GovernanceError;
use adgate::models::linked_credential::{CredentialStatus, PrincipalKind};
use adgate::platform::OAuthTokens;
use adgate::repositories::CredentialRepository;
use adgate::token_vault::TokenVault;
use chrono::{Duration, Utc};
use sea_orm::DatabaseConnection;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{FakePlatform, RefreshBehavior, build_vault, build_vault_with, link_credential};

const REDIRECT: &str = "https://app.example.com/ads/callback";

async fn setup() -> (TokenVault, Arc<FakePlatform>, Arc<DatabaseConnection>) {
    let db = test_utils::setup_test_db_arc().await.unwrap();
    let platform = Arc::new(FakePlatform::default());
    (build_vault(db.clone(), platform.clone()), platform, db)
}

#[tokio::test]
async fn link_flow_stores_a_connected_credential() {
    let (vault, _platform, _db) = setup().await;
    let admin = Uuid::new_v4();

    let started = vault
        .begin_link(admin, PrincipalKind::Manager, REDIRECT)
        .await
        .unwrap();
    assert!(started.expires_at > Utc::now());
    assert!(
        started
            .authorize_url
            .query_pairs()
            .any(|(key, value)| key == "state" && value == started.state.as_str())
    );

    let summary = vault
        .complete_link(&started.state, "good", Some("999-888-7777".to_string()))
        .await
        .unwrap();
    assert_eq!(summary.principal_id, admin);
    assert_eq!(summary.status, CredentialStatus::Connected);
    assert_eq!(summary.login_customer_id.as_deref(), Some("999-888-7777"));
    // First manager credential is primary.
    assert!(summary.is_primary);

    let credential = vault.get_valid_credential(admin).await.unwrap();
    assert_eq!(credential.access_token.expose(), "access-good");
}

#[tokio::test]
async fn oauth_state_is_single_use() {
    let (vault, _platform, _db) = setup().await;
    let started = vault
        .begin_link(Uuid::new_v4(), PrincipalKind::Tenant, REDIRECT)
        .await
        .unwrap();

    vault
        .complete_link(&started.state, "good", None)
        .await
        .unwrap();
    let err = vault
        .complete_link(&started.state, "good", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidOAuthState));

    let err = vault
        .complete_link("never-issued", "good", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidOAuthState));
}

#[tokio::test]
async fn rejected_code_and_bad_redirect_fail_cleanly() {
    let (vault, _platform, _db) = setup().await;
    let principal = Uuid::new_v4();

    let err = vault
        .begin_link(principal, PrincipalKind::Tenant, "not a url")
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidGrant(_)));

    let started = vault
        .begin_link(principal, PrincipalKind::Tenant, REDIRECT)
        .await
        .unwrap();
    let err = vault
        .complete_link(&started.state, "bad-code", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::CredentialExpired { .. }));

    let started = vault
        .begin_link(principal, PrincipalKind::Tenant, REDIRECT)
        .await
        .unwrap();
    let err = vault
        .complete_link(&started.state, "down", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::CredentialUnavailable { .. }));

    assert!(matches!(
        vault.status(principal).await.unwrap_err(),
        GovernanceError::NotFound { .. }
    ));
}

#[tokio::test]
async fn tokens_are_encrypted_at_rest() {
    let (vault, _platform, db) = setup().await;
    let principal = Uuid::new_v4();
    link_credential(&vault, principal, PrincipalKind::Tenant, Duration::hours(1)).await;

    let row = CredentialRepository::new(db)
        .find_by_principal(principal)
        .await
        .unwrap()
        .unwrap();
    assert!(is_encrypted_payload(&row.access_token_ciphertext));
    let plaintext = format!("access-{principal}");
    assert!(
        !row.access_token_ciphertext
            .windows(plaintext.len())
            .any(|window| window == plaintext.as_bytes())
    );
    assert!(is_encrypted_payload(row.refresh_token_ciphertext.as_deref().unwrap()));
}

#[tokio::test]
async fn fresh_credential_is_served_without_refresh() {
    let (vault, platform, _db) = setup().await;
    let principal = Uuid::new_v4();
    link_credential(&vault, principal, PrincipalKind::Tenant, Duration::hours(1)).await;

    let credential = vault.get_valid_credential(principal).await.unwrap();
    assert_eq!(credential.access_token.expose(), format!("access-{principal}"));
    assert_eq!(platform.refresh_calls(), 0);
}

#[tokio::test]
async fn expiring_credential_is_refreshed_once() {
    let (vault, platform, _db) = setup().await;
    let principal = Uuid::new_v4();
    link_credential(&vault, principal, PrincipalKind::Tenant, Duration::minutes(2)).await;

    let refreshed = vault.get_valid_credential(principal).await.unwrap();
    assert!(refreshed.access_token.expose().starts_with("refreshed-1-"));
    assert!(refreshed.expires_at > Utc::now() + Duration::minutes(30));
    assert_eq!(platform.refresh_calls(), 1);

    let again = vault.get_valid_credential(principal).await.unwrap();
    assert_eq!(again.access_token.expose(), refreshed.access_token.expose());
    assert_eq!(platform.refresh_calls(), 1);

    // The refresh response carried no refresh token; the stored one still works.
    let summary = vault.status(principal).await.unwrap();
    assert_eq!(summary.status, CredentialStatus::Connected);
}

#[tokio::test]
async fn transient_failure_serves_unexpired_token() {
    let (vault, platform, _db) = setup().await;
    let principal = Uuid::new_v4();
    link_credential(&vault, principal, PrincipalKind::Tenant, Duration::minutes(2)).await;
    platform.set_refresh_behavior(RefreshBehavior::Unavailable);

    let credential = vault.get_valid_credential(principal).await.unwrap();
    assert_eq!(credential.access_token.expose(), format!("access-{principal}"));
    assert_eq!(
        vault.status(principal).await.unwrap().status,
        CredentialStatus::Connected
    );
}

#[tokio::test]
async fn transient_failure_on_expired_token_is_unavailable_but_stays_connected() {
    let (vault, platform, _db) = setup().await;
    let principal = Uuid::new_v4();
    link_credential(&vault, principal, PrincipalKind::Tenant, Duration::seconds(-30)).await;
    platform.set_refresh_behavior(RefreshBehavior::Unavailable);

    let err = vault.get_valid_credential(principal).await.unwrap_err();
    assert!(matches!(err, GovernanceError::CredentialUnavailable { .. }));
    assert_eq!(
        vault.status(principal).await.unwrap().status,
        CredentialStatus::Connected
    );

    // Platform recovers: the next read refreshes.
    platform.set_refresh_behavior(RefreshBehavior::Succeed);
    assert!(vault.get_valid_credential(principal).await.is_ok());
}

#[tokio::test]
async fn rejected_refresh_disconnects() {
    let (vault, platform, _db) = setup().await;
    let principal = Uuid::new_v4();
    link_credential(&vault, principal, PrincipalKind::Tenant, Duration::minutes(1)).await;
    platform.set_refresh_behavior(RefreshBehavior::Reject);

    let err = vault.refresh_if_expiring(principal).await.unwrap_err();
    assert!(matches!(err, GovernanceError::CredentialExpired { .. }));
    assert_eq!(
        vault.status(principal).await.unwrap().status,
        CredentialStatus::Disconnected
    );
}

#[tokio::test]
async fn disconnect_is_idempotent_and_relink_reconnects() {
    let (vault, _platform, _db) = setup().await;
    let principal = Uuid::new_v4();
    link_credential(&vault, principal, PrincipalKind::Tenant, Duration::hours(1)).await;

    let first = vault.disconnect(principal).await.unwrap();
    let second = vault.disconnect(principal).await.unwrap();
    assert_eq!(first.status, CredentialStatus::Disconnected);
    assert_eq!(second.status, CredentialStatus::Disconnected);
    assert!(matches!(
        vault.get_valid_credential(principal).await.unwrap_err(),
        GovernanceError::NotConnected { .. }
    ));

    link_credential(&vault, principal, PrincipalKind::Tenant, Duration::hours(1)).await;
    assert!(vault.get_valid_credential(principal).await.is_ok());
}

#[tokio::test]
async fn primary_manager_can_be_moved_but_not_to_a_tenant() {
    let (vault, _platform, _db) = setup().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let tenant = Uuid::new_v4();
    link_credential(&vault, first, PrincipalKind::Manager, Duration::hours(1)).await;
    link_credential(&vault, second, PrincipalKind::Manager, Duration::hours(1)).await;
    link_credential(&vault, tenant, PrincipalKind::Tenant, Duration::hours(1)).await;

    assert_eq!(vault.primary_manager().await.unwrap(), Some(first));
    assert!(!vault.status(second).await.unwrap().is_primary);

    let moved = vault.set_primary(second).await.unwrap();
    assert!(moved.is_primary);
    assert_eq!(vault.primary_manager().await.unwrap(), Some(second));
    assert!(!vault.status(first).await.unwrap().is_primary);

    assert!(matches!(
        vault.set_primary(tenant).await.unwrap_err(),
        GovernanceError::InvalidGrant(_)
    ));

    vault.disconnect(first).await.unwrap();
    assert!(matches!(
        vault.set_primary(first).await.unwrap_err(),
        GovernanceError::NotConnected { .. }
    ));
}

#[tokio::test]
async fn refresh_timeout_on_expired_token_is_unavailable() {
    let db = test_utils::setup_test_db_arc().await.unwrap();
    let platform = Arc::new(FakePlatform::default());
    let vault = build_vault_with(
        db,
        platform.clone(),
        TokenVaultConfig {
            refresh_timeout_ms: 50,
            ..TokenVaultConfig::default()
        },
    );
    let principal = Uuid::new_v4();
    link_credential(&vault, principal, PrincipalKind::Tenant, Duration::seconds(-30)).await;
    platform.set_refresh_behavior(RefreshBehavior::Stall(std::time::Duration::from_millis(300)));

    match vault.get_valid_credential(principal).await.unwrap_err() {
        GovernanceError::CredentialUnavailable { reason, .. } => {
            assert!(reason.contains("timed out"), "unexpected reason {reason}");
        }
        other => panic!("expected CredentialUnavailable, got {other:?}"),
    }
    // A slow platform is not a revoked grant.
    assert_eq!(
        vault.status(principal).await.unwrap().status,
        CredentialStatus::Connected
    );
}

#[tokio::test]
async fn refresh_that_loses_the_race_serves_the_winning_write() {
    let (vault, platform, _db) = setup().await;
    let principal = Uuid::new_v4();
    link_credential(&vault, principal, PrincipalKind::Tenant, Duration::minutes(1)).await;
    platform.set_refresh_behavior(RefreshBehavior::Stall(std::time::Duration::from_millis(300)));

    // The relink lands while the refresh call is still in flight.
    let relink = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        vault
            .upsert_credential(
                principal,
                PrincipalKind::Tenant,
                OAuthTokens {
                    access_token: "winner".to_string(),
                    refresh_token: Some("winner-refresh".to_string()),
                    expires_at: Utc::now() + Duration::hours(1),
                },
                None,
            )
            .await
    };
    let (served, relinked) = tokio::join!(vault.get_valid_credential(principal), relink);
    relinked.unwrap();

    let served = served.unwrap();
    assert_eq!(served.access_token.expose(), "winner");
    assert_eq!(platform.refresh_calls(), 1);

    // The refreshed token was discarded; the stored row is the relink.
    let again = vault.get_valid_credential(principal).await.unwrap();
    assert_eq!(again.access_token.expose(), "winner");
    assert_eq!(platform.refresh_calls(), 1);
}

#[tokio::test]
async fn disconnecting_the_primary_frees_the_flag_for_the_next_manager() {
    let (vault, _platform, _db) = setup().await;
    let first = Uuid::new_v4();
    let next = Uuid::new_v4();
    link_credential(&vault, first, PrincipalKind::Manager, Duration::hours(1)).await;
    assert_eq!(vault.primary_manager().await.unwrap(), Some(first));

    let summary = vault.disconnect(first).await.unwrap();
    assert!(!summary.is_primary);
    assert_eq!(vault.primary_manager().await.unwrap(), None);

    link_credential(&vault, next, PrincipalKind::Manager, Duration::hours(1)).await;
    assert_eq!(vault.primary_manager().await.unwrap(), Some(next));
    assert!(vault.status(next).await.unwrap().is_primary);
}
