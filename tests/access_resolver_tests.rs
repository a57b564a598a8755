//! Integration tests for access decisions across grants, credentials and approvals.

use std::sync::Arc;

use adgate::access::{AccessDecision, CredentialSource, DenialReason, ReleaseDecision};
use adgate::error::GovernanceError;
use adgate::models::approval_step::ApproverRole;
use adgate::models::linked_credential::PrincipalKind;
use adgate::models::permission_grant::{Capability, CapabilitySet};
use adgate::server::AppState;
use chrono::Duration;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{FakePlatform, RecordingNotifier, RefreshBehavior, link_credential};

const ACCOUNT: &str = "111-222-3333";

fn caps(read: bool, write: bool, admin: bool) -> CapabilitySet {
    CapabilitySet { read, write, admin }
}

async fn setup() -> (AppState, Arc<FakePlatform>) {
    let platform = Arc::new(FakePlatform::default());
    let state = test_utils::test_state(platform.clone(), Arc::new(RecordingNotifier::default())).await;
    (state, platform)
}

#[tokio::test]
async fn read_grant_does_not_allow_write() {
    let (state, _platform) = setup().await;
    let tenant = Uuid::new_v4();
    link_credential(&state.vault, tenant, PrincipalKind::Tenant, Duration::hours(1)).await;
    state
        .grants
        .grant(tenant, ACCOUNT, caps(true, false, false), None, None)
        .await
        .unwrap();

    let decision = state
        .access
        .authorize(tenant, ACCOUNT, Capability::Write)
        .await
        .unwrap();
    assert_eq!(
        decision.denial(),
        Some(&DenialReason::CapabilityMissing {
            required: Capability::Write
        })
    );

    let read = state
        .access
        .authorize(tenant, ACCOUNT, Capability::Read)
        .await
        .unwrap();
    assert!(read.is_allowed());
}

#[tokio::test]
async fn admin_does_not_imply_write() {
    let (state, _platform) = setup().await;
    let tenant = Uuid::new_v4();
    link_credential(&state.vault, tenant, PrincipalKind::Tenant, Duration::hours(1)).await;
    state
        .grants
        .grant(tenant, ACCOUNT, caps(false, false, true), None, None)
        .await
        .unwrap();

    let decision = state
        .access
        .authorize(tenant, ACCOUNT, Capability::Write)
        .await
        .unwrap();
    assert!(!decision.is_allowed());
}

#[tokio::test]
async fn empty_grant_is_stored_but_allows_nothing() {
    let (state, _platform) = setup().await;
    let tenant = Uuid::new_v4();
    link_credential(&state.vault, tenant, PrincipalKind::Tenant, Duration::hours(1)).await;
    let grant = state
        .grants
        .grant(tenant, ACCOUNT, caps(false, false, false), None, None)
        .await
        .unwrap();
    assert!(grant.capabilities().is_empty());

    for required in [Capability::Read, Capability::Write, Capability::Admin] {
        let decision = state
            .access
            .authorize(tenant, ACCOUNT, required)
            .await
            .unwrap();
        assert_eq!(
            decision.denial(),
            Some(&DenialReason::CapabilityMissing { required })
        );
    }
}

#[tokio::test]
async fn missing_and_revoked_grants_are_denied() {
    let (state, _platform) = setup().await;
    let tenant = Uuid::new_v4();
    link_credential(&state.vault, tenant, PrincipalKind::Tenant, Duration::hours(1)).await;

    let decision = state
        .access
        .authorize(tenant, ACCOUNT, Capability::Read)
        .await
        .unwrap();
    assert_eq!(decision.denial(), Some(&DenialReason::NoGrant));

    state
        .grants
        .grant(tenant, ACCOUNT, caps(true, true, false), None, None)
        .await
        .unwrap();
    state.grants.revoke(ACCOUNT, None).await.unwrap();

    let decision = state
        .access
        .authorize(tenant, ACCOUNT, Capability::Read)
        .await
        .unwrap();
    assert_eq!(decision.denial(), Some(&DenialReason::GrantInactive));
}

#[tokio::test]
async fn tenant_credential_is_preferred_over_manager() {
    let (state, _platform) = setup().await;
    let tenant = Uuid::new_v4();
    let manager = Uuid::new_v4();
    link_credential(&state.vault, manager, PrincipalKind::Manager, Duration::hours(1)).await;
    link_credential(&state.vault, tenant, PrincipalKind::Tenant, Duration::hours(1)).await;
    state
        .grants
        .grant(tenant, ACCOUNT, caps(true, false, false), Some(manager), None)
        .await
        .unwrap();

    match state
        .access
        .authorize(tenant, ACCOUNT, Capability::Read)
        .await
        .unwrap()
    {
        AccessDecision::Allowed(access) => {
            assert_eq!(access.credential_source, CredentialSource::Tenant);
            assert_eq!(access.principal_id, tenant);
            assert_eq!(access.credential.principal_id, tenant);
        }
        AccessDecision::Denied(reason) => panic!("unexpected denial {reason:?}"),
    }
}

#[tokio::test]
async fn falls_back_to_grant_manager_then_primary() {
    let (state, _platform) = setup().await;
    let tenant = Uuid::new_v4();
    let primary = Uuid::new_v4();
    let owner = Uuid::new_v4();
    // First manager linked becomes primary.
    link_credential(&state.vault, primary, PrincipalKind::Manager, Duration::hours(1)).await;
    link_credential(&state.vault, owner, PrincipalKind::Manager, Duration::hours(1)).await;

    state
        .grants
        .grant(tenant, ACCOUNT, caps(true, false, false), Some(owner), None)
        .await
        .unwrap();
    let AccessDecision::Allowed(access) = state
        .access
        .authorize(tenant, ACCOUNT, Capability::Read)
        .await
        .unwrap()
    else {
        panic!("expected access through the grant's manager");
    };
    assert_eq!(access.credential_source, CredentialSource::Manager);
    assert_eq!(access.principal_id, owner);

    let other_tenant = Uuid::new_v4();
    state
        .grants
        .grant(other_tenant, "444-555-6666", caps(true, false, false), None, None)
        .await
        .unwrap();
    let AccessDecision::Allowed(access) = state
        .access
        .authorize(other_tenant, "444-555-6666", Capability::Read)
        .await
        .unwrap()
    else {
        panic!("expected access through the primary manager");
    };
    assert_eq!(access.principal_id, primary);
}

#[tokio::test]
async fn revoked_refresh_token_disconnects_and_denies() {
    let (state, platform) = setup().await;
    let tenant = Uuid::new_v4();
    link_credential(&state.vault, tenant, PrincipalKind::Tenant, Duration::hours(1)).await;
    state
        .grants
        .grant(tenant, ACCOUNT, caps(true, true, false), None, None)
        .await
        .unwrap();
    assert!(
        state
            .access
            .authorize(tenant, ACCOUNT, Capability::Write)
            .await
            .unwrap()
            .is_allowed()
    );

    // Token now past expiry and the platform refuses the refresh token.
    link_credential(&state.vault, tenant, PrincipalKind::Tenant, Duration::seconds(-60)).await;
    platform.set_refresh_behavior(RefreshBehavior::Reject);

    let err = state.vault.get_valid_credential(tenant).await.unwrap_err();
    assert!(matches!(err, GovernanceError::CredentialExpired { .. }));
    let err = state.vault.get_valid_credential(tenant).await.unwrap_err();
    assert!(matches!(err, GovernanceError::NotConnected { .. }));

    let decision = state
        .access
        .authorize(tenant, ACCOUNT, Capability::Write)
        .await
        .unwrap();
    assert_eq!(decision.denial(), Some(&DenialReason::CredentialUnavailable));
}

#[tokio::test]
async fn release_requires_write_and_an_approved_workflow() {
    let (state, _platform) = setup().await;
    let tenant = Uuid::new_v4();
    link_credential(&state.vault, tenant, PrincipalKind::Tenant, Duration::hours(1)).await;
    state
        .grants
        .grant(tenant, ACCOUNT, caps(true, true, false), None, None)
        .await
        .unwrap();

    let decision = state
        .access
        .check_release(tenant, ACCOUNT, "cmp-9")
        .await
        .unwrap();
    assert!(matches!(
        decision,
        ReleaseDecision::Denied(DenialReason::ApprovalMissing)
    ));

    let view = state
        .workflow
        .submit(tenant, "cmp-9", Uuid::new_v4(), &[ApproverRole::Admin], None)
        .await
        .unwrap();
    let decision = state
        .access
        .check_release(tenant, ACCOUNT, "cmp-9")
        .await
        .unwrap();
    assert!(matches!(
        decision,
        ReleaseDecision::Denied(DenialReason::ApprovalPending { step_number: 1, .. })
    ));

    state
        .workflow
        .approve(view.id, 1, Uuid::new_v4(), ApproverRole::Admin, None)
        .await
        .unwrap();
    match state
        .access
        .check_release(tenant, ACCOUNT, "cmp-9")
        .await
        .unwrap()
    {
        ReleaseDecision::Release {
            access,
            approval_id,
        } => {
            assert_eq!(approval_id, view.id);
            assert_eq!(access.capability, Capability::Write);
        }
        ReleaseDecision::Denied(reason) => panic!("unexpected denial {reason:?}"),
    }
}

#[tokio::test]
async fn release_is_denied_without_write_even_when_approved() {
    let (state, _platform) = setup().await;
    let tenant = Uuid::new_v4();
    link_credential(&state.vault, tenant, PrincipalKind::Tenant, Duration::hours(1)).await;
    state
        .grants
        .grant(tenant, ACCOUNT, caps(true, false, false), None, None)
        .await
        .unwrap();
    let view = state
        .workflow
        .submit(tenant, "cmp-9", Uuid::new_v4(), &[ApproverRole::Admin], None)
        .await
        .unwrap();
    state
        .workflow
        .approve(view.id, 1, Uuid::new_v4(), ApproverRole::Admin, None)
        .await
        .unwrap();

    let decision = state
        .access
        .check_release(tenant, ACCOUNT, "cmp-9")
        .await
        .unwrap();
    assert!(matches!(
        decision,
        ReleaseDecision::Denied(DenialReason::CapabilityMissing { .. })
    ));
}
