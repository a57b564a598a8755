//! # Access Resolver
//!
//! Decides whether a tenant may act on an advertiser account and, if so, with which
//! credential. Access is the conjunction of an active grant carrying the required capability
//! and a credential that can actually be used; a grant with no usable credential is a denial.
//!
//! Denials are ordinary results. They are counted and logged at `info`, never raised as
//! errors. Only storage failures surface as `Err`.

use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::GovernanceError;
use crate::models::approval_step::ApproverRole;
use crate::models::permission_grant::{self, Capability, CapabilitySet};
use crate::repositories::grant::GrantStore;
use crate::token_vault::{Credential, TokenVault};
use crate::workflow::{ApprovalWorkflow, ReleaseStatus};

/// Which principal's credential backs an allowed decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// The tenant's own standalone link
    Tenant,
    /// A manager credential owning the account's hierarchy
    Manager,
}

#[derive(Debug, Clone)]
pub struct ResolvedAccess {
    pub tenant_id: Uuid,
    pub advertiser_account_id: String,
    pub capability: Capability,
    pub capabilities: CapabilitySet,
    pub credential_source: CredentialSource,
    pub principal_id: Uuid,
    pub credential: Credential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    NoGrant,
    GrantInactive,
    CapabilityMissing {
        required: Capability,
    },
    /// Grant is fine but neither the tenant's nor a manager's credential is usable
    CredentialUnavailable,
    ApprovalMissing,
    ApprovalPending {
        approval_id: Uuid,
        step_number: i32,
        required_role: ApproverRole,
    },
    ApprovalRejected {
        approval_id: Uuid,
    },
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::NoGrant => "no_grant",
            DenialReason::GrantInactive => "grant_inactive",
            DenialReason::CapabilityMissing { .. } => "capability_missing",
            DenialReason::CredentialUnavailable => "credential_unavailable",
            DenialReason::ApprovalMissing => "approval_missing",
            DenialReason::ApprovalPending { .. } => "approval_pending",
            DenialReason::ApprovalRejected { .. } => "approval_rejected",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AccessDecision {
    Allowed(ResolvedAccess),
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed(_))
    }

    pub fn denial(&self) -> Option<&DenialReason> {
        match self {
            AccessDecision::Denied(reason) => Some(reason),
            AccessDecision::Allowed(_) => None,
        }
    }
}

/// Outcome of the pre-push check for a governed campaign.
#[derive(Debug, Clone)]
pub enum ReleaseDecision {
    Release {
        access: ResolvedAccess,
        approval_id: Uuid,
    },
    Denied(DenialReason),
}

#[derive(Clone)]
pub struct AccessResolver {
    grants: GrantStore,
    vault: TokenVault,
    workflow: ApprovalWorkflow,
}

impl AccessResolver {
    pub fn new(grants: GrantStore, vault: TokenVault, workflow: ApprovalWorkflow) -> Self {
        Self {
            grants,
            vault,
            workflow,
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn authorize(
        &self,
        tenant_id: Uuid,
        advertiser_account_id: &str,
        required: Capability,
    ) -> Result<AccessDecision, GovernanceError> {
        let grant = match self.grants.find(tenant_id, advertiser_account_id).await? {
            None => return Ok(deny(DenialReason::NoGrant)),
            Some(grant) if !grant.active => return Ok(deny(DenialReason::GrantInactive)),
            Some(grant) => grant,
        };

        let capabilities = grant.capabilities();
        if !capabilities.allows(required) {
            return Ok(deny(DenialReason::CapabilityMissing { required }));
        }

        let Some((credential_source, credential)) = self.resolve_credential(&grant).await? else {
            return Ok(deny(DenialReason::CredentialUnavailable));
        };

        debug!(
            advertiser_account_id = %grant.advertiser_account_id,
            source = ?credential_source,
            principal_id = %credential.principal_id,
            "Access allowed"
        );
        Ok(AccessDecision::Allowed(ResolvedAccess {
            tenant_id,
            advertiser_account_id: grant.advertiser_account_id.clone(),
            capability: required,
            capabilities,
            credential_source,
            principal_id: credential.principal_id,
            credential,
        }))
    }

    /// Write access combined with an approved workflow: the single check callers make
    /// before pushing a governed campaign to the platform.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn check_release(
        &self,
        tenant_id: Uuid,
        advertiser_account_id: &str,
        campaign_id: &str,
    ) -> Result<ReleaseDecision, GovernanceError> {
        let access = match self
            .authorize(tenant_id, advertiser_account_id, Capability::Write)
            .await?
        {
            AccessDecision::Allowed(access) => access,
            AccessDecision::Denied(reason) => return Ok(ReleaseDecision::Denied(reason)),
        };

        let reason = match self.workflow.release_status(tenant_id, campaign_id).await? {
            ReleaseStatus::Approved { approval_id } => {
                return Ok(ReleaseDecision::Release {
                    access,
                    approval_id,
                });
            }
            ReleaseStatus::NotSubmitted => DenialReason::ApprovalMissing,
            ReleaseStatus::Pending {
                approval_id,
                step_number,
                required_role,
            } => DenialReason::ApprovalPending {
                approval_id,
                step_number,
                required_role,
            },
            ReleaseStatus::Rejected { approval_id } => DenialReason::ApprovalRejected { approval_id },
        };

        Ok(ReleaseDecision::Denied(deny_reason(reason)))
    }

    /// Credential fallback order: the tenant's own link, then the manager recorded on the
    /// grant, then the primary manager. Credential failures move on to the next candidate.
    async fn resolve_credential(
        &self,
        grant: &permission_grant::Model,
    ) -> Result<Option<(CredentialSource, Credential)>, GovernanceError> {
        let mut candidates = vec![(CredentialSource::Tenant, grant.tenant_id)];
        if let Some(manager) = grant.manager_principal_id {
            candidates.push((CredentialSource::Manager, manager));
        }
        if let Some(primary) = self.vault.primary_manager().await? {
            if !candidates.iter().any(|(_, principal)| *principal == primary) {
                candidates.push((CredentialSource::Manager, primary));
            }
        }

        for (source, principal_id) in candidates {
            match self.vault.get_valid_credential(principal_id).await {
                Ok(credential) => return Ok(Some((source, credential))),
                Err(GovernanceError::Database(err)) => return Err(GovernanceError::Database(err)),
                Err(err) => {
                    debug!(%principal_id, source = ?source, error = %err, "Credential candidate skipped");
                }
            }
        }

        Ok(None)
    }
}

fn deny(reason: DenialReason) -> AccessDecision {
    AccessDecision::Denied(deny_reason(reason))
}

fn deny_reason(reason: DenialReason) -> DenialReason {
    counter!("access_denied_total", "reason" => reason.code()).increment(1);
    info!(reason = reason.code(), detail = ?reason, "Access denied");
    reason
}
