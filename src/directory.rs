//! # Hierarchy Directory
//!
//! Read-through listing of advertiser accounts reachable under a manager credential. Nothing
//! is cached; the permission grant store remains the source of truth for access.

use std::sync::Arc;

use metrics::counter;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::config::DirectoryConfig;
use crate::error::GovernanceError;
use crate::platform::{AdsPlatform, AdvertiserAccount, PlatformError};
use crate::token_vault::{Credential, TokenVault};

#[derive(Clone)]
pub struct HierarchyDirectory {
    platform: Arc<dyn AdsPlatform>,
    vault: TokenVault,
    config: DirectoryConfig,
}

impl HierarchyDirectory {
    pub fn new(platform: Arc<dyn AdsPlatform>, vault: TokenVault, config: DirectoryConfig) -> Self {
        Self {
            platform,
            vault,
            config,
        }
    }

    /// Leaf advertiser accounts under the credential, sorted by account id.
    #[instrument(skip(self, credential), fields(principal_id = %credential.principal_id))]
    pub async fn list_advertiser_accounts(
        &self,
        credential: &Credential,
    ) -> Result<Vec<AdvertiserAccount>, GovernanceError> {
        let call = self.platform.list_sub_accounts(credential);
        let accounts = match tokio::time::timeout(self.config.request_timeout(), call).await {
            Ok(result) => result.map_err(|err| self.classify(credential.principal_id, err))?,
            Err(_) => return Err(self.timed_out("list_sub_accounts")),
        };

        let mut leaves: Vec<AdvertiserAccount> = accounts
            .into_iter()
            .filter(|account| !account.is_manager)
            .collect();
        leaves.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(leaves)
    }

    #[instrument(skip(self, credential), fields(principal_id = %credential.principal_id))]
    pub async fn describe_account(
        &self,
        credential: &Credential,
        account_id: &str,
    ) -> Result<AdvertiserAccount, GovernanceError> {
        let call = self.platform.describe_account(credential, account_id);
        match tokio::time::timeout(self.config.request_timeout(), call).await {
            Ok(Ok(account)) => Ok(account),
            Ok(Err(PlatformError::NotFound(_))) => {
                Err(GovernanceError::not_found("advertiser_account", account_id))
            }
            Ok(Err(err)) => Err(self.classify(credential.principal_id, err)),
            Err(_) => Err(self.timed_out("describe_account")),
        }
    }

    /// Resolve the principal's credential through the vault, then list.
    pub async fn list_for_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<AdvertiserAccount>, GovernanceError> {
        let credential = self.vault.get_valid_credential(principal_id).await?;
        self.list_advertiser_accounts(&credential).await
    }

    pub async fn describe_for_principal(
        &self,
        principal_id: Uuid,
        account_id: &str,
    ) -> Result<AdvertiserAccount, GovernanceError> {
        let credential = self.vault.get_valid_credential(principal_id).await?;
        self.describe_account(&credential, account_id).await
    }

    fn classify(&self, principal_id: Uuid, err: PlatformError) -> GovernanceError {
        match err {
            PlatformError::AuthenticationFailed(reason) => {
                warn!(%principal_id, %reason, "Platform rejected credential");
                counter!("directory_errors_total", "kind" => "authentication").increment(1);
                GovernanceError::CredentialExpired { principal_id }
            }
            PlatformError::RateLimited { retry_after } => {
                counter!("directory_errors_total", "kind" => "rate_limited").increment(1);
                GovernanceError::AccountUnreachable {
                    reason: "platform rate limit".to_string(),
                    retry_after_seconds: retry_after.unwrap_or(self.config.retry_after_seconds),
                }
            }
            other => {
                warn!(%principal_id, error = %other, "Platform call failed");
                counter!("directory_errors_total", "kind" => "unreachable").increment(1);
                GovernanceError::AccountUnreachable {
                    reason: other.to_string(),
                    retry_after_seconds: self.config.retry_after_seconds,
                }
            }
        }
    }

    fn timed_out(&self, operation: &'static str) -> GovernanceError {
        counter!("directory_errors_total", "kind" => "timeout").increment(1);
        warn!(operation, "Platform call timed out");
        GovernanceError::AccountUnreachable {
            reason: format!("{} timed out", operation),
            retry_after_seconds: self.config.retry_after_seconds,
        }
    }
}
