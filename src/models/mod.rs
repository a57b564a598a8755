//! # Data Models
//!
//! SeaORM entities for credentials, grants, approvals and their ledgers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod approval_history;
pub mod approval_step;
pub mod campaign_approval;
pub mod grant_history;
pub mod linked_credential;
pub mod oauth_state;
pub mod permission_grant;

pub use approval_history::Entity as ApprovalHistory;
pub use approval_step::Entity as ApprovalStep;
pub use campaign_approval::Entity as CampaignApproval;
pub use grant_history::Entity as GrantHistory;
pub use linked_credential::Entity as LinkedCredential;
pub use oauth_state::Entity as OAuthState;
pub use permission_grant::Entity as PermissionGrant;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "adgate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
