//! # Notification Dispatch
//!
//! Fire-and-forget delivery of governance events. Callers notify only after their transaction
//! has committed; a failed delivery is logged and never surfaces to the caller.

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use url::Url;
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::models::approval_step::{ApproverRole, StepStatus};
use crate::models::campaign_approval::ApprovalStatus;
use crate::models::permission_grant::CapabilitySet;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Adgate-Signature";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GovernanceEvent {
    GrantAssigned {
        tenant_id: Uuid,
        advertiser_account_id: String,
        capabilities: CapabilitySet,
        actor_id: Option<Uuid>,
    },
    GrantsRevoked {
        advertiser_account_id: String,
        tenant_ids: Vec<Uuid>,
        actor_id: Option<Uuid>,
    },
    ApprovalSubmitted {
        approval_id: Uuid,
        tenant_id: Uuid,
        campaign_id: String,
        submitter_id: Uuid,
        first_role: ApproverRole,
    },
    ApprovalStepResolved {
        approval_id: Uuid,
        tenant_id: Uuid,
        campaign_id: String,
        step_number: i32,
        decision: StepStatus,
        approval_status: ApprovalStatus,
        actor_id: Uuid,
        /// Role the approval now waits on; `None` once terminal
        next_role: Option<ApproverRole>,
    },
}

impl GovernanceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GovernanceEvent::GrantAssigned { .. } => "grant_assigned",
            GovernanceEvent::GrantsRevoked { .. } => "grants_revoked",
            GovernanceEvent::ApprovalSubmitted { .. } => "approval_submitted",
            GovernanceEvent::ApprovalStepResolved { .. } => "approval_step_resolved",
        }
    }
}

/// Best-effort event sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: GovernanceEvent);
}

/// Records events in the log stream only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: GovernanceEvent) {
        tracing::info!(event = event.name(), payload = ?event, "Governance event");
    }
}

/// Posts each event as JSON to a configured endpoint on a background task.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Url, secret: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("adgate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url,
            secret,
        })
    }

    /// `None` when no webhook URL is configured.
    pub fn from_config(config: &NotificationConfig) -> anyhow::Result<Option<Self>> {
        let Some(raw) = config.webhook_url.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw)?;
        let notifier = Self::new(
            url,
            config.webhook_secret.clone(),
            Duration::from_secs(config.timeout_seconds),
        )?;
        Ok(Some(notifier))
    }

    async fn deliver(
        client: reqwest::Client,
        url: Url,
        secret: Option<String>,
        event_name: &'static str,
        body: Vec<u8>,
    ) {
        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Adgate-Event", event_name);
        if let Some(secret) = secret.as_deref() {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body));
        }

        match request.body(body).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(event = event_name, "Webhook notification delivered");
            }
            Ok(response) => {
                tracing::warn!(
                    event = event_name,
                    status = response.status().as_u16(),
                    "Webhook notification rejected"
                );
            }
            Err(err) => {
                tracing::warn!(event = event_name, error = %err, "Webhook notification failed");
            }
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: GovernanceEvent) {
        let event_name = event.name();
        let body = match serde_json::to_vec(&event) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(event = event_name, error = %err, "Failed to encode notification");
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(event = event_name, "No async runtime; notification dropped");
            return;
        };

        runtime.spawn(Self::deliver(
            self.client.clone(),
            self.url.clone(),
            self.secret.clone(),
            event_name,
            body,
        ));
    }
}

/// Hex-encoded HMAC-SHA256 of the request body.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
