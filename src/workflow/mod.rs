//! # Approval Workflow Engine
//!
//! Per-campaign state machine gating governed mutations behind sequential, role-scoped
//! sign-off. Every transition is one transaction made of compare-and-set writes on the step
//! and the approval plus the ledger append; a lost race aborts with `AlreadyResolved` and
//! leaves nothing behind.
//!
//! The engine reads nothing from the grant store or the token vault and never calls the
//! advertising platform. Callers wait for [`ReleaseStatus::Approved`] before pushing a
//! campaign downstream.

pub mod state;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{GovernanceError, is_unique_violation};
use crate::models::approval_history::{self, ApprovalAction};
use crate::models::approval_step::{self, ApproverRole, Entity as ApprovalStep, StepStatus};
use crate::models::campaign_approval::{self, ApprovalStatus, Entity as CampaignApproval};
use crate::notify::{GovernanceEvent, Notifier};
use crate::repositories::history::{ApprovalEntry, HistoryRepository, append_approval_entry};

pub use state::{Decision, StepDecision, Transition};

/// One step as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StepView {
    pub step_number: i32,
    pub required_role: ApproverRole,
    pub status: StepStatus,
    pub comment: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<&approval_step::Model> for StepView {
    fn from(step: &approval_step::Model) -> Self {
        Self {
            step_number: step.step_number,
            required_role: step.required_role,
            status: step.status,
            comment: step.comment.clone(),
            resolved_by: step.resolved_by,
            resolved_at: step.resolved_at,
        }
    }
}

/// An approval with its ordered steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ApprovalView {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub campaign_id: String,
    pub advertiser_account_id: Option<String>,
    pub submitter_id: Uuid,
    pub status: ApprovalStatus,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepView>,
}

impl ApprovalView {
    fn build(approval: &campaign_approval::Model, steps: &[approval_step::Model]) -> Self {
        let mut steps: Vec<StepView> = steps.iter().map(StepView::from).collect();
        steps.sort_by_key(|step| step.step_number);
        Self {
            id: approval.id,
            tenant_id: approval.tenant_id,
            campaign_id: approval.campaign_id.clone(),
            advertiser_account_id: approval.advertiser_account_id.clone(),
            submitter_id: approval.submitter_id,
            status: approval.status,
            version: approval.version,
            created_at: approval.created_at,
            updated_at: approval.updated_at,
            resolved_at: approval.resolved_at,
            steps,
        }
    }

    /// The step currently awaiting a decision.
    pub fn current_step(&self) -> Option<&StepView> {
        if self.status.is_terminal() {
            return None;
        }
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Pending)
            .min_by_key(|step| step.step_number)
    }
}

/// Whether a campaign may be pushed to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReleaseStatus {
    NotSubmitted,
    Pending {
        approval_id: Uuid,
        step_number: i32,
        required_role: ApproverRole,
    },
    Approved {
        approval_id: Uuid,
    },
    Rejected {
        approval_id: Uuid,
    },
}

#[derive(Clone)]
pub struct ApprovalWorkflow {
    db: Arc<DatabaseConnection>,
    history: HistoryRepository,
    notifier: Arc<dyn Notifier>,
}

impl ApprovalWorkflow {
    pub fn new(db: Arc<DatabaseConnection>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            history: HistoryRepository::new(db.clone()),
            db,
            notifier,
        }
    }

    /// Open an approval for the campaign with one pending step per role, numbered from 1.
    #[instrument(skip(self, roles), fields(tenant_id = %tenant_id, steps = roles.len()))]
    pub async fn submit(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        submitter_id: Uuid,
        roles: &[ApproverRole],
        advertiser_account_id: Option<String>,
    ) -> Result<ApprovalView, GovernanceError> {
        let campaign_id = state::validate_submission(campaign_id, roles)?;

        let open = CampaignApproval::find()
            .filter(campaign_approval::Column::TenantId.eq(tenant_id))
            .filter(campaign_approval::Column::PendingCampaignId.eq(campaign_id.as_str()))
            .one(&*self.db)
            .await?;
        if let Some(open) = open {
            return Err(already_pending(&campaign_id, open.id));
        }

        let now = Utc::now();
        let approval = campaign_approval::Model {
            id: Uuid::new_v4(),
            tenant_id,
            campaign_id: campaign_id.clone(),
            pending_campaign_id: Some(campaign_id.clone()),
            advertiser_account_id: advertiser_account_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            submitter_id,
            status: ApprovalStatus::Pending,
            version: 0,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        let steps: Vec<approval_step::Model> = roles
            .iter()
            .zip(1..)
            .map(|(role, step_number)| approval_step::Model {
                id: Uuid::new_v4(),
                approval_id: approval.id,
                step_number,
                required_role: *role,
                status: StepStatus::Pending,
                comment: None,
                resolved_by: None,
                resolved_at: None,
            })
            .collect();

        let txn = self.db.begin().await?;

        let inserted = CampaignApproval::insert(campaign_approval::ActiveModel {
            id: Set(approval.id),
            tenant_id: Set(approval.tenant_id),
            campaign_id: Set(approval.campaign_id.clone()),
            pending_campaign_id: Set(approval.pending_campaign_id.clone()),
            advertiser_account_id: Set(approval.advertiser_account_id.clone()),
            submitter_id: Set(approval.submitter_id),
            status: Set(approval.status),
            version: Set(approval.version),
            created_at: Set(approval.created_at),
            updated_at: Set(approval.updated_at),
            resolved_at: Set(None),
        })
        .exec_without_returning(&txn)
        .await;
        if let Err(err) = inserted {
            txn.rollback().await?;
            if is_unique_violation(&err) {
                return Err(GovernanceError::InvalidWorkflow(format!(
                    "campaign {} already has a pending approval",
                    campaign_id
                )));
            }
            return Err(err.into());
        }

        ApprovalStep::insert_many(steps.iter().map(|step| approval_step::ActiveModel {
            id: Set(step.id),
            approval_id: Set(step.approval_id),
            step_number: Set(step.step_number),
            required_role: Set(step.required_role),
            status: Set(step.status),
            comment: Set(None),
            resolved_by: Set(None),
            resolved_at: Set(None),
        }))
        .exec_without_returning(&txn)
        .await?;

        append_approval_entry(
            &txn,
            ApprovalEntry {
                approval_id: approval.id,
                step_number: None,
                action: ApprovalAction::Submitted,
                actor_id: submitter_id,
                actor_role: None,
                comment: None,
            },
        )
        .await?;

        txn.commit().await?;

        counter!("approval_transitions_total", "action" => "submitted").increment(1);
        info!(approval_id = %approval.id, campaign_id = %campaign_id, "Approval submitted");
        self.notifier.notify(GovernanceEvent::ApprovalSubmitted {
            approval_id: approval.id,
            tenant_id,
            campaign_id,
            submitter_id,
            first_role: roles[0],
        });

        Ok(ApprovalView::build(&approval, &steps))
    }

    pub async fn approve(
        &self,
        approval_id: Uuid,
        step_number: i32,
        actor_id: Uuid,
        actor_role: ApproverRole,
        comment: Option<&str>,
    ) -> Result<ApprovalView, GovernanceError> {
        self.resolve_step(
            approval_id,
            StepDecision {
                step_number,
                actor_id,
                actor_role,
                comment,
                decision: Decision::Approve,
            },
        )
        .await
    }

    pub async fn reject(
        &self,
        approval_id: Uuid,
        step_number: i32,
        actor_id: Uuid,
        actor_role: ApproverRole,
        comment: &str,
    ) -> Result<ApprovalView, GovernanceError> {
        self.resolve_step(
            approval_id,
            StepDecision {
                step_number,
                actor_id,
                actor_role,
                comment: Some(comment),
                decision: Decision::Reject,
            },
        )
        .await
    }

    #[instrument(
        skip(self, request),
        fields(
            approval_id = %approval_id,
            step_number = request.step_number,
            decision = request.decision.as_str(),
            actor_id = %request.actor_id
        )
    )]
    async fn resolve_step(
        &self,
        approval_id: Uuid,
        request: StepDecision<'_>,
    ) -> Result<ApprovalView, GovernanceError> {
        let txn = self.db.begin().await?;

        let approval = CampaignApproval::find_by_id(approval_id)
            .one(&txn)
            .await?
            .ok_or_else(|| GovernanceError::not_found("approval", approval_id))?;
        let steps = ApprovalStep::find()
            .filter(approval_step::Column::ApprovalId.eq(approval_id))
            .order_by_asc(approval_step::Column::StepNumber)
            .all(&txn)
            .await?;

        let transition = match state::plan_transition(&approval, &steps, &request) {
            Ok(transition) => transition,
            Err(err) => {
                txn.rollback().await?;
                return Err(err);
            }
        };

        if let Err(err) = write_transition(&txn, &approval, &transition, &request).await {
            txn.rollback().await?;
            return Err(err);
        }

        append_approval_entry(
            &txn,
            ApprovalEntry {
                approval_id,
                step_number: Some(transition.step_number),
                action: request.decision.action(),
                actor_id: request.actor_id,
                actor_role: Some(request.actor_role),
                comment: transition.comment.clone(),
            },
        )
        .await?;

        txn.commit().await?;

        counter!("approval_transitions_total", "action" => request.decision.as_str()).increment(1);
        info!(
            approval_status = ?transition.approval_status,
            next_role = ?transition.next_role,
            "Approval step resolved"
        );
        self.notifier.notify(GovernanceEvent::ApprovalStepResolved {
            approval_id,
            tenant_id: approval.tenant_id,
            campaign_id: approval.campaign_id.clone(),
            step_number: transition.step_number,
            decision: transition.step_status,
            approval_status: transition.approval_status,
            actor_id: request.actor_id,
            next_role: transition.next_role,
        });

        self.get(approval_id).await
    }

    /// Approvals whose lowest pending step requires `role`, oldest first. Later steps are not
    /// reachable and never show up in their role's queue.
    #[instrument(skip(self), fields(user_id = %user_id, role = %role))]
    pub async fn pending_approvals_for(
        &self,
        user_id: Uuid,
        role: ApproverRole,
    ) -> Result<Vec<ApprovalView>, GovernanceError> {
        let pending = CampaignApproval::find()
            .filter(campaign_approval::Column::Status.eq(ApprovalStatus::Pending))
            .find_with_related(ApprovalStep)
            .all(&*self.db)
            .await?;

        let mut queue: Vec<ApprovalView> = pending
            .iter()
            .filter(|(_, steps)| {
                state::lowest_pending(steps).is_some_and(|step| step.required_role == role)
            })
            .map(|(approval, steps)| ApprovalView::build(approval, steps))
            .collect();
        queue.sort_by_key(|view| (view.created_at, view.id));

        tracing::debug!(count = queue.len(), "Pending approvals resolved");
        Ok(queue)
    }

    pub async fn get(&self, approval_id: Uuid) -> Result<ApprovalView, GovernanceError> {
        let approval = CampaignApproval::find_by_id(approval_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| GovernanceError::not_found("approval", approval_id))?;
        let steps = ApprovalStep::find()
            .filter(approval_step::Column::ApprovalId.eq(approval_id))
            .order_by_asc(approval_step::Column::StepNumber)
            .all(&*self.db)
            .await?;
        Ok(ApprovalView::build(&approval, &steps))
    }

    pub async fn history(
        &self,
        approval_id: Uuid,
    ) -> Result<Vec<approval_history::Model>, GovernanceError> {
        let exists = CampaignApproval::find_by_id(approval_id)
            .one(&*self.db)
            .await?
            .is_some();
        if !exists {
            return Err(GovernanceError::not_found("approval", approval_id));
        }
        Ok(self.history.approval_history(approval_id).await?)
    }

    /// Release state of the campaign's most recent approval.
    pub async fn release_status(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
    ) -> Result<ReleaseStatus, GovernanceError> {
        let latest = CampaignApproval::find()
            .filter(campaign_approval::Column::TenantId.eq(tenant_id))
            .filter(campaign_approval::Column::CampaignId.eq(campaign_id.trim()))
            .order_by_desc(campaign_approval::Column::CreatedAt)
            .one(&*self.db)
            .await?;

        let Some(approval) = latest else {
            return Ok(ReleaseStatus::NotSubmitted);
        };

        Ok(match approval.status {
            ApprovalStatus::Approved => ReleaseStatus::Approved {
                approval_id: approval.id,
            },
            ApprovalStatus::Rejected => ReleaseStatus::Rejected {
                approval_id: approval.id,
            },
            ApprovalStatus::Pending => {
                let view = self.get(approval.id).await?;
                match view.current_step() {
                    Some(step) => ReleaseStatus::Pending {
                        approval_id: approval.id,
                        step_number: step.step_number,
                        required_role: step.required_role,
                    },
                    None => {
                        return Err(GovernanceError::InvalidWorkflow(format!(
                            "approval {} is pending without a pending step",
                            approval.id
                        )));
                    }
                }
            }
        })
    }
}

/// Compare-and-set writes for a planned transition. The step must still be pending and the
/// approval must still carry the version the plan was made from; otherwise `AlreadyResolved`.
/// The caller owns the transaction and rolls back on error.
async fn write_transition<C: ConnectionTrait>(
    conn: &C,
    approval: &campaign_approval::Model,
    transition: &Transition,
    request: &StepDecision<'_>,
) -> Result<(), GovernanceError> {
    let approval_id = approval.id;
    let now = Utc::now();
    let step_written = ApprovalStep::update_many()
        .col_expr(
            approval_step::Column::Status,
            Expr::value(transition.step_status),
        )
        .col_expr(
            approval_step::Column::Comment,
            Expr::value(transition.comment.clone()),
        )
        .col_expr(
            approval_step::Column::ResolvedBy,
            Expr::value(Some(request.actor_id)),
        )
        .col_expr(approval_step::Column::ResolvedAt, Expr::value(Some(now)))
        .filter(approval_step::Column::Id.eq(transition.step_id))
        .filter(approval_step::Column::Status.eq(StepStatus::Pending))
        .exec(conn)
        .await?;
    if step_written.rows_affected != 1 {
        return Err(GovernanceError::AlreadyResolved { approval_id });
    }

    let mut approval_update = CampaignApproval::update_many()
        .col_expr(
            campaign_approval::Column::Status,
            Expr::value(transition.approval_status),
        )
        .col_expr(
            campaign_approval::Column::Version,
            Expr::value(approval.version + 1),
        )
        .col_expr(campaign_approval::Column::UpdatedAt, Expr::value(now));
    if transition.approval_status.is_terminal() {
        approval_update = approval_update
            .col_expr(campaign_approval::Column::ResolvedAt, Expr::value(Some(now)))
            .col_expr(
                campaign_approval::Column::PendingCampaignId,
                Expr::value(Option::<String>::None),
            );
    }
    let approval_written = approval_update
        .filter(campaign_approval::Column::Id.eq(approval_id))
        .filter(campaign_approval::Column::Version.eq(approval.version))
        .filter(campaign_approval::Column::Status.eq(ApprovalStatus::Pending))
        .exec(conn)
        .await?;
    if approval_written.rows_affected != 1 {
        return Err(GovernanceError::AlreadyResolved { approval_id });
    }

    Ok(())
}

fn already_pending(campaign_id: &str, approval_id: Uuid) -> GovernanceError {
    GovernanceError::InvalidWorkflow(format!(
        "campaign {} already has a pending approval ({})",
        campaign_id, approval_id
    ))
}
