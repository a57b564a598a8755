//! Pure transition rules of the approval state machine.
//!
//! Nothing here touches the database: the engine loads the approval and its steps, asks
//! [`plan_transition`] what should happen, then applies the plan with compare-and-set writes.

use uuid::Uuid;

use crate::error::GovernanceError;
use crate::models::approval_history::ApprovalAction;
use crate::models::approval_step::{self, ApproverRole, StepStatus};
use crate::models::campaign_approval::{self, ApprovalStatus};

/// Step decision requested by an approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn step_status(self) -> StepStatus {
        match self {
            Decision::Approve => StepStatus::Approved,
            Decision::Reject => StepStatus::Rejected,
        }
    }

    pub fn action(self) -> ApprovalAction {
        match self {
            Decision::Approve => ApprovalAction::Approved,
            Decision::Reject => ApprovalAction::Rejected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepDecision<'a> {
    pub step_number: i32,
    pub actor_id: Uuid,
    pub actor_role: ApproverRole,
    pub comment: Option<&'a str>,
    pub decision: Decision,
}

/// What a valid decision changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub step_id: Uuid,
    pub step_number: i32,
    pub step_status: StepStatus,
    pub approval_status: ApprovalStatus,
    pub comment: Option<String>,
    /// Role of the step that becomes actionable next, if the approval stays pending
    pub next_role: Option<ApproverRole>,
}

/// Lowest-numbered pending step, the only one that may be resolved.
pub fn lowest_pending(steps: &[approval_step::Model]) -> Option<&approval_step::Model> {
    steps
        .iter()
        .filter(|step| step.status == StepStatus::Pending)
        .min_by_key(|step| step.step_number)
}

/// Validate a submission; returns the trimmed campaign id.
pub fn validate_submission(
    campaign_id: &str,
    roles: &[ApproverRole],
) -> Result<String, GovernanceError> {
    let campaign_id = campaign_id.trim();
    if campaign_id.is_empty() {
        return Err(GovernanceError::InvalidWorkflow(
            "campaign_id must not be blank".to_string(),
        ));
    }
    if roles.is_empty() {
        return Err(GovernanceError::InvalidWorkflow(
            "at least one approver role is required".to_string(),
        ));
    }
    Ok(campaign_id.to_string())
}

/// Decide whether `request` may be applied, checking in a fixed order so callers always
/// see the same error for the same state.
pub fn plan_transition(
    approval: &campaign_approval::Model,
    steps: &[approval_step::Model],
    request: &StepDecision<'_>,
) -> Result<Transition, GovernanceError> {
    if approval.status.is_terminal() {
        return Err(GovernanceError::AlreadyResolved {
            approval_id: approval.id,
        });
    }

    let comment = request
        .comment
        .map(str::trim)
        .filter(|comment| !comment.is_empty())
        .map(str::to_string);
    if request.decision == Decision::Reject && comment.is_none() {
        return Err(GovernanceError::CommentRequired);
    }

    let step = steps
        .iter()
        .find(|step| step.step_number == request.step_number)
        .ok_or_else(|| {
            GovernanceError::not_found(
                "approval_step",
                format!("{}/{}", approval.id, request.step_number),
            )
        })?;

    if step.status != StepStatus::Pending {
        return Err(GovernanceError::AlreadyResolved {
            approval_id: approval.id,
        });
    }

    // A pending step always exists here, since `step` itself is pending.
    let lowest = lowest_pending(steps).map_or(step.step_number, |s| s.step_number);
    if step.step_number != lowest {
        return Err(GovernanceError::StepOutOfOrder {
            requested: step.step_number,
            lowest_pending: lowest,
        });
    }

    if step.required_role != request.actor_role {
        return Err(GovernanceError::RoleMismatch {
            step_number: step.step_number,
            required: step.required_role,
            actual: request.actor_role,
        });
    }

    let next = steps
        .iter()
        .filter(|s| s.status == StepStatus::Pending && s.step_number > step.step_number)
        .min_by_key(|s| s.step_number);

    let (approval_status, next_role) = match (request.decision, next) {
        (Decision::Reject, _) => (ApprovalStatus::Rejected, None),
        (Decision::Approve, None) => (ApprovalStatus::Approved, None),
        (Decision::Approve, Some(next)) => (ApprovalStatus::Pending, Some(next.required_role)),
    };

    Ok(Transition {
        step_id: step.id,
        step_number: step.step_number,
        step_status: request.decision.step_status(),
        approval_status,
        comment,
        next_role,
    })
}
