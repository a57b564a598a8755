//! Integration tests for the approval workflow engine.

use std::sync::Arc;

use adgate::error::GovernanceError;
use adgate::models::approval_history::ApprovalAction;
use adgate::models::approval_step::{ApproverRole, StepStatus};
use adgate::models::campaign_approval::ApprovalStatus;
use adgate::workflow::{ApprovalWorkflow, ReleaseStatus};
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::RecordingNotifier;

use ApproverRole::{AccountManager, Admin, Client};

async fn setup() -> (ApprovalWorkflow, Arc<RecordingNotifier>) {
    let db = test_utils::setup_test_db_arc().await.unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    (ApprovalWorkflow::new(db, notifier.clone()), notifier)
}

#[tokio::test]
async fn submit_opens_pending_steps_in_order() {
    let (workflow, notifier) = setup().await;
    let tenant = Uuid::new_v4();
    let submitter = Uuid::new_v4();

    let view = workflow
        .submit(tenant, "cmp-1", submitter, &[AccountManager, Client], None)
        .await
        .unwrap();

    assert_eq!(view.status, ApprovalStatus::Pending);
    assert_eq!(view.steps.len(), 2);
    assert_eq!(view.steps[0].step_number, 1);
    assert_eq!(view.steps[0].required_role, AccountManager);
    assert_eq!(view.steps[1].step_number, 2);
    assert!(view.steps.iter().all(|s| s.status == StepStatus::Pending));
    assert_eq!(view.current_step().map(|s| s.step_number), Some(1));

    let history = workflow.history(view.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, ApprovalAction::Submitted);
    assert_eq!(history[0].actor_id, submitter);
    assert_eq!(notifier.event_names(), vec!["approval_submitted"]);
}

#[tokio::test]
async fn submit_rejects_empty_role_list_and_blank_campaign() {
    let (workflow, _notifier) = setup().await;
    let tenant = Uuid::new_v4();

    let err = workflow
        .submit(tenant, "cmp-1", Uuid::new_v4(), &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidWorkflow(_)));

    let err = workflow
        .submit(tenant, "  ", Uuid::new_v4(), &[Admin], None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidWorkflow(_)));
}

#[tokio::test]
async fn only_one_pending_approval_per_campaign() {
    let (workflow, _notifier) = setup().await;
    let tenant = Uuid::new_v4();

    workflow
        .submit(tenant, "cmp-1", Uuid::new_v4(), &[Admin], None)
        .await
        .unwrap();
    let err = workflow
        .submit(tenant, "cmp-1", Uuid::new_v4(), &[Admin], None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidWorkflow(_)));

    // Same campaign id under another tenant is independent.
    workflow
        .submit(Uuid::new_v4(), "cmp-1", Uuid::new_v4(), &[Admin], None)
        .await
        .unwrap();
}

#[tokio::test]
async fn approving_every_step_in_order_approves_the_campaign() {
    let (workflow, notifier) = setup().await;
    let tenant = Uuid::new_v4();
    let view = workflow
        .submit(tenant, "cmp-1", Uuid::new_v4(), &[AccountManager, Client], None)
        .await
        .unwrap();

    let manager = Uuid::new_v4();
    let after_first = workflow
        .approve(view.id, 1, manager, AccountManager, Some("looks good"))
        .await
        .unwrap();
    assert_eq!(after_first.status, ApprovalStatus::Pending);
    assert_eq!(after_first.steps[0].status, StepStatus::Approved);
    assert_eq!(after_first.steps[0].resolved_by, Some(manager));
    assert_eq!(after_first.steps[0].comment.as_deref(), Some("looks good"));
    assert_eq!(after_first.current_step().map(|s| s.step_number), Some(2));

    let done = workflow
        .approve(view.id, 2, Uuid::new_v4(), Client, None)
        .await
        .unwrap();
    assert_eq!(done.status, ApprovalStatus::Approved);
    assert!(done.resolved_at.is_some());
    assert!(done.current_step().is_none());

    assert_eq!(
        workflow.release_status(tenant, "cmp-1").await.unwrap(),
        ReleaseStatus::Approved {
            approval_id: view.id
        }
    );

    let actions: Vec<ApprovalAction> = workflow
        .history(view.id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            ApprovalAction::Submitted,
            ApprovalAction::Approved,
            ApprovalAction::Approved
        ]
    );
    assert_eq!(
        notifier.event_names(),
        vec![
            "approval_submitted",
            "approval_step_resolved",
            "approval_step_resolved"
        ]
    );
}

#[tokio::test]
async fn later_step_cannot_be_resolved_first() {
    let (workflow, _notifier) = setup().await;
    let view = workflow
        .submit(Uuid::new_v4(), "cmp-1", Uuid::new_v4(), &[Admin, Client], None)
        .await
        .unwrap();

    let err = workflow
        .approve(view.id, 2, Uuid::new_v4(), Client, None)
        .await
        .unwrap_err();
    match err {
        GovernanceError::StepOutOfOrder {
            requested,
            lowest_pending,
        } => {
            assert_eq!(requested, 2);
            assert_eq!(lowest_pending, 1);
        }
        other => panic!("expected StepOutOfOrder, got {other:?}"),
    }

    let unchanged = workflow.get(view.id).await.unwrap();
    assert!(unchanged.steps.iter().all(|s| s.status == StepStatus::Pending));
}

#[tokio::test]
async fn caller_role_must_match_the_step() {
    let (workflow, _notifier) = setup().await;
    let view = workflow
        .submit(Uuid::new_v4(), "cmp-1", Uuid::new_v4(), &[Admin], None)
        .await
        .unwrap();

    let err = workflow
        .approve(view.id, 1, Uuid::new_v4(), Client, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::RoleMismatch { step_number: 1, .. }));
}

#[tokio::test]
async fn reject_requires_a_comment_and_ends_the_approval() {
    let (workflow, _notifier) = setup().await;
    let tenant = Uuid::new_v4();
    let view = workflow
        .submit(tenant, "cmp-1", Uuid::new_v4(), &[AccountManager, Client], None)
        .await
        .unwrap();

    let err = workflow
        .reject(view.id, 1, Uuid::new_v4(), AccountManager, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::CommentRequired));

    let rejected = workflow
        .reject(view.id, 1, Uuid::new_v4(), AccountManager, "budget too high")
        .await
        .unwrap();
    assert_eq!(rejected.status, ApprovalStatus::Rejected);
    assert_eq!(rejected.steps[0].status, StepStatus::Rejected);
    assert_eq!(rejected.steps[0].comment.as_deref(), Some("budget too high"));
    // Remaining steps stay pending but can no longer be acted on.
    assert_eq!(rejected.steps[1].status, StepStatus::Pending);

    let err = workflow
        .approve(view.id, 2, Uuid::new_v4(), Client, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyResolved { .. }));

    assert_eq!(
        workflow.release_status(tenant, "cmp-1").await.unwrap(),
        ReleaseStatus::Rejected {
            approval_id: view.id
        }
    );

    let history = workflow.history(view.id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.action, ApprovalAction::Rejected);
    assert_eq!(last.comment.as_deref(), Some("budget too high"));
}

#[tokio::test]
async fn rejected_campaign_can_be_resubmitted() {
    let (workflow, _notifier) = setup().await;
    let tenant = Uuid::new_v4();
    let first = workflow
        .submit(tenant, "cmp-1", Uuid::new_v4(), &[Admin], None)
        .await
        .unwrap();
    workflow
        .reject(first.id, 1, Uuid::new_v4(), Admin, "fix targeting")
        .await
        .unwrap();

    let second = workflow
        .submit(tenant, "cmp-1", Uuid::new_v4(), &[Admin], None)
        .await
        .unwrap();
    assert_ne!(first.id, second.id);

    match workflow.release_status(tenant, "cmp-1").await.unwrap() {
        ReleaseStatus::Pending {
            approval_id,
            step_number,
            required_role,
        } => {
            assert_eq!(approval_id, second.id);
            assert_eq!(step_number, 1);
            assert_eq!(required_role, Admin);
        }
        other => panic!("expected pending release status, got {other:?}"),
    }
}

#[tokio::test]
async fn resolved_step_cannot_be_decided_twice() {
    let (workflow, _notifier) = setup().await;
    let view = workflow
        .submit(Uuid::new_v4(), "cmp-1", Uuid::new_v4(), &[Admin, Client], None)
        .await
        .unwrap();

    workflow
        .approve(view.id, 1, Uuid::new_v4(), Admin, None)
        .await
        .unwrap();
    let err = workflow
        .approve(view.id, 1, Uuid::new_v4(), Admin, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyResolved { .. }));
}

#[tokio::test]
async fn concurrent_decisions_on_one_step_resolve_once() {
    let (workflow, _notifier) = setup().await;
    let view = workflow
        .submit(Uuid::new_v4(), "cmp-1", Uuid::new_v4(), &[Admin, Client], None)
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        workflow.approve(view.id, 1, Uuid::new_v4(), Admin, None),
        workflow.reject(view.id, 1, Uuid::new_v4(), Admin, "no"),
    );

    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let loser = if first.is_ok() {
        second.unwrap_err()
    } else {
        first.unwrap_err()
    };
    assert!(matches!(loser, GovernanceError::AlreadyResolved { .. }));

    // Exactly one decision reached the ledger.
    assert_eq!(workflow.history(view.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn pending_queue_only_shows_the_actionable_step() {
    let (workflow, _notifier) = setup().await;
    let tenant = Uuid::new_v4();
    let user = Uuid::new_v4();

    let waiting_on_manager = workflow
        .submit(tenant, "cmp-1", Uuid::new_v4(), &[AccountManager, Client], None)
        .await
        .unwrap();
    let waiting_on_client = workflow
        .submit(tenant, "cmp-2", Uuid::new_v4(), &[AccountManager, Client], None)
        .await
        .unwrap();
    workflow
        .approve(waiting_on_client.id, 1, Uuid::new_v4(), AccountManager, None)
        .await
        .unwrap();
    let finished = workflow
        .submit(tenant, "cmp-3", Uuid::new_v4(), &[Client], None)
        .await
        .unwrap();
    workflow
        .approve(finished.id, 1, Uuid::new_v4(), Client, None)
        .await
        .unwrap();

    let manager_queue: Vec<Uuid> = workflow
        .pending_approvals_for(user, AccountManager)
        .await
        .unwrap()
        .into_iter()
        .map(|view| view.id)
        .collect();
    assert_eq!(manager_queue, vec![waiting_on_manager.id]);

    let client_queue: Vec<Uuid> = workflow
        .pending_approvals_for(user, Client)
        .await
        .unwrap()
        .into_iter()
        .map(|view| view.id)
        .collect();
    assert_eq!(client_queue, vec![waiting_on_client.id]);

    assert!(
        workflow
            .pending_approvals_for(user, Admin)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn release_status_follows_the_newest_approval() {
    let (workflow, _notifier) = setup().await;
    let tenant = Uuid::new_v4();
    let mut last = None;
    for _ in 0..3 {
        let view = workflow
            .submit(tenant, "cmp-7", Uuid::new_v4(), &[Admin], None)
            .await
            .unwrap();
        workflow
            .reject(view.id, 1, Uuid::new_v4(), Admin, "not yet")
            .await
            .unwrap();
        last = Some(view.id);
    }
    assert_eq!(
        workflow.release_status(tenant, "cmp-7").await.unwrap(),
        ReleaseStatus::Rejected {
            approval_id: last.unwrap()
        }
    );

    let approved = workflow
        .submit(tenant, "cmp-7", Uuid::new_v4(), &[Admin], None)
        .await
        .unwrap();
    workflow
        .approve(approved.id, 1, Uuid::new_v4(), Admin, None)
        .await
        .unwrap();
    assert_eq!(
        workflow.release_status(tenant, "cmp-7").await.unwrap(),
        ReleaseStatus::Approved {
            approval_id: approved.id
        }
    );
}

#[tokio::test]
async fn unknown_approval_is_not_found() {
    let (workflow, _notifier) = setup().await;
    let missing = Uuid::new_v4();

    assert!(matches!(
        workflow.get(missing).await.unwrap_err(),
        GovernanceError::NotFound { .. }
    ));
    assert!(matches!(
        workflow.history(missing).await.unwrap_err(),
        GovernanceError::NotFound { .. }
    ));
    assert!(matches!(
        workflow
            .approve(missing, 1, Uuid::new_v4(), Admin, None)
            .await
            .unwrap_err(),
        GovernanceError::NotFound { .. }
    ));
    assert_eq!(
        workflow
            .release_status(Uuid::new_v4(), "cmp-x")
            .await
            .unwrap(),
        ReleaseStatus::NotSubmitted
    );
}
