//! # Audit Ledger
//!
//! Append-only writers for grant and approval history. Writers take any connection so they
//! run inside the transaction of the change they record; rows are never updated or deleted.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use uuid::Uuid;

use crate::models::approval_history::{self, ApprovalAction, Entity as ApprovalHistory};
use crate::models::approval_step::ApproverRole;
use crate::models::grant_history::{self, Entity as GrantHistory, GrantAction};
use crate::models::permission_grant::CapabilitySet;

/// One approval transition to record.
#[derive(Debug, Clone)]
pub struct ApprovalEntry {
    pub approval_id: Uuid,
    pub step_number: Option<i32>,
    pub action: ApprovalAction,
    pub actor_id: Uuid,
    pub actor_role: Option<ApproverRole>,
    pub comment: Option<String>,
}

pub async fn append_grant_entry<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    advertiser_account_id: &str,
    action: GrantAction,
    capabilities: CapabilitySet,
    actor_id: Option<Uuid>,
) -> Result<grant_history::Model, DbErr> {
    let model = grant_history::Model {
        id: Uuid::new_v4(),
        tenant_id,
        advertiser_account_id: advertiser_account_id.to_string(),
        action,
        can_read: capabilities.read,
        can_write: capabilities.write,
        can_admin: capabilities.admin,
        actor_id,
        created_at: Utc::now(),
    };

    GrantHistory::insert(grant_history::ActiveModel {
        id: Set(model.id),
        tenant_id: Set(model.tenant_id),
        advertiser_account_id: Set(model.advertiser_account_id.clone()),
        action: Set(model.action),
        can_read: Set(model.can_read),
        can_write: Set(model.can_write),
        can_admin: Set(model.can_admin),
        actor_id: Set(model.actor_id),
        created_at: Set(model.created_at),
    })
    .exec_without_returning(conn)
    .await?;

    Ok(model)
}

pub async fn append_approval_entry<C: ConnectionTrait>(
    conn: &C,
    entry: ApprovalEntry,
) -> Result<approval_history::Model, DbErr> {
    let model = approval_history::Model {
        id: Uuid::new_v4(),
        approval_id: entry.approval_id,
        step_number: entry.step_number,
        action: entry.action,
        actor_id: entry.actor_id,
        actor_role: entry.actor_role,
        comment: entry.comment,
        created_at: Utc::now(),
    };

    ApprovalHistory::insert(approval_history::ActiveModel {
        id: Set(model.id),
        approval_id: Set(model.approval_id),
        step_number: Set(model.step_number),
        action: Set(model.action),
        actor_id: Set(model.actor_id),
        actor_role: Set(model.actor_role),
        comment: Set(model.comment.clone()),
        created_at: Set(model.created_at),
    })
    .exec_without_returning(conn)
    .await?;

    Ok(model)
}

/// Read side of the ledger
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    db: Arc<DatabaseConnection>,
}

impl HistoryRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Every grant change for the account across tenants, oldest first
    pub async fn grant_history(
        &self,
        advertiser_account_id: &str,
    ) -> Result<Vec<grant_history::Model>, DbErr> {
        GrantHistory::find()
            .filter(grant_history::Column::AdvertiserAccountId.eq(advertiser_account_id))
            .order_by_asc(grant_history::Column::CreatedAt)
            .order_by_asc(grant_history::Column::TenantId)
            .all(&*self.db)
            .await
    }

    /// Transitions of one approval, oldest first
    pub async fn approval_history(
        &self,
        approval_id: Uuid,
    ) -> Result<Vec<approval_history::Model>, DbErr> {
        let mut rows = ApprovalHistory::find()
            .filter(approval_history::Column::ApprovalId.eq(approval_id))
            .order_by_asc(approval_history::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        // Entries written in the same transaction can share a timestamp; submission sorts first.
        rows.sort_by_key(|row| (row.created_at, row.step_number.unwrap_or(0)));
        Ok(rows)
    }
}
