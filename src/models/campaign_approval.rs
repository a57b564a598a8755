//! # Campaign Approval Model
//!
//! One governance workflow instance per campaign. Terminal once `status` leaves
//! `pending`; `version` increments on every transition and guards concurrent writers.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "campaign_approvals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// External campaign reference
    pub campaign_id: String,

    /// Equals `campaign_id` while pending, `None` once resolved. Backs the
    /// one-open-approval-per-campaign unique index.
    pub pending_campaign_id: Option<String>,

    /// Advertiser account the campaign will be pushed to, when known at submission
    pub advertiser_account_id: Option<String>,

    pub submitter_id: Uuid,

    pub status: ApprovalStatus,

    pub version: i32,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,

    pub resolved_at: Option<DateTimeUtc>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::approval_step::Entity")]
    Steps,
}

impl Related<super::approval_step::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Steps.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
