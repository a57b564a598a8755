//! # Approval Step Model
//!
//! One role-gated checkpoint of a campaign approval. Steps are numbered from 1 and
//! resolved strictly in ascending order.

use std::fmt;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use super::campaign_approval::ApprovalStatus as StepStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "approval_steps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub approval_id: Uuid,

    pub step_number: i32,

    pub required_role: ApproverRole,

    /// Leaves `pending` at most once
    pub status: StepStatus,

    pub comment: Option<String>,

    pub resolved_by: Option<Uuid>,

    pub resolved_at: Option<DateTimeUtc>,
}

/// Roles of the host application that can sign off a step.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApproverRole {
    #[sea_orm(string_value = "ADMIN")]
    Admin,
    #[sea_orm(string_value = "ACCOUNT_MANAGER")]
    AccountManager,
    #[sea_orm(string_value = "CLIENT")]
    Client,
}

impl ApproverRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ApproverRole::Admin => "ADMIN",
            ApproverRole::AccountManager => "ACCOUNT_MANAGER",
            ApproverRole::Client => "CLIENT",
        }
    }
}

impl fmt::Display for ApproverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApproverRole {
    type Err = String;

    /// Accepts the canonical names case-insensitively, with `-` or `_` separators.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "ADMIN" => Ok(ApproverRole::Admin),
            "ACCOUNT_MANAGER" => Ok(ApproverRole::AccountManager),
            "CLIENT" => Ok(ApproverRole::Client),
            other => Err(format!("unknown approver role '{}'", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::campaign_approval::Entity",
        from = "Column::ApprovalId",
        to = "super::campaign_approval::Column::Id"
    )]
    Approval,
}

impl Related<super::campaign_approval::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Approval.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
