//! # Permission Grant Model
//!
//! The authorization record mapping a (tenant, advertiser account) pair to a capability
//! set. Capabilities are stored as three independent booleans; `admin` does not imply
//! `write`, and `write` does not imply `read`.

use std::fmt;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "permission_grants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// External advertiser account identifier on the ads platform
    pub advertiser_account_id: String,

    pub can_read: bool,
    pub can_write: bool,
    pub can_admin: bool,

    /// Soft-disable flag; cleared on unlink, set again on re-link
    pub active: bool,

    /// Manager credential owning the account's hierarchy, when known
    pub manager_principal_id: Option<Uuid>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            read: self.can_read,
            write: self.can_write,
            admin: self.can_admin,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// A single capability an operation may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Read,
    Write,
    Admin,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Admin => "admin",
        })
    }
}

/// Full capability set of a grant. Always replaced as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct CapabilitySet {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub admin: bool,
}

impl CapabilitySet {
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Read => self.read,
            Capability::Write => self.write,
            Capability::Admin => self.admin,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.read || self.write || self.admin)
    }
}
