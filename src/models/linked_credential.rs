//! Linked credential entity model
//!
//! One OAuth grant held by a principal: an administrator holding the manager hierarchy,
//! or a tenant linking a standalone advertiser account. Rows are never hard-deleted;
//! unlinking flips `status` to `disconnected`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "linked_credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owner of the credential; unique across the table
    #[sea_orm(unique)]
    pub principal_id: Uuid,

    pub principal_kind: PrincipalKind,

    pub status: CredentialStatus,

    /// AES-GCM ciphertext (see `crypto::encrypt_token`)
    pub access_token_ciphertext: Vec<u8>,

    pub refresh_token_ciphertext: Option<Vec<u8>>,

    pub expires_at: DateTimeUtc,

    /// Manager customer id sent as the login header for hierarchy calls
    pub login_customer_id: Option<String>,

    /// At most one manager credential carries this flag
    pub is_primary: bool,

    pub connected_at: DateTimeUtc,

    pub created_at: DateTimeUtc,

    /// Also serves as the compare-and-set token for refresh writes
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn is_connected(&self) -> bool {
        self.status == CredentialStatus::Connected
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// Administrator linking the manager (MCC) hierarchy
    #[sea_orm(string_value = "manager")]
    Manager,
    /// Tenant linking a standalone advertiser account
    #[sea_orm(string_value = "tenant")]
    Tenant,
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
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    #[sea_orm(string_value = "connected")]
    #[default]
    Connected,
    #[sea_orm(string_value = "disconnected")]
    Disconnected,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
