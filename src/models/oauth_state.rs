//! # OAuth State Model
//!
//! Single-use CSRF state for the credential link flow.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

use super::linked_credential::PrincipalKind;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Principal the resulting credential will belong to
    pub principal_id: Uuid,

    pub principal_kind: PrincipalKind,

    #[sea_orm(unique)]
    pub state: String,

    /// Redirect URI sent on the authorize request; must be repeated on code exchange
    pub redirect_uri: String,

    pub expires_at: DateTimeUtc,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
