//! # OAuth State Repository
//!
//! Single-use CSRF state for the credential link flow.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::models::linked_credential::PrincipalKind;
use crate::models::oauth_state::{self, ActiveModel, Entity, Model};

/// Repository for OAuth state database operations
#[derive(Debug, Clone)]
pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Persist a new state token valid for `ttl`
    pub async fn create(
        &self,
        principal_id: Uuid,
        principal_kind: PrincipalKind,
        state: &str,
        redirect_uri: &str,
        ttl: Duration,
    ) -> Result<Model, DbErr> {
        let now = Utc::now();
        let model = Model {
            id: Uuid::new_v4(),
            principal_id,
            principal_kind,
            state: state.to_string(),
            redirect_uri: redirect_uri.to_string(),
            expires_at: now + ttl,
            created_at: now,
        };

        let row = ActiveModel {
            id: Set(model.id),
            principal_id: Set(model.principal_id),
            principal_kind: Set(model.principal_kind),
            state: Set(model.state.clone()),
            redirect_uri: Set(model.redirect_uri.clone()),
            expires_at: Set(model.expires_at),
            created_at: Set(model.created_at),
        };
        Entity::insert(row).exec_without_returning(&*self.db).await?;

        Ok(model)
    }

    /// Consume a state token. Only the caller whose delete removes the row wins, so a
    /// replayed callback sees `None`. Expired rows are removed but never returned.
    pub async fn consume(&self, state: &str) -> Result<Option<Model>, DbErr> {
        let Some(found) = Entity::find()
            .filter(oauth_state::Column::State.eq(state))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        let deleted = Entity::delete_many()
            .filter(oauth_state::Column::Id.eq(found.id))
            .exec(&*self.db)
            .await?;

        if deleted.rows_affected != 1 || found.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(found))
    }

    /// Delete every expired state. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> Result<u64, DbErr> {
        let result = Entity::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lte(Utc::now()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
