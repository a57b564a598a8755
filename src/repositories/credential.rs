//! Linked credential repository
//!
//! Token columns hold ciphertext only; encryption and decryption happen in the token vault.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict, Query};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::models::linked_credential::{
    self, CredentialStatus, Entity as LinkedCredential, PrincipalKind,
};

/// Encrypted token material for a single write.
#[derive(Clone)]
pub struct SealedTokens {
    pub access_token_ciphertext: Vec<u8>,
    /// `None` keeps whatever refresh token is already stored
    pub refresh_token_ciphertext: Option<Vec<u8>>,
    pub expires_at: DateTime<Utc>,
}

/// Repository for linked credential rows
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    db: Arc<DatabaseConnection>,
}

impl CredentialRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<linked_credential::Model>, DbErr> {
        LinkedCredential::find()
            .filter(linked_credential::Column::PrincipalId.eq(principal_id))
            .one(&*self.db)
            .await
    }

    /// Insert or replace the principal's credential in one statement. A disconnected row is
    /// reconnected in place; the row id and `created_at` survive.
    pub async fn upsert(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        tokens: SealedTokens,
        login_customer_id: Option<String>,
    ) -> Result<linked_credential::Model, DbErr> {
        let now = Utc::now();
        let keep_refresh_token = tokens.refresh_token_ciphertext.is_none();

        let row = linked_credential::ActiveModel {
            id: Set(Uuid::new_v4()),
            principal_id: Set(principal_id),
            principal_kind: Set(kind),
            status: Set(CredentialStatus::Connected),
            access_token_ciphertext: Set(tokens.access_token_ciphertext),
            refresh_token_ciphertext: Set(tokens.refresh_token_ciphertext),
            expires_at: Set(tokens.expires_at),
            login_customer_id: Set(login_customer_id),
            is_primary: Set(false),
            connected_at: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let mut update_columns = vec![
            linked_credential::Column::PrincipalKind,
            linked_credential::Column::Status,
            linked_credential::Column::AccessTokenCiphertext,
            linked_credential::Column::ExpiresAt,
            linked_credential::Column::LoginCustomerId,
            linked_credential::Column::ConnectedAt,
            linked_credential::Column::UpdatedAt,
        ];
        if !keep_refresh_token {
            update_columns.push(linked_credential::Column::RefreshTokenCiphertext);
        }

        LinkedCredential::insert(row)
            .on_conflict(
                OnConflict::column(linked_credential::Column::PrincipalId)
                    .update_columns(update_columns)
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        self.find_by_principal(principal_id)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("credential for {}", principal_id)))
    }

    /// Write refreshed tokens only if the row still carries `prior_updated_at`.
    /// Returns `false` when another writer got there first.
    pub async fn update_tokens_if_unchanged(
        &self,
        principal_id: Uuid,
        prior_updated_at: DateTime<Utc>,
        tokens: SealedTokens,
    ) -> Result<bool, DbErr> {
        let mut update = LinkedCredential::update_many()
            .col_expr(
                linked_credential::Column::AccessTokenCiphertext,
                Expr::value(tokens.access_token_ciphertext),
            )
            .col_expr(
                linked_credential::Column::ExpiresAt,
                Expr::value(tokens.expires_at),
            )
            .col_expr(linked_credential::Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(refresh) = tokens.refresh_token_ciphertext {
            update = update.col_expr(
                linked_credential::Column::RefreshTokenCiphertext,
                Expr::value(refresh),
            );
        }

        let result = update
            .filter(linked_credential::Column::PrincipalId.eq(principal_id))
            .filter(linked_credential::Column::UpdatedAt.eq(prior_updated_at))
            .filter(linked_credential::Column::Status.eq(CredentialStatus::Connected))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Flip the row to disconnected and drop its primary flag, so the next manager to link
    /// can claim it. Returns whether a connected row was changed.
    pub async fn mark_disconnected(&self, principal_id: Uuid) -> Result<bool, DbErr> {
        let result = LinkedCredential::update_many()
            .col_expr(
                linked_credential::Column::Status,
                Expr::value(CredentialStatus::Disconnected),
            )
            .col_expr(linked_credential::Column::IsPrimary, Expr::value(false))
            .col_expr(linked_credential::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(linked_credential::Column::PrincipalId.eq(principal_id))
            .filter(linked_credential::Column::Status.eq(CredentialStatus::Connected))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Mark the manager credential primary when no row holds the flag yet.
    pub async fn claim_primary_if_unset(&self, principal_id: Uuid) -> Result<bool, DbErr> {
        let existing_primary = Query::select()
            .expr(Expr::val(1))
            .from(LinkedCredential)
            .and_where(linked_credential::Column::IsPrimary.eq(true))
            .to_owned();

        let result = LinkedCredential::update_many()
            .col_expr(linked_credential::Column::IsPrimary, Expr::value(true))
            .filter(linked_credential::Column::PrincipalId.eq(principal_id))
            .filter(linked_credential::Column::PrincipalKind.eq(PrincipalKind::Manager))
            .filter(
                Condition::all()
                    .add(Expr::exists(existing_primary))
                    .not(),
            )
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Move the primary flag onto `principal_id`. Both writes share one transaction; nothing
    /// changes when the principal holds no connected manager credential.
    pub async fn set_primary(&self, principal_id: Uuid) -> Result<bool, DbErr> {
        let txn = self.db.begin().await?;

        LinkedCredential::update_many()
            .col_expr(linked_credential::Column::IsPrimary, Expr::value(false))
            .filter(linked_credential::Column::IsPrimary.eq(true))
            .filter(linked_credential::Column::PrincipalId.ne(principal_id))
            .exec(&txn)
            .await?;

        let result = LinkedCredential::update_many()
            .col_expr(linked_credential::Column::IsPrimary, Expr::value(true))
            .filter(linked_credential::Column::PrincipalId.eq(principal_id))
            .filter(linked_credential::Column::PrincipalKind.eq(PrincipalKind::Manager))
            .filter(linked_credential::Column::Status.eq(CredentialStatus::Connected))
            .exec(&txn)
            .await?;

        if result.rows_affected == 1 {
            txn.commit().await?;
            Ok(true)
        } else {
            txn.rollback().await?;
            Ok(false)
        }
    }

    pub async fn find_primary_manager(&self) -> Result<Option<linked_credential::Model>, DbErr> {
        LinkedCredential::find()
            .filter(linked_credential::Column::IsPrimary.eq(true))
            .filter(linked_credential::Column::PrincipalKind.eq(PrincipalKind::Manager))
            .order_by_asc(linked_credential::Column::ConnectedAt)
            .one(&*self.db)
            .await
    }
}
