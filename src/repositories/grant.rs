//! # Permission Grant Store
//!
//! Authoritative mapping of (tenant, advertiser account) to a capability set. One row per
//! pair: re-granting replaces the whole capability set in place and reactivates the row.
//!
//! `revoke` is keyed by advertiser account alone and deactivates every tenant's grant to it.
//! Unlinking an advertiser account from the agency removes all access to that account; there
//! is no per-tenant revoke.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::GovernanceError;
use crate::models::grant_history::GrantAction;
use crate::models::permission_grant::{self, CapabilitySet, Entity as PermissionGrant};
use crate::notify::{GovernanceEvent, Notifier};
use crate::repositories::history::append_grant_entry;

#[derive(Clone)]
pub struct GrantStore {
    db: Arc<DatabaseConnection>,
    notifier: Arc<dyn Notifier>,
}

impl GrantStore {
    pub fn new(db: Arc<DatabaseConnection>, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Upsert the grant for the pair, always leaving it active with exactly `capabilities`.
    /// `manager_principal_id` is only overwritten when provided.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn grant(
        &self,
        tenant_id: Uuid,
        advertiser_account_id: &str,
        capabilities: CapabilitySet,
        manager_principal_id: Option<Uuid>,
        actor_id: Option<Uuid>,
    ) -> Result<permission_grant::Model, GovernanceError> {
        let account_id = normalize_account_id(advertiser_account_id)?;
        if capabilities.is_empty() {
            warn!(
                advertiser_account_id = %account_id,
                "Grant carries no capabilities; every access check on it will be denied"
            );
        }
        let now = Utc::now();

        let row = permission_grant::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            advertiser_account_id: Set(account_id.clone()),
            can_read: Set(capabilities.read),
            can_write: Set(capabilities.write),
            can_admin: Set(capabilities.admin),
            active: Set(true),
            manager_principal_id: Set(manager_principal_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let mut update_columns = vec![
            permission_grant::Column::CanRead,
            permission_grant::Column::CanWrite,
            permission_grant::Column::CanAdmin,
            permission_grant::Column::Active,
            permission_grant::Column::UpdatedAt,
        ];
        if manager_principal_id.is_some() {
            update_columns.push(permission_grant::Column::ManagerPrincipalId);
        }

        let txn = self.db.begin().await?;

        PermissionGrant::insert(row)
            .on_conflict(
                OnConflict::columns([
                    permission_grant::Column::TenantId,
                    permission_grant::Column::AdvertiserAccountId,
                ])
                .update_columns(update_columns)
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        let stored = PermissionGrant::find()
            .filter(permission_grant::Column::TenantId.eq(tenant_id))
            .filter(permission_grant::Column::AdvertiserAccountId.eq(account_id.as_str()))
            .one(&txn)
            .await?
            .ok_or_else(|| GovernanceError::not_found("permission_grant", &account_id))?;

        append_grant_entry(
            &txn,
            tenant_id,
            &account_id,
            GrantAction::Granted,
            capabilities,
            actor_id,
        )
        .await?;

        txn.commit().await?;

        info!(
            advertiser_account_id = %account_id,
            read = capabilities.read,
            write = capabilities.write,
            admin = capabilities.admin,
            "Grant assigned"
        );
        self.notifier.notify(GovernanceEvent::GrantAssigned {
            tenant_id,
            advertiser_account_id: account_id,
            capabilities,
            actor_id,
        });

        Ok(stored)
    }

    /// Deactivate every active grant on the account. Returns how many rows this call flipped;
    /// a repeat call returns 0.
    #[instrument(skip(self))]
    pub async fn revoke(
        &self,
        advertiser_account_id: &str,
        actor_id: Option<Uuid>,
    ) -> Result<u64, GovernanceError> {
        let account_id = normalize_account_id(advertiser_account_id)?;
        let txn = self.db.begin().await?;

        let active = PermissionGrant::find()
            .filter(permission_grant::Column::AdvertiserAccountId.eq(account_id.as_str()))
            .filter(permission_grant::Column::Active.eq(true))
            .all(&txn)
            .await?;

        let now = Utc::now();
        let mut revoked_tenants = Vec::with_capacity(active.len());
        for grant in active {
            // Per-row CAS keeps the ledger exact when two revokes race.
            let result = PermissionGrant::update_many()
                .col_expr(permission_grant::Column::Active, Expr::value(false))
                .col_expr(permission_grant::Column::UpdatedAt, Expr::value(now))
                .filter(permission_grant::Column::Id.eq(grant.id))
                .filter(permission_grant::Column::Active.eq(true))
                .exec(&txn)
                .await?;
            if result.rows_affected == 0 {
                continue;
            }

            append_grant_entry(
                &txn,
                grant.tenant_id,
                &account_id,
                GrantAction::Revoked,
                grant.capabilities(),
                actor_id,
            )
            .await?;
            revoked_tenants.push(grant.tenant_id);
        }

        txn.commit().await?;

        let count = revoked_tenants.len() as u64;
        info!(advertiser_account_id = %account_id, revoked = count, "Grants revoked");
        if count > 0 {
            self.notifier.notify(GovernanceEvent::GrantsRevoked {
                advertiser_account_id: account_id,
                tenant_ids: revoked_tenants,
                actor_id,
            });
        }

        Ok(count)
    }

    /// Active grants held by the tenant, ordered by account id
    pub async fn list_active_grants(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<permission_grant::Model>, GovernanceError> {
        Ok(PermissionGrant::find()
            .filter(permission_grant::Column::TenantId.eq(tenant_id))
            .filter(permission_grant::Column::Active.eq(true))
            .order_by_asc(permission_grant::Column::AdvertiserAccountId)
            .all(&*self.db)
            .await?)
    }

    /// The grant row for the pair regardless of its active flag
    pub async fn find(
        &self,
        tenant_id: Uuid,
        advertiser_account_id: &str,
    ) -> Result<Option<permission_grant::Model>, GovernanceError> {
        Ok(PermissionGrant::find()
            .filter(permission_grant::Column::TenantId.eq(tenant_id))
            .filter(permission_grant::Column::AdvertiserAccountId.eq(advertiser_account_id.trim()))
            .one(&*self.db)
            .await?)
    }
}

fn normalize_account_id(raw: &str) -> Result<String, GovernanceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GovernanceError::InvalidGrant(
            "advertiser_account_id must not be blank".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
