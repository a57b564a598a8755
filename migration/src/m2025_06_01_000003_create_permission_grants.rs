//! Migration to create the permission_grants table.
//!
//! Exactly one row per (tenant, advertiser account) pair; re-granting updates the row in place.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PermissionGrants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PermissionGrants::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PermissionGrants::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(PermissionGrants::AdvertiserAccountId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PermissionGrants::CanRead)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PermissionGrants::CanWrite)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PermissionGrants::CanAdmin)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PermissionGrants::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(PermissionGrants::ManagerPrincipalId)
                            .uuid()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PermissionGrants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PermissionGrants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_permission_grants_tenant_account")
                    .table(PermissionGrants::Table)
                    .col(PermissionGrants::TenantId)
                    .col(PermissionGrants::AdvertiserAccountId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Revocation is keyed by account across all tenants.
        manager
            .create_index(
                Index::create()
                    .name("idx_permission_grants_account")
                    .table(PermissionGrants::Table)
                    .col(PermissionGrants::AdvertiserAccountId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_permission_grants_tenant_account")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_permission_grants_account").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(PermissionGrants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PermissionGrants {
    Table,
    Id,
    TenantId,
    AdvertiserAccountId,
    CanRead,
    CanWrite,
    CanAdmin,
    Active,
    ManagerPrincipalId,
    CreatedAt,
    UpdatedAt,
}
