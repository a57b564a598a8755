//! Migration to create the linked_credentials table.
//!
//! One row per linking principal (a manager-hierarchy holder or a standalone tenant).
//! Token columns hold AES-GCM ciphertext; rows are never hard-deleted.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LinkedCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LinkedCredentials::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::PrincipalId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::PrincipalKind)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::Status)
                            .text()
                            .not_null()
                            .default("connected"),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::AccessTokenCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::RefreshTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::LoginCustomerId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::IsPrimary)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::ConnectedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(LinkedCredentials::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one credential per principal; upserts conflict on this index.
        manager
            .create_index(
                Index::create()
                    .name("idx_linked_credentials_principal_id")
                    .table(LinkedCredentials::Table)
                    .col(LinkedCredentials::PrincipalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_linked_credentials_principal_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(LinkedCredentials::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LinkedCredentials {
    Table,
    Id,
    PrincipalId,
    PrincipalKind,
    Status,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    ExpiresAt,
    LoginCustomerId,
    IsPrimary,
    ConnectedAt,
    CreatedAt,
    UpdatedAt,
}
