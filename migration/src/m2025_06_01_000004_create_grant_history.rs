use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GrantHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GrantHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GrantHistory::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(GrantHistory::AdvertiserAccountId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GrantHistory::Action).text().not_null())
                    .col(ColumnDef::new(GrantHistory::CanRead).boolean().not_null())
                    .col(ColumnDef::new(GrantHistory::CanWrite).boolean().not_null())
                    .col(ColumnDef::new(GrantHistory::CanAdmin).boolean().not_null())
                    .col(ColumnDef::new(GrantHistory::ActorId).uuid().null())
                    .col(
                        ColumnDef::new(GrantHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_grant_history_account_created")
                    .table(GrantHistory::Table)
                    .col(GrantHistory::AdvertiserAccountId)
                    .col(GrantHistory::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GrantHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GrantHistory {
    #[sea_orm(iden = "grant_history")]
    Table,
    Id,
    TenantId,
    AdvertiserAccountId,
    Action,
    CanRead,
    CanWrite,
    CanAdmin,
    ActorId,
    CreatedAt,
}
