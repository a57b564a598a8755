//! Migration to create the campaign_approvals table.
//!
//! `pending_campaign_id` mirrors `campaign_id` while the approval is pending and is cleared on
//! resolution, so the unique index admits one open approval per campaign and any number of
//! resolved ones (NULLs never collide).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CampaignApprovals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CampaignApprovals::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CampaignApprovals::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(CampaignApprovals::CampaignId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CampaignApprovals::PendingCampaignId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CampaignApprovals::AdvertiserAccountId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CampaignApprovals::SubmitterId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CampaignApprovals::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(CampaignApprovals::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CampaignApprovals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CampaignApprovals::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CampaignApprovals::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaign_approvals_pending_campaign")
                    .table(CampaignApprovals::Table)
                    .col(CampaignApprovals::TenantId)
                    .col(CampaignApprovals::PendingCampaignId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaign_approvals_tenant_campaign")
                    .table(CampaignApprovals::Table)
                    .col(CampaignApprovals::TenantId)
                    .col(CampaignApprovals::CampaignId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaign_approvals_status")
                    .table(CampaignApprovals::Table)
                    .col(CampaignApprovals::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CampaignApprovals::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CampaignApprovals {
    Table,
    Id,
    TenantId,
    CampaignId,
    PendingCampaignId,
    AdvertiserAccountId,
    SubmitterId,
    Status,
    Version,
    CreatedAt,
    UpdatedAt,
    ResolvedAt,
}
