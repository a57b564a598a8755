use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApprovalHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApprovalHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ApprovalHistory::ApprovalId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ApprovalHistory::StepNumber).integer().null())
                    .col(ColumnDef::new(ApprovalHistory::Action).text().not_null())
                    .col(ColumnDef::new(ApprovalHistory::ActorId).uuid().not_null())
                    .col(ColumnDef::new(ApprovalHistory::ActorRole).text().null())
                    .col(ColumnDef::new(ApprovalHistory::Comment).text().null())
                    .col(
                        ColumnDef::new(ApprovalHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_approval_history_approval_id")
                            .from(ApprovalHistory::Table, ApprovalHistory::ApprovalId)
                            .to(CampaignApprovals::Table, CampaignApprovals::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_approval_history_approval_created")
                    .table(ApprovalHistory::Table)
                    .col(ApprovalHistory::ApprovalId)
                    .col(ApprovalHistory::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ApprovalHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ApprovalHistory {
    #[sea_orm(iden = "approval_history")]
    Table,
    Id,
    ApprovalId,
    StepNumber,
    Action,
    ActorId,
    ActorRole,
    Comment,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CampaignApprovals {
    Table,
    Id,
}
