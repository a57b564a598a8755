use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApprovalSteps::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApprovalSteps::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ApprovalSteps::ApprovalId).uuid().not_null())
                    .col(
                        ColumnDef::new(ApprovalSteps::StepNumber)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApprovalSteps::RequiredRole)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApprovalSteps::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(ApprovalSteps::Comment).text().null())
                    .col(ColumnDef::new(ApprovalSteps::ResolvedBy).uuid().null())
                    .col(
                        ColumnDef::new(ApprovalSteps::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_approval_steps_approval_id")
                            .from(ApprovalSteps::Table, ApprovalSteps::ApprovalId)
                            .to(CampaignApprovals::Table, CampaignApprovals::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_approval_steps_approval_step")
                    .table(ApprovalSteps::Table)
                    .col(ApprovalSteps::ApprovalId)
                    .col(ApprovalSteps::StepNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ApprovalSteps::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ApprovalSteps {
    Table,
    Id,
    ApprovalId,
    StepNumber,
    RequiredRole,
    Status,
    Comment,
    ResolvedBy,
    ResolvedAt,
}

#[derive(DeriveIden)]
enum CampaignApprovals {
    Table,
    Id,
}
