use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuditLogs::Table)
                    .if_not_exists()
                    .col(pk_uuid(AuditLogs::Id))
                    .col(string(AuditLogs::TraceId))
                    .col(uuid(AuditLogs::UserId))
                    .col(string(AuditLogs::NotificationType))
                    .col(string(AuditLogs::TemplateCode))
                    .col(string(AuditLogs::Status))
                    .col(text_null(AuditLogs::ErrorMessage))
                    .col(
                        ColumnDef::new(AuditLogs::Metadata)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::JSONB")),
                    )
                    .col(
                        timestamp_with_time_zone(AuditLogs::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_trace_id")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::TraceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_user_id")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_status")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_created_at")
                    .table(AuditLogs::Table)
                    .col((AuditLogs::CreatedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AuditLogs {
    Table,
    Id,
    TraceId,
    UserId,
    NotificationType,
    TemplateCode,
    Status,
    ErrorMessage,
    Metadata,
    CreatedAt,
}
