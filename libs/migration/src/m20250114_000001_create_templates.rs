use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Templates::Table)
                    .if_not_exists()
                    .col(pk_uuid(Templates::Id))
                    .col(string(Templates::Code))
                    .col(string(Templates::Type))
                    .col(string(Templates::Language))
                    .col(integer(Templates::Version))
                    .col(ColumnDef::new(Templates::Content).json_binary().not_null())
                    .col(
                        ColumnDef::new(Templates::Variables)
                            .array(ColumnType::Text)
                            .not_null()
                            .default(Expr::cust("ARRAY[]::TEXT[]")),
                    )
                    .col(
                        timestamp_with_time_zone(Templates::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per (code, language, version); versions form 1..N
        manager
            .create_index(
                Index::create()
                    .name("idx_templates_code_language_version")
                    .table(Templates::Table)
                    .col(Templates::Code)
                    .col(Templates::Language)
                    .col(Templates::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Templates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Templates {
    Table,
    Id,
    Code,
    Type,
    Language,
    Version,
    Content,
    Variables,
    CreatedAt,
}
