use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TimeSeries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TimeSeries::Id).text().not_null().primary_key())
                    // whole series as a single document: `[{"timestamp": .., "value": ..}]`
                    .col(ColumnDef::new(TimeSeries::Entries).json_binary().not_null())
                    .col(
                        ColumnDef::new(TimeSeries::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TimeSeries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TimeSeries {
    Table,
    Id,
    Entries,
    UpdatedAt,
}
