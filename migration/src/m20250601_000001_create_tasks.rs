// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tasks::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tasks::TaskType).string().not_null())
                    .col(ColumnDef::new(Tasks::Payload).blob().not_null())
                    .col(
                        ColumnDef::new(Tasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Tasks::NextRunAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Tasks::StartedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Tasks::FailCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Tasks::ErrorMessage).text())
                    .col(ColumnDef::new(Tasks::ErrorStackTrace).text())
                    .col(
                        ColumnDef::new(Tasks::Completed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Tasks::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Tasks::Dead)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Tasks::OptionalHash).string())
                    .col(ColumnDef::new(Tasks::ExecutorInstanceId).string())
                    .col(ColumnDef::new(Tasks::Heartbeat).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Tasks {
    Table,
    Id,
    TaskType,
    Payload,
    CreatedAt,
    NextRunAt,
    StartedAt,
    FailCount,
    ErrorMessage,
    ErrorStackTrace,
    Completed,
    CompletedAt,
    Dead,
    OptionalHash,
    ExecutorInstanceId,
    Heartbeat,
}
