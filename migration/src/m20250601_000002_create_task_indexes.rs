// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

use crate::m20250601_000001_create_tasks::Tasks;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Lease acquisition scans by due time
        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_next_run_at")
                    .table(Tasks::Table)
                    .col(Tasks::NextRunAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_started_at")
                    .table(Tasks::Table)
                    .col(Tasks::StartedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_executor_instance_id")
                    .table(Tasks::Table)
                    .col(Tasks::ExecutorInstanceId)
                    .to_owned(),
            )
            .await?;

        // NULLs never collide, so unhashed tasks are unconstrained
        manager
            .create_index(
                Index::create()
                    .name("uq_tasks_optional_hash")
                    .table(Tasks::Table)
                    .col(Tasks::OptionalHash)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "uq_tasks_optional_hash",
            "idx_tasks_executor_instance_id",
            "idx_tasks_started_at",
            "idx_tasks_next_run_at",
        ] {
            manager
                .drop_index(Index::drop().name(name).table(Tasks::Table).to_owned())
                .await?;
        }

        Ok(())
    }
}
