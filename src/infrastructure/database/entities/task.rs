// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub task_type: String,
    pub payload: Vec<u8>,
    pub created_at: ChronoDateTimeUtc,
    pub next_run_at: Option<ChronoDateTimeUtc>,
    pub started_at: Option<ChronoDateTimeUtc>,
    pub fail_count: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_stack_trace: Option<String>,
    pub completed: bool,
    pub completed_at: Option<ChronoDateTimeUtc>,
    pub dead: bool,
    #[sea_orm(unique)]
    pub optional_hash: Option<String>,
    pub executor_instance_id: Option<String>,
    pub heartbeat: Option<ChronoDateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
