// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::Task;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use thiserror::Error;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 幂等键已被其他任务占用
    #[error("Duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),
    /// 任务已处于终止状态，不可再修改
    #[error("Task {0} is already terminal")]
    TerminalTask(i64),
}

/// 各状态的任务数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub scheduled: u64,
    pub leased: u64,
    pub completed: u64,
    pub dead: u64,
}

/// 任务仓库特质
///
/// 所有修改操作对其涉及的行都是原子的。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 插入新任务（`id` 为空）或更新已有任务
    async fn save(&self, task: &Task) -> Result<Task, RepositoryError>;
    /// 原子地租用到期最早的可执行任务
    async fn lease_next(&self, runner_id: &str) -> Result<Option<Task>, RepositoryError>;
    /// 写回失败结果（重新排期或死信）并释放租约
    ///
    /// 仅当该行仍由 `runner_id` 持有时才写入；返回 `false` 表示租约已丢失，
    /// 此时不做任何修改
    async fn settle_failure(&self, task: &Task, runner_id: &str) -> Result<bool, RepositoryError>;
    /// 标记任务已完成
    async fn mark_completed(&self, id: i64) -> Result<(), RepositoryError>;
    /// 刷新某执行器持有的全部租约的心跳
    async fn update_heartbeat(&self, runner_id: &str) -> Result<u64, RepositoryError>;
    /// 回收心跳早于阈值的租约
    async fn reclaim_stale(&self, threshold: DateTime<Utc>) -> Result<u64, RepositoryError>;
    /// 当前是否存在可执行任务
    async fn has_pending(&self) -> Result<bool, RepositoryError>;
    /// 根据ID查找任务
    async fn find_by_id(&self, id: i64) -> Result<Option<Task>, RepositoryError>;
    /// 查询死信任务，最新的在前
    async fn find_dead(&self, limit: u64) -> Result<Vec<Task>, RepositoryError>;
    /// 统计各状态的任务数量
    async fn count_by_state(&self) -> Result<QueueCounts, RepositoryError>;
}
