// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::Task;
use crate::domain::repositories::task_repository::{QueueCounts, RepositoryError, TaskRepository};
use crate::infrastructure::database::entities::task as task_entity;
use crate::utils::clock::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, LockBehavior, LockType},
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, DbBackend, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select, Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::debug;

/// 乐观租用时最多尝试的候选行数
const MAX_LEASE_ATTEMPTS: usize = 16;

/// 任务仓库实现
///
/// 基于SeaORM实现的任务数据访问层。
///
/// PostgreSQL 与 MySQL 使用 `FOR UPDATE SKIP LOCKED` 在事务内租用任务，
/// 并发调用者不会选中同一行，也不会等待其他调用者正在检查的行。
/// SQLite 没有行锁，改用带可租用条件的条件更新（比较并交换），
/// 落败时换下一个候选行重试。
#[derive(Clone)]
pub struct TaskRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
    /// 时钟
    clock: Arc<dyn Clock>,
}

impl TaskRepositoryImpl {
    /// 创建新的任务仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    /// 使用指定时钟创建任务仓库实例
    pub fn with_clock(db: Arc<DatabaseConnection>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// 在 `now` 时刻可租用的任务
    fn eligible(now: DateTime<Utc>) -> Select<task_entity::Entity> {
        task_entity::Entity::find()
            .filter(task_entity::Column::NextRunAt.lte(now))
            .filter(task_entity::Column::StartedAt.is_null())
            .filter(task_entity::Column::Completed.eq(false))
            .filter(task_entity::Column::Dead.eq(false))
            .order_by_asc(task_entity::Column::NextRunAt)
            .order_by_asc(task_entity::Column::Id)
    }

    /// 未终止的任务
    fn live() -> Condition {
        Condition::all()
            .add(task_entity::Column::Completed.eq(false))
            .add(task_entity::Column::Dead.eq(false))
    }

    async fn lease_with_skip_locked(
        &self,
        runner_id: &str,
    ) -> Result<Option<Task>, RepositoryError> {
        let now = self.clock.now();
        let txn = self.db.begin().await?;

        let task = Self::eligible(now)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(&txn)
            .await?;

        let Some(task) = task else {
            txn.commit().await?;
            return Ok(None);
        };

        let mut active: task_entity::ActiveModel = task.into();
        active.started_at = Set(Some(now));
        active.heartbeat = Set(Some(now));
        active.executor_instance_id = Set(Some(runner_id.to_string()));

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        debug!("Task {} leased by {}", updated.id, runner_id);
        Ok(Some(updated.into()))
    }

    async fn lease_with_compare_and_swap(
        &self,
        runner_id: &str,
    ) -> Result<Option<Task>, RepositoryError> {
        let now = self.clock.now();

        for _ in 0..MAX_LEASE_ATTEMPTS {
            let Some(candidate) = Self::eligible(now).one(self.db.as_ref()).await? else {
                return Ok(None);
            };

            let result = task_entity::Entity::update_many()
                .col_expr(task_entity::Column::StartedAt, Expr::value(Some(now)))
                .col_expr(task_entity::Column::Heartbeat, Expr::value(Some(now)))
                .col_expr(
                    task_entity::Column::ExecutorInstanceId,
                    Expr::value(Some(runner_id.to_string())),
                )
                .filter(task_entity::Column::Id.eq(candidate.id))
                .filter(task_entity::Column::NextRunAt.lte(now))
                .filter(task_entity::Column::StartedAt.is_null())
                .filter(Self::live())
                .exec(self.db.as_ref())
                .await?;

            if result.rows_affected == 1 {
                return self.find_by_id(candidate.id).await;
            }

            debug!("Task {} was leased concurrently, trying next", candidate.id);
        }

        Ok(None)
    }
}

/// 将唯一索引冲突转换为幂等键冲突
fn map_save_error(err: DbErr, task: &Task) -> RepositoryError {
    match (err.sql_err(), &task.optional_hash) {
        (Some(SqlErr::UniqueConstraintViolation(_)), Some(hash)) => {
            RepositoryError::DuplicateIdempotencyKey(hash.clone())
        }
        _ => RepositoryError::Database(err),
    }
}

impl From<task_entity::Model> for Task {
    fn from(model: task_entity::Model) -> Self {
        Self {
            id: Some(model.id),
            task_type: model.task_type,
            payload: model.payload,
            created_at: model.created_at,
            next_run_at: model.next_run_at,
            started_at: model.started_at,
            fail_count: model.fail_count,
            error_message: model.error_message,
            error_stack_trace: model.error_stack_trace,
            completed: model.completed,
            completed_at: model.completed_at,
            dead: model.dead,
            optional_hash: model.optional_hash,
            executor_instance_id: model.executor_instance_id,
            heartbeat: model.heartbeat,
        }
    }
}

impl From<Task> for task_entity::ActiveModel {
    fn from(task: Task) -> Self {
        Self {
            id: task.id.map(Set).unwrap_or(NotSet),
            task_type: Set(task.task_type),
            payload: Set(task.payload),
            created_at: Set(task.created_at),
            next_run_at: Set(task.next_run_at),
            started_at: Set(task.started_at),
            fail_count: Set(task.fail_count),
            error_message: Set(task.error_message),
            error_stack_trace: Set(task.error_stack_trace),
            completed: Set(task.completed),
            completed_at: Set(task.completed_at),
            dead: Set(task.dead),
            optional_hash: Set(task.optional_hash),
            executor_instance_id: Set(task.executor_instance_id),
            heartbeat: Set(task.heartbeat),
        }
    }
}

#[async_trait]
impl TaskRepository for TaskRepositoryImpl {
    async fn save(&self, task: &Task) -> Result<Task, RepositoryError> {
        let Some(id) = task.id else {
            let model: task_entity::ActiveModel = task.clone().into();
            let inserted = model
                .insert(self.db.as_ref())
                .await
                .map_err(|e| map_save_error(e, task))?;
            return Ok(inserted.into());
        };

        let mut model: task_entity::ActiveModel = task.clone().into();
        model.id = NotSet;

        // Terminal rows are never rewritten
        let result = task_entity::Entity::update_many()
            .set(model)
            .filter(task_entity::Column::Id.eq(id))
            .filter(Self::live())
            .exec(self.db.as_ref())
            .await
            .map_err(|e| map_save_error(e, task))?;

        if result.rows_affected == 0 {
            return match self.find_by_id(id).await? {
                Some(_) => Err(RepositoryError::TerminalTask(id)),
                None => Err(RepositoryError::NotFound),
            };
        }

        Ok(task.clone())
    }

    async fn lease_next(&self, runner_id: &str) -> Result<Option<Task>, RepositoryError> {
        match self.db.get_database_backend() {
            DbBackend::Sqlite => self.lease_with_compare_and_swap(runner_id).await,
            _ => self.lease_with_skip_locked(runner_id).await,
        }
    }

    async fn settle_failure(&self, task: &Task, runner_id: &str) -> Result<bool, RepositoryError> {
        let id = task.id.ok_or(RepositoryError::NotFound)?;

        // Only the current lease owner may write the outcome
        let result = task_entity::Entity::update_many()
            .col_expr(task_entity::Column::FailCount, Expr::value(task.fail_count))
            .col_expr(
                task_entity::Column::ErrorMessage,
                Expr::value(task.error_message.clone()),
            )
            .col_expr(
                task_entity::Column::ErrorStackTrace,
                Expr::value(task.error_stack_trace.clone()),
            )
            .col_expr(task_entity::Column::NextRunAt, Expr::value(task.next_run_at))
            .col_expr(task_entity::Column::Dead, Expr::value(task.dead))
            .col_expr(
                task_entity::Column::StartedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(
                task_entity::Column::Heartbeat,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(
                task_entity::Column::ExecutorInstanceId,
                Expr::value(Option::<String>::None),
            )
            .filter(task_entity::Column::Id.eq(id))
            .filter(task_entity::Column::ExecutorInstanceId.eq(runner_id))
            .filter(task_entity::Column::StartedAt.is_not_null())
            .filter(Self::live())
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn mark_completed(&self, id: i64) -> Result<(), RepositoryError> {
        let now = self.clock.now();

        let result = task_entity::Entity::update_many()
            .col_expr(task_entity::Column::Completed, Expr::value(true))
            .col_expr(task_entity::Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(
                task_entity::Column::StartedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(
                task_entity::Column::Heartbeat,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(
                task_entity::Column::ExecutorInstanceId,
                Expr::value(Option::<String>::None),
            )
            .filter(task_entity::Column::Id.eq(id))
            .filter(Self::live())
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 && self.find_by_id(id).await?.is_none() {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn update_heartbeat(&self, runner_id: &str) -> Result<u64, RepositoryError> {
        let now = self.clock.now();

        let result = task_entity::Entity::update_many()
            .col_expr(task_entity::Column::Heartbeat, Expr::value(Some(now)))
            .filter(task_entity::Column::ExecutorInstanceId.eq(runner_id))
            .filter(task_entity::Column::StartedAt.is_not_null())
            .filter(Self::live())
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn reclaim_stale(&self, threshold: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = task_entity::Entity::update_many()
            .col_expr(
                task_entity::Column::StartedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(
                task_entity::Column::Heartbeat,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(
                task_entity::Column::ExecutorInstanceId,
                Expr::value(Option::<String>::None),
            )
            .filter(task_entity::Column::StartedAt.is_not_null())
            .filter(Self::live())
            .filter(
                Condition::any()
                    .add(task_entity::Column::Heartbeat.lt(threshold))
                    .add(task_entity::Column::Heartbeat.is_null()),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn has_pending(&self) -> Result<bool, RepositoryError> {
        let task = Self::eligible(self.clock.now())
            .one(self.db.as_ref())
            .await?;
        Ok(task.is_some())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Task>, RepositoryError> {
        let model = task_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn find_dead(&self, limit: u64) -> Result<Vec<Task>, RepositoryError> {
        let models = task_entity::Entity::find()
            .filter(task_entity::Column::Dead.eq(true))
            .order_by_desc(task_entity::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(Task::from).collect())
    }

    async fn count_by_state(&self) -> Result<QueueCounts, RepositoryError> {
        let db = self.db.as_ref();

        let completed = task_entity::Entity::find()
            .filter(task_entity::Column::Completed.eq(true))
            .count(db)
            .await?;
        let dead = task_entity::Entity::find()
            .filter(task_entity::Column::Dead.eq(true))
            .count(db)
            .await?;
        let leased = task_entity::Entity::find()
            .filter(task_entity::Column::StartedAt.is_not_null())
            .filter(Self::live())
            .count(db)
            .await?;
        let scheduled = task_entity::Entity::find()
            .filter(task_entity::Column::StartedAt.is_null())
            .filter(Self::live())
            .count(db)
            .await?;

        Ok(QueueCounts {
            scheduled,
            leased,
            completed,
            dead,
        })
    }
}
