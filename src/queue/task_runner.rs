// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::Task;
use crate::domain::policies::{BackoffPolicy, DeadLetterPolicy, FailureContext};
use crate::domain::repositories::task_repository::{RepositoryError, TaskRepository};
use crate::domain::services::dispatch::{DispatchError, Dispatcher};
use crate::infrastructure::metrics::{TASKS_COMPLETED, TASKS_DEAD, TASKS_RETRIED};
use crate::utils::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 执行器错误
///
/// 只有存储错误会传出；任务本身的失败由执行器记录并消化
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// 单次执行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 处理成功，任务已完成
    Completed,
    /// 处理失败，已重新排期
    Retrying { next_run_at: DateTime<Utc> },
    /// 处理失败，已转入死信
    Dead,
    /// 处理失败，但租约已被回收，结果未写入
    LeaseLost,
}

/// 任务执行器
///
/// 每个执行器在构造时生成进程内唯一的标识，用于租约归属与心跳。
/// 一次 `run_once` 最多租用并执行一个任务。
pub struct TaskRunner<R: TaskRepository> {
    repository: Arc<R>,
    dispatcher: Arc<dyn Dispatcher>,
    backoff: Arc<dyn BackoffPolicy>,
    dead_letter: Arc<dyn DeadLetterPolicy>,
    clock: Arc<dyn Clock>,
    runner_id: String,
    rng: Mutex<StdRng>,
}

impl<R: TaskRepository> TaskRunner<R> {
    /// 创建新的任务执行器
    ///
    /// # 参数
    ///
    /// * `repository` - 任务仓库
    /// * `dispatcher` - 负载分发器
    /// * `backoff` - 失败后的退避策略
    /// * `dead_letter` - 死信判定策略
    pub fn new(
        repository: Arc<R>,
        dispatcher: Arc<dyn Dispatcher>,
        backoff: Arc<dyn BackoffPolicy>,
        dead_letter: Arc<dyn DeadLetterPolicy>,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            backoff,
            dead_letter,
            clock: Arc::new(SystemClock),
            runner_id: format!("{}-{}", std::process::id(), Uuid::new_v4()),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 使用指定的随机数生成器计算退避抖动
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    /// 租用并执行一个任务
    ///
    /// # 返回值
    ///
    /// * `Ok(None)` - 当前没有可执行的任务
    /// * `Ok(Some(outcome))` - 执行了一个任务及其结果
    /// * `Err(RunnerError)` - 存储访问失败
    #[instrument(skip(self), fields(runner_id = %self.runner_id))]
    pub async fn run_once(&self) -> Result<Option<RunOutcome>, RunnerError> {
        let Some(task) = self.repository.lease_next(&self.runner_id).await? else {
            return Ok(None);
        };
        let id = task.id.ok_or(RepositoryError::NotFound)?;

        debug!(
            "Leased task {} of type {} (attempt {})",
            id,
            task.task_type,
            task.fail_count + 1
        );

        match self
            .dispatcher
            .dispatch(&task.task_type, &task.payload)
            .await
        {
            Ok(()) => {
                self.repository.mark_completed(id).await?;
                counter!(TASKS_COMPLETED, "task_type" => task.task_type.clone()).increment(1);
                info!("Task {} completed", id);
                Ok(Some(RunOutcome::Completed))
            }
            Err(err) => self.handle_failure(id, task, err).await.map(Some),
        }
    }

    async fn handle_failure(
        &self,
        id: i64,
        mut task: Task,
        err: DispatchError,
    ) -> Result<RunOutcome, RunnerError> {
        let message = err.to_string();
        let stack_trace = format!("{:?}", anyhow::Error::new(err));
        task.record_failure(message, stack_trace);

        let now = self.clock.now();
        let ctx = FailureContext::from_task(&task);

        if self.dead_letter.is_dead(&ctx, now) {
            task.bury();
            if !self.repository.settle_failure(&task, &self.runner_id).await? {
                return Ok(self.lease_lost(id, &task));
            }

            counter!(TASKS_DEAD, "task_type" => task.task_type.clone()).increment(1);
            warn!(
                "Task {} of type {} moved to dead-letter after {} failures: {}",
                id,
                task.task_type,
                task.fail_count,
                task.error_message.as_deref().unwrap_or_default()
            );
            return Ok(RunOutcome::Dead);
        }

        let next_run_at = {
            let mut rng = self.rng.lock();
            self.backoff.next_run_at(&ctx, now, &mut *rng)
        };
        task.reschedule(next_run_at);
        if !self.repository.settle_failure(&task, &self.runner_id).await? {
            return Ok(self.lease_lost(id, &task));
        }

        counter!(TASKS_RETRIED, "task_type" => task.task_type.clone()).increment(1);
        warn!(
            "Task {} failed (attempt {}), retrying at {}: {}",
            id,
            task.fail_count,
            next_run_at,
            task.error_message.as_deref().unwrap_or_default()
        );

        Ok(RunOutcome::Retrying { next_run_at })
    }

    fn lease_lost(&self, id: i64, task: &Task) -> RunOutcome {
        warn!(
            "Task {} failed after its lease was reclaimed, discarding outcome: {}",
            id,
            task.error_message.as_deref().unwrap_or_default()
        );
        RunOutcome::LeaseLost
    }

    /// 刷新本执行器持有的全部租约的心跳
    pub async fn update_heartbeat(&self) -> Result<u64, RunnerError> {
        let touched = self.repository.update_heartbeat(&self.runner_id).await?;
        if touched > 0 {
            debug!("Heartbeat refreshed for {} leased tasks", touched);
        }
        Ok(touched)
    }

    /// 回收心跳早于 `threshold` 的租约
    pub async fn retrieve_stalled_tasks(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<u64, RunnerError> {
        Ok(self.repository.reclaim_stale(threshold).await?)
    }

    pub async fn has_pending_tasks(&self) -> Result<bool, RunnerError> {
        Ok(self.repository.has_pending().await?)
    }
}
