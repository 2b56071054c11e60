// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::Task;
use crate::domain::repositories::task_repository::{RepositoryError, TaskRepository};
use crate::domain::services::codec::{CodecError, JsonCodec, Payload, PayloadCodec};
use crate::infrastructure::metrics::TASKS_PUBLISHED;
use crate::utils::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// 负载编码错误
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// 任务发布器
///
/// 把负载编码后写入任务表，写入的任务立即（或在指定时间后）可被租用
pub struct TaskPublisher<R: TaskRepository, C: PayloadCodec = JsonCodec> {
    /// 任务仓库
    repository: Arc<R>,
    /// 负载编解码器
    codec: C,
    /// 时钟
    clock: Arc<dyn Clock>,
}

impl<R: TaskRepository> TaskPublisher<R, JsonCodec> {
    /// 创建使用JSON编码的发布器
    ///
    /// # 参数
    ///
    /// * `repository` - 任务仓库
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_codec(repository, JsonCodec)
    }
}

impl<R: TaskRepository, C: PayloadCodec> TaskPublisher<R, C> {
    pub fn with_codec(repository: Arc<R>, codec: C) -> Self {
        Self {
            repository,
            codec,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 发布一个立即可执行的任务
    ///
    /// # 返回值
    ///
    /// * `Ok(Task)` - 已持久化的任务（含存储分配的ID）
    /// * `Err(QueueError)` - 编码或写入失败
    pub async fn publish_task<P: Payload>(&self, payload: &P) -> Result<Task, QueueError> {
        let task = self.build(payload, None, None)?;
        self.persist(task).await
    }

    /// 带幂等键发布任务
    ///
    /// 相同的幂等键只能成功发布一次，重复发布返回
    /// [`RepositoryError::DuplicateIdempotencyKey`]，即使先前的任务已经完成。
    pub async fn publish_task_with_hash<P: Payload>(
        &self,
        payload: &P,
        hash: impl Into<String>,
    ) -> Result<Task, QueueError> {
        let task = self.build(payload, Some(hash.into()), None)?;
        self.persist(task).await
    }

    /// 发布一个在 `run_at` 之后才可执行的任务
    pub async fn publish_task_at<P: Payload>(
        &self,
        payload: &P,
        run_at: DateTime<Utc>,
    ) -> Result<Task, QueueError> {
        let task = self.build(payload, None, Some(run_at))?;
        self.persist(task).await
    }

    fn build<P: Payload>(
        &self,
        payload: &P,
        hash: Option<String>,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<Task, QueueError> {
        let bytes = self.codec.encode(payload)?;
        let mut task = Task::new(P::TYPE, bytes, self.clock.now());

        if let Some(hash) = hash {
            task = task.with_hash(hash);
        }
        if let Some(at) = run_at {
            task = task.run_at(at);
        }

        Ok(task)
    }

    async fn persist(&self, task: Task) -> Result<Task, QueueError> {
        let saved = self.repository.save(&task).await?;

        counter!(TASKS_PUBLISHED, "task_type" => saved.task_type.clone()).increment(1);
        debug!(
            "Published task {:?} of type {}",
            saved.id, saved.task_type
        );

        Ok(saved)
    }
}
