// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::domain::repositories::task_repository::TaskRepository;
use crate::infrastructure::metrics::{record_queue_counts, LEASES_RECLAIMED};
use crate::utils::clock::Clock;
use crate::utils::errors::WorkerError;
use crate::workers::worker::is_shutdown;

/// 失联租约回收Worker
///
/// 定期把心跳早于 `now - stale_threshold` 的租约放回队列，
/// 并上报各状态的任务数量
pub struct ReclaimWorker<R: TaskRepository + 'static> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
    reclaim_interval: Duration,
    stale_threshold: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<R: TaskRepository + 'static> ReclaimWorker<R> {
    pub fn new(
        repository: Arc<R>,
        clock: Arc<dyn Clock>,
        reclaim_interval: Duration,
        stale_threshold: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            repository,
            clock,
            reclaim_interval,
            stale_threshold,
            shutdown,
        }
    }

    /// 执行一次回收，返回回收的租约数量
    pub async fn reclaim_once(&self) -> Result<u64, WorkerError> {
        let threshold = chrono::Duration::from_std(self.stale_threshold)
            .map_err(|e| WorkerError::InternalError(e.to_string()))?;

        let reclaimed = self
            .repository
            .reclaim_stale(self.clock.now() - threshold)
            .await?;

        if reclaimed > 0 {
            counter!(LEASES_RECLAIMED).increment(reclaimed);
            warn!("回收了 {} 个失联租约", reclaimed);
        }

        let counts = self.repository.count_by_state().await?;
        record_queue_counts(&counts);

        Ok(reclaimed)
    }
}

#[async_trait]
impl<R: TaskRepository + 'static> crate::workers::Worker for ReclaimWorker<R> {
    async fn run(&self) -> Result<(), WorkerError> {
        info!("失联租约回收Worker启动");

        let mut shutdown = self.shutdown.clone();
        let mut interval = interval(self.reclaim_interval);

        while !is_shutdown(&shutdown) {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reclaim_once().await {
                        error!("回收失联租约时发生错误: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("失联租约回收Worker已停止");
        Ok(())
    }

    fn name(&self) -> &str {
        "reclaim-worker"
    }
}
