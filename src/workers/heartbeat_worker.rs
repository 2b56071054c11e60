// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info};

use crate::domain::repositories::task_repository::TaskRepository;
use crate::queue::task_runner::TaskRunner;
use crate::utils::errors::WorkerError;
use crate::workers::worker::is_shutdown;

/// 心跳Worker
///
/// 定期刷新所属执行器持有的租约心跳
pub struct HeartbeatWorker<R: TaskRepository + 'static> {
    runner: Arc<TaskRunner<R>>,
    heartbeat_interval: Duration,
    shutdown: watch::Receiver<bool>,
    name: String,
}

impl<R: TaskRepository + 'static> HeartbeatWorker<R> {
    pub fn new(
        runner: Arc<TaskRunner<R>>,
        heartbeat_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let name = format!("heartbeat-worker-{}", runner.runner_id());
        Self {
            runner,
            heartbeat_interval,
            shutdown,
            name,
        }
    }
}

#[async_trait]
impl<R: TaskRepository + 'static> crate::workers::Worker for HeartbeatWorker<R> {
    async fn run(&self) -> Result<(), WorkerError> {
        info!("{} 启动", self.name);

        let mut shutdown = self.shutdown.clone();
        let mut interval = interval(self.heartbeat_interval);

        while !is_shutdown(&shutdown) {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.runner.update_heartbeat().await {
                        error!("刷新心跳失败: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("{} 已停止", self.name);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
