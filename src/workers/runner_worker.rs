// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info};

use crate::domain::repositories::task_repository::TaskRepository;
use crate::queue::task_runner::TaskRunner;
use crate::utils::errors::WorkerError;
use crate::workers::worker::is_shutdown;

/// 执行器轮询Worker
///
/// 循环调用 `run_once`；队列为空时按轮询间隔休眠，
/// 存储出错时记录日志并同样休眠一个间隔后重试
pub struct RunnerWorker<R: TaskRepository + 'static> {
    runner: Arc<TaskRunner<R>>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
    name: String,
}

impl<R: TaskRepository + 'static> RunnerWorker<R> {
    pub fn new(
        runner: Arc<TaskRunner<R>>,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let name = format!("runner-worker-{}", runner.runner_id());
        Self {
            runner,
            poll_interval,
            shutdown,
            name,
        }
    }

    /// 执行一轮轮询，返回是否应立即进行下一轮
    async fn poll(&self) -> bool {
        match self.runner.run_once().await {
            Ok(Some(_)) => true,
            Ok(None) => match self.runner.has_pending_tasks().await {
                Ok(pending) => pending,
                Err(e) => {
                    error!("检查待执行任务失败: {}", e);
                    false
                }
            },
            Err(e) => {
                error!("执行任务时发生存储错误: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl<R: TaskRepository + 'static> crate::workers::Worker for RunnerWorker<R> {
    async fn run(&self) -> Result<(), WorkerError> {
        info!("{} 启动", self.name);

        let mut shutdown = self.shutdown.clone();

        while !is_shutdown(&shutdown) {
            if self.poll().await {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
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
