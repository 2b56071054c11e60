// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::{RunnerSettings, Settings};
use crate::domain::policies::{BackoffPolicy, DeadLetterPolicy};
use crate::domain::repositories::task_repository::TaskRepository;
use crate::domain::services::dispatch::Dispatcher;
use crate::infrastructure::metrics::describe_metrics;
use crate::queue::task_runner::TaskRunner;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::errors::WorkerError;
use crate::workers::heartbeat_worker::HeartbeatWorker;
use crate::workers::reclaim_worker::ReclaimWorker;
use crate::workers::runner_worker::RunnerWorker;
use crate::workers::Worker;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 工作管理器
///
/// 启动若干执行器（每个带独立的心跳Worker）和一个回收Worker，
/// 通过 watch 通道统一关闭
pub struct WorkerManager<R: TaskRepository + 'static> {
    repository: Arc<R>,
    dispatcher: Arc<dyn Dispatcher>,
    backoff: Arc<dyn BackoffPolicy>,
    dead_letter: Arc<dyn DeadLetterPolicy>,
    clock: Arc<dyn Clock>,
    settings: RunnerSettings,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl<R: TaskRepository + 'static> WorkerManager<R> {
    /// 创建工作管理器
    ///
    /// 退避与死信策略由配置构建，配置非法时返回错误
    pub fn new(
        repository: Arc<R>,
        dispatcher: Arc<dyn Dispatcher>,
        settings: &Settings,
    ) -> Result<Self, WorkerError> {
        settings.runner.validate()?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            repository,
            dispatcher,
            backoff: settings.backoff.build()?,
            dead_letter: settings.dead_letter.build()?,
            clock: Arc::new(SystemClock),
            settings: settings.runner.clone(),
            shutdown_tx,
            handles: Vec::new(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 启动工作进程
    ///
    /// 按配置的数量启动执行器，每个执行器附带一个心跳Worker，另启动一个回收Worker
    pub fn start_workers(&mut self) {
        describe_metrics();

        for _ in 0..self.settings.workers {
            let runner = Arc::new(
                TaskRunner::new(
                    self.repository.clone(),
                    self.dispatcher.clone(),
                    self.backoff.clone(),
                    self.dead_letter.clone(),
                )
                .with_clock(self.clock.clone()),
            );

            self.spawn(RunnerWorker::new(
                runner.clone(),
                self.settings.poll_interval(),
                self.shutdown_tx.subscribe(),
            ));
            self.spawn(HeartbeatWorker::new(
                runner,
                self.settings.heartbeat_interval(),
                self.shutdown_tx.subscribe(),
            ));
        }

        self.spawn(ReclaimWorker::new(
            self.repository.clone(),
            self.clock.clone(),
            self.settings.reclaim_interval(),
            self.settings.stale_threshold(),
            self.shutdown_tx.subscribe(),
        ));

        info!("Started {} runner workers", self.settings.workers);
    }

    fn spawn<W: Worker + 'static>(&mut self, worker: W) {
        let handle = tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                error!("Worker {} exited with error: {}", worker.name(), e);
            }
        });
        self.handles.push(handle);
    }

    /// 通知所有Worker停止并等待其退出
    ///
    /// 正在执行的任务会先执行完毕
    pub async fn shutdown(&mut self) {
        info!("Shutting down workers...");
        // Receivers may already be gone; nothing to do then
        let _ = self.shutdown_tx.send(true);

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Worker task failed to join: {}", e);
            }
        }

        info!("Workers shut down successfully");
    }

    /// 等待关闭信号并关闭工作进程
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        self.shutdown().await;
    }
}
