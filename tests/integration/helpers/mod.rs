// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use parking_lot::Mutex;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use taskbus::domain::models::task::Task;
use taskbus::domain::policies::{ConstantBackoff, TimeBasedDeadLetterPolicy};
use taskbus::domain::repositories::task_repository::TaskRepository;
use taskbus::domain::services::{Handler, Payload, TaskRegistry};
use taskbus::infrastructure::repositories::task_repo_impl::TaskRepositoryImpl;
use taskbus::queue::{TaskPublisher, TaskRunner};
use taskbus::utils::clock::ManualClock;
use taskbus::utils::telemetry::init_telemetry;
use tokio::sync::Notify;

pub const RETRY_DELAY_SECS: i64 = 60;
pub const TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Greeting {
    pub name: String,
}

impl Payload for Greeting {
    const TYPE: &'static str = "test.greeting.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unrouted {
    pub value: u32,
}

impl Payload for Unrouted {
    const TYPE: &'static str = "test.unrouted.v1";
}

/// 记录收到的负载
#[derive(Clone, Default)]
pub struct RecordingHandler {
    pub seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Handler<Greeting> for RecordingHandler {
    async fn handle(&self, payload: &Greeting) -> anyhow::Result<()> {
        self.seen.lock().push(payload.name.clone());
        Ok(())
    }
}

/// 前 `failures` 次调用失败，之后成功
#[derive(Clone)]
pub struct FlakyHandler {
    pub calls: Arc<AtomicUsize>,
    pub failures: usize,
}

impl FlakyHandler {
    pub fn always_failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    pub fn failing_times(failures: usize) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            failures,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler<Greeting> for FlakyHandler {
    async fn handle(&self, payload: &Greeting) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            anyhow::bail!("boom while greeting {}", payload.name);
        }
        Ok(())
    }
}

/// 进入处理后等待放行，然后失败
#[derive(Clone, Default)]
pub struct GatedHandler {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[async_trait]
impl Handler<Greeting> for GatedHandler {
    async fn handle(&self, payload: &Greeting) -> anyhow::Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        anyhow::bail!("late failure for {}", payload.name)
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub struct TestQueue {
    pub db: Arc<DatabaseConnection>,
    pub clock: Arc<ManualClock>,
    pub repo: Arc<TaskRepositoryImpl>,
}

impl TestQueue {
    pub fn now(&self) -> DateTime<Utc> {
        use taskbus::utils::clock::Clock;
        self.clock.now()
    }

    pub fn publisher(&self) -> TaskPublisher<TaskRepositoryImpl> {
        TaskPublisher::new(self.repo.clone()).with_clock(self.clock.clone())
    }

    pub fn runner(&self, registry: TaskRegistry) -> TaskRunner<TaskRepositoryImpl> {
        TaskRunner::new(
            self.repo.clone(),
            Arc::new(registry),
            Arc::new(ConstantBackoff::new(Duration::seconds(RETRY_DELAY_SECS))),
            Arc::new(TimeBasedDeadLetterPolicy::new(Duration::hours(TTL_HOURS))),
        )
        .with_clock(self.clock.clone())
    }

    /// 直接写入一个任务
    pub async fn insert(&self, task: Task) -> Task {
        self.repo.save(&task).await.unwrap()
    }

    pub async fn reload(&self, task: &Task) -> Task {
        self.repo.find_by_id(task.id.unwrap()).await.unwrap().unwrap()
    }
}

/// 内存 SQLite 只在单个连接内可见，因此连接池固定为一个连接
pub async fn setup() -> TestQueue {
    init_telemetry();

    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Arc::new(Database::connect(opt).await.unwrap());
    Migrator::up(db.as_ref(), None).await.unwrap();

    let clock = Arc::new(ManualClock::new(start_time()));
    let repo = Arc::new(TaskRepositoryImpl::with_clock(db.clone(), clock.clone()));

    TestQueue { db, clock, repo }
}

/// 基于临时文件的 SQLite，多个连接可并发访问同一个库
///
/// 返回的 `TempDir` 需在测试期间保持存活
pub async fn setup_file_backed(max_connections: u32) -> (TestQueue, TempDir) {
    init_telemetry();

    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("queue.db").display());

    let mut opt = ConnectOptions::new(url);
    opt.max_connections(max_connections)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Arc::new(Database::connect(opt).await.unwrap());
    Migrator::up(db.as_ref(), None).await.unwrap();

    let clock = Arc::new(ManualClock::new(start_time()));
    let repo = Arc::new(TaskRepositoryImpl::with_clock(db.clone(), clock.clone()));

    (TestQueue { db, clock, repo }, dir)
}

pub fn greeting(name: &str) -> Greeting {
    Greeting {
        name: name.to_string(),
    }
}
