// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::policies::{
    AnyDeadLetterPolicy, BackoffPolicy, ConstantBackoff, DeadLetterPolicy, ExpandingBackoff,
    MaxAttemptsDeadLetterPolicy, TimeBasedDeadLetterPolicy,
};
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含数据库、执行器、退避和死信等所有配置项
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 执行器配置
    pub runner: RunnerSettings,
    /// 退避策略配置
    pub backoff: BackoffSettings,
    /// 死信策略配置
    pub dead_letter: DeadLetterSettings,
}

/// 数据库配置设置
#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 执行器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSettings {
    /// 并发执行器数量
    pub workers: usize,
    /// 空闲时的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 心跳间隔（秒）
    pub heartbeat_interval_secs: u64,
    /// 回收扫描间隔（秒）
    pub reclaim_interval_secs: u64,
    /// 心跳超过该时长即视为失联（秒）
    pub stale_threshold_secs: u64,
}

impl RunnerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    /// 校验执行器配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(invalid("runner.workers", "must be at least 1"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(invalid("runner.heartbeat_interval_secs", "must be positive"));
        }
        if self.reclaim_interval_secs == 0 {
            return Err(invalid("runner.reclaim_interval_secs", "must be positive"));
        }
        chrono::Duration::from_std(self.stale_threshold())
            .map_err(|_| invalid("runner.stale_threshold_secs", "is out of range"))?;
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Message(format!("{} {}", key, reason))
}

/// 非负且可表示为时长的配置值
fn span(
    key: &str,
    value: i64,
    to_duration: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration, ConfigError> {
    if value < 0 {
        return Err(invalid(key, "must not be negative"));
    }
    to_duration(value).ok_or_else(|| invalid(key, "is out of range"))
}

/// 退避策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Constant,
    Expanding,
}

/// 退避策略配置设置
#[derive(Debug, Deserialize)]
pub struct BackoffSettings {
    /// 策略类型 (constant, expanding)
    pub kind: BackoffKind,
    /// 固定间隔（秒），kind=constant 时使用
    pub fixed_secs: i64,
    /// 基础间隔（秒）
    pub base_secs: i64,
    /// 抖动上限（秒）
    pub jitter_secs: u32,
    /// 每次失败增加的分钟数
    pub multiplier_minutes: i64,
    /// 分钟部分的下限
    pub floor_minutes: i64,
}

impl BackoffSettings {
    /// 构建退避策略
    ///
    /// 负值或超出时间范围的配置返回 `ConfigError`
    pub fn build(&self) -> Result<Arc<dyn BackoffPolicy>, ConfigError> {
        let fixed = span("backoff.fixed_secs", self.fixed_secs, chrono::Duration::try_seconds)?;
        let base = span("backoff.base_secs", self.base_secs, chrono::Duration::try_seconds)?;
        span(
            "backoff.multiplier_minutes",
            self.multiplier_minutes,
            chrono::Duration::try_minutes,
        )?;
        span(
            "backoff.floor_minutes",
            self.floor_minutes,
            chrono::Duration::try_minutes,
        )?;

        let policy: Arc<dyn BackoffPolicy> = match self.kind {
            BackoffKind::Constant => Arc::new(ConstantBackoff::new(fixed)),
            BackoffKind::Expanding => Arc::new(ExpandingBackoff::new(
                base,
                self.jitter_secs,
                self.multiplier_minutes,
                self.floor_minutes,
            )),
        };
        Ok(policy)
    }
}

/// 死信策略配置设置
#[derive(Debug, Deserialize)]
pub struct DeadLetterSettings {
    /// 任务最长存活时间（小时）
    pub ttl_hours: i64,
    /// 最大失败次数，未设置时不限
    pub max_attempts: Option<i32>,
}

impl DeadLetterSettings {
    /// 构建死信策略
    ///
    /// 始终包含存活时间判定；设置了 `max_attempts` 时与失败次数判定组合
    pub fn build(&self) -> Result<Arc<dyn DeadLetterPolicy>, ConfigError> {
        let ttl = span(
            "dead_letter.ttl_hours",
            self.ttl_hours,
            chrono::Duration::try_hours,
        )?;
        let by_age = TimeBasedDeadLetterPolicy::new(ttl);

        if self.max_attempts.is_some_and(|max| max < 1) {
            return Err(invalid("dead_letter.max_attempts", "must be at least 1"));
        }

        let policy: Arc<dyn DeadLetterPolicy> = match self.max_attempts {
            Some(max) => Arc::new(
                AnyDeadLetterPolicy::new()
                    .with(by_age)
                    .with(MaxAttemptsDeadLetterPolicy::new(max)),
            ),
            None => Arc::new(by_age),
        };
        Ok(policy)
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加内置默认值、`config/default`、`config/{APP_ENVIRONMENT}`
    /// 与 `TASKBUS__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("TASKBUS").separator("__"));

        Self::from_builder(builder)
    }

    /// 从构建器加载并校验配置
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 校验各项配置都能构建出可用的策略
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.runner.validate()?;
        self.backoff.build()?;
        self.dead_letter.build()?;
        Ok(())
    }

    /// 内置默认值
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            // Default DB pool settings
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Default runner settings
            .set_default("runner.workers", 4)?
            .set_default("runner.poll_interval_ms", 1000)?
            .set_default("runner.heartbeat_interval_secs", 30)?
            .set_default("runner.reclaim_interval_secs", 60)?
            .set_default("runner.stale_threshold_secs", 300)?
            // Default backoff settings
            .set_default("backoff.kind", "expanding")?
            .set_default("backoff.fixed_secs", 60)?
            .set_default("backoff.base_secs", 10)?
            .set_default("backoff.jitter_secs", 30)?
            .set_default("backoff.multiplier_minutes", 1)?
            .set_default("backoff.floor_minutes", 1)?
            // Default dead-letter settings
            .set_default("dead_letter.ttl_hours", 24 * 7)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
