// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, RngCore};

use super::FailureContext;

/// 退避策略
///
/// 随机性通过参数显式传入，便于在测试中使用固定种子
pub trait BackoffPolicy: Send + Sync {
    /// 计算下一次可执行时间
    fn next_run_at(
        &self,
        ctx: &FailureContext<'_>,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> DateTime<Utc>;
}

/// 固定间隔退避：`now + delay`
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff {
    pub delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffPolicy for ConstantBackoff {
    fn next_run_at(
        &self,
        _ctx: &FailureContext<'_>,
        now: DateTime<Utc>,
        _rng: &mut dyn RngCore,
    ) -> DateTime<Utc> {
        later(now, Some(self.delay))
    }
}

/// `now + offset`，溢出时取可表示的最晚时间
fn later(now: DateTime<Utc>, offset: Option<Duration>) -> DateTime<Utc> {
    offset
        .and_then(|offset| now.checked_add_signed(offset))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// 递增退避
///
/// `now + base + uniform(0..=jitter_seconds) + max(fail_count × multiplier, floor)` 分钟。
/// `floor_minutes` 是下限而不是上限：失败次数足够多后由乘积主导，间隔持续增长。
#[derive(Debug, Clone, Copy)]
pub struct ExpandingBackoff {
    /// 基础间隔
    pub base: Duration,
    /// 抖动上限（秒）
    pub jitter_seconds: u32,
    /// 每次失败增加的分钟数
    pub multiplier_minutes: i64,
    /// 分钟部分的下限
    pub floor_minutes: i64,
}

impl ExpandingBackoff {
    pub fn new(
        base: Duration,
        jitter_seconds: u32,
        multiplier_minutes: i64,
        floor_minutes: i64,
    ) -> Self {
        Self {
            base,
            jitter_seconds,
            multiplier_minutes,
            floor_minutes,
        }
    }

    /// 分钟部分：`max(fail_count × multiplier, floor)`，乘积饱和
    pub fn minutes_component(&self, fail_count: i32) -> i64 {
        i64::from(fail_count)
            .saturating_mul(self.multiplier_minutes)
            .max(self.floor_minutes)
    }
}

impl BackoffPolicy for ExpandingBackoff {
    fn next_run_at(
        &self,
        ctx: &FailureContext<'_>,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> DateTime<Utc> {
        let jitter = if self.jitter_seconds > 0 {
            rng.random_range(0..=self.jitter_seconds)
        } else {
            0
        };

        let offset = Duration::try_minutes(self.minutes_component(ctx.fail_count))
            .and_then(|minutes| minutes.checked_add(&self.base))
            .and_then(|offset| offset.checked_add(&Duration::seconds(i64::from(jitter))));

        later(now, offset)
    }
}
