// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::FailureContext;

/// 死信策略
pub trait DeadLetterPolicy: Send + Sync {
    /// 任务是否应永久放弃
    fn is_dead(&self, ctx: &FailureContext<'_>, now: DateTime<Utc>) -> bool;
}

/// 基于存活时间的死信策略
///
/// `created_at + ttl < now` 时判定为死信，与失败次数无关。
/// 恰好处于边界时仍可重试；截止时间超出可表示范围时永不过期。
#[derive(Debug, Clone, Copy)]
pub struct TimeBasedDeadLetterPolicy {
    pub ttl: Duration,
}

impl TimeBasedDeadLetterPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl DeadLetterPolicy for TimeBasedDeadLetterPolicy {
    fn is_dead(&self, ctx: &FailureContext<'_>, now: DateTime<Utc>) -> bool {
        ctx.created_at
            .checked_add_signed(self.ttl)
            .is_some_and(|deadline| deadline < now)
    }
}

/// 基于失败次数的死信策略
#[derive(Debug, Clone, Copy)]
pub struct MaxAttemptsDeadLetterPolicy {
    pub max_attempts: i32,
}

impl MaxAttemptsDeadLetterPolicy {
    pub fn new(max_attempts: i32) -> Self {
        Self { max_attempts }
    }
}

impl DeadLetterPolicy for MaxAttemptsDeadLetterPolicy {
    fn is_dead(&self, ctx: &FailureContext<'_>, _now: DateTime<Utc>) -> bool {
        ctx.fail_count >= self.max_attempts
    }
}

/// 组合策略：任一子策略判定为死信即为死信
#[derive(Clone, Default)]
pub struct AnyDeadLetterPolicy {
    policies: Vec<Arc<dyn DeadLetterPolicy>>,
}

impl AnyDeadLetterPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: impl DeadLetterPolicy + 'static) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }
}

impl DeadLetterPolicy for AnyDeadLetterPolicy {
    fn is_dead(&self, ctx: &FailureContext<'_>, now: DateTime<Utc>) -> bool {
        self.policies.iter().any(|p| p.is_dead(ctx, now))
    }
}
