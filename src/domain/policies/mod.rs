// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 失败处理策略模块
///
/// - 退避策略（backoff）：计算失败任务的下一次执行时间
/// - 死信策略（dead_letter）：判断失败任务是否应永久放弃
///
/// 两类策略都是纯函数，不访问存储也不读取系统时间。
pub mod backoff;
pub mod dead_letter;

use chrono::{DateTime, Utc};

use crate::domain::models::task::Task;

/// 失败上下文
///
/// 策略做决定时可见的全部信息
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    /// 包含本次失败在内的失败次数
    pub fail_count: i32,
    pub error_message: &'a str,
    pub error_stack_trace: &'a str,
    pub task_type: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> FailureContext<'a> {
    /// 从已记录失败的任务构造上下文
    pub fn from_task(task: &'a Task) -> Self {
        Self {
            fail_count: task.fail_count,
            error_message: task.error_message.as_deref().unwrap_or_default(),
            error_stack_trace: task.error_stack_trace.as_deref().unwrap_or_default(),
            task_type: &task.task_type,
            created_at: task.created_at,
        }
    }
}

pub use backoff::{BackoffPolicy, ConstantBackoff, ExpandingBackoff};
pub use dead_letter::{
    AnyDeadLetterPolicy, DeadLetterPolicy, MaxAttemptsDeadLetterPolicy, TimeBasedDeadLetterPolicy,
};
