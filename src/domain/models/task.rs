// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::fmt;

/// 任务实体
///
/// 表示队列中的一个延迟工作单元。任务被某个执行器租用（lease）后
/// 执行，成功则进入完成状态，失败则按退避策略重新排期或进入死信状态。
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// 任务唯一标识符，由存储分配；尚未持久化时为 `None`
    pub id: Option<i64>,
    /// 任务类型，决定负载的解码方式和处理器路由
    pub task_type: String,
    /// 序列化后的任务负载
    pub payload: Vec<u8>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 最早可执行时间，进入死信状态后为 `None`
    pub next_run_at: Option<DateTime<Utc>>,
    /// 租用开始时间，仅在被租用期间非空
    pub started_at: Option<DateTime<Utc>>,
    /// 失败次数
    pub fail_count: i32,
    /// 最近一次失败的错误信息
    pub error_message: Option<String>,
    /// 最近一次失败的错误链
    pub error_stack_trace: Option<String>,
    /// 是否已成功完成
    pub completed: bool,
    /// 完成时间
    pub completed_at: Option<DateTime<Utc>>,
    /// 是否已进入死信状态
    pub dead: bool,
    /// 幂等键，非空时在所有任务中唯一
    pub optional_hash: Option<String>,
    /// 当前持有租约的执行器标识
    pub executor_instance_id: Option<String>,
    /// 租约持有者最近一次刷新的心跳时间
    pub heartbeat: Option<DateTime<Utc>>,
}

/// 任务状态
///
/// 由任务字段推导得出，仅用于查询和日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 等待执行（可能尚未到期）
    Scheduled,
    /// 已被执行器租用
    Leased,
    /// 已完成
    Completed,
    /// 死信
    Dead,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskState::Scheduled => write!(f, "scheduled"),
            TaskState::Leased => write!(f, "leased"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Dead => write!(f, "dead"),
        }
    }
}

impl Task {
    /// 创建一个立即可执行的新任务
    ///
    /// # 参数
    ///
    /// * `task_type` - 任务类型标识
    /// * `payload` - 序列化后的负载
    /// * `now` - 创建时间，同时作为首次可执行时间
    pub fn new(task_type: impl Into<String>, payload: Vec<u8>, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            task_type: task_type.into(),
            payload,
            created_at: now,
            next_run_at: Some(now),
            started_at: None,
            fail_count: 0,
            error_message: None,
            error_stack_trace: None,
            completed: false,
            completed_at: None,
            dead: false,
            optional_hash: None,
            executor_instance_id: None,
            heartbeat: None,
        }
    }

    /// 设置幂等键
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.optional_hash = Some(hash.into());
        self
    }

    /// 设置首次可执行时间
    pub fn run_at(mut self, at: DateTime<Utc>) -> Self {
        self.next_run_at = Some(at);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.completed || self.dead
    }

    pub fn is_leased(&self) -> bool {
        self.started_at.is_some() && !self.is_terminal()
    }

    /// 判断任务在 `now` 时刻是否可被租用
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal()
            && self.started_at.is_none()
            && self.next_run_at.is_some_and(|at| at <= now)
    }

    pub fn state(&self) -> TaskState {
        if self.completed {
            TaskState::Completed
        } else if self.dead {
            TaskState::Dead
        } else if self.started_at.is_some() {
            TaskState::Leased
        } else {
            TaskState::Scheduled
        }
    }

    /// 记录一次失败
    ///
    /// 失败次数加一并覆盖诊断信息
    pub fn record_failure(&mut self, message: String, stack_trace: String) {
        self.fail_count += 1;
        self.error_message = Some(message);
        self.error_stack_trace = Some(stack_trace);
    }

    /// 释放租约并重新排期
    pub fn reschedule(&mut self, next_run_at: DateTime<Utc>) {
        self.next_run_at = Some(next_run_at);
        self.release_lease();
    }

    /// 转入死信状态
    pub fn bury(&mut self) {
        self.dead = true;
        self.next_run_at = None;
        self.release_lease();
    }

    fn release_lease(&mut self) {
        self.started_at = None;
        self.heartbeat = None;
        self.executor_instance_id = None;
    }
}
