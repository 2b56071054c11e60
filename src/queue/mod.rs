// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 提供任务的发布与执行
/// - 发布器（task_publisher）：编码负载并写入任务表
/// - 执行器（task_runner）：租用、分发并根据结果推进任务状态
pub mod task_publisher;
pub mod task_runner;

pub use task_publisher::{QueueError, TaskPublisher};
pub use task_runner::{RunOutcome, RunnerError, TaskRunner};
