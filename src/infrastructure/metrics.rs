// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::task_repository::QueueCounts;
use metrics::{describe_counter, describe_gauge, gauge};

pub const TASKS_PUBLISHED: &str = "taskbus_tasks_published_total";
pub const TASKS_COMPLETED: &str = "taskbus_tasks_completed_total";
pub const TASKS_RETRIED: &str = "taskbus_tasks_retried_total";
pub const TASKS_DEAD: &str = "taskbus_tasks_dead_total";
pub const LEASES_RECLAIMED: &str = "taskbus_leases_reclaimed_total";
pub const QUEUE_TASKS: &str = "taskbus_queue_tasks";

/// 注册指标描述
///
/// 只登记名称与说明，不安装导出器；由宿主程序决定使用哪种 recorder。
pub fn describe_metrics() {
    describe_counter!(TASKS_PUBLISHED, "Total number of tasks published");
    describe_counter!(
        TASKS_COMPLETED,
        "Total number of tasks whose handlers succeeded"
    );
    describe_counter!(
        TASKS_RETRIED,
        "Total number of failed executions rescheduled for retry"
    );
    describe_counter!(TASKS_DEAD, "Total number of tasks moved to dead-letter");
    describe_counter!(
        LEASES_RECLAIMED,
        "Total number of stale leases returned to the queue"
    );
    describe_gauge!(QUEUE_TASKS, "Current number of tasks per lifecycle state");
}

/// 上报队列各状态的任务数量
pub fn record_queue_counts(counts: &QueueCounts) {
    gauge!(QUEUE_TASKS, "state" => "scheduled").set(counts.scheduled as f64);
    gauge!(QUEUE_TASKS, "state" => "leased").set(counts.leased as f64);
    gauge!(QUEUE_TASKS, "state" => "completed").set(counts.completed as f64);
    gauge!(QUEUE_TASKS, "state" => "dead").set(counts.dead as f64);
}
