// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 后台工作器模块
///
/// 驱动执行器轮询、心跳刷新与失联租约回收
pub mod heartbeat_worker;
pub mod manager;
pub mod reclaim_worker;
pub mod runner_worker;
pub mod worker;

pub use worker::Worker;
