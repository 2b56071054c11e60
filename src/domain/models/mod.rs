// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// - 任务（task）：队列中的单个工作单元及其推导状态
pub mod task;
