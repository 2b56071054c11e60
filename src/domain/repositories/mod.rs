// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 定义任务持久化的抽象契约，具体实现由基础设施层提供。
pub mod task_repository;
