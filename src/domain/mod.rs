// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含队列的核心规则，包括：
/// - 领域模型（models）：任务实体
/// - 失败策略（policies）：退避与死信判定
/// - 仓库接口（repositories）：任务存储的抽象契约
/// - 服务（services）：负载编解码与分发
///
/// 领域层不依赖任何具体的存储实现。
pub mod models;
pub mod policies;
pub mod repositories;
pub mod services;
