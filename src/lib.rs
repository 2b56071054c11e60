// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含任务实体、失败策略、仓库接口与分发服务
pub mod domain;

/// 基础设施模块
///
/// 提供数据库连接、SeaORM仓库实现与指标
pub mod infrastructure;

/// 队列模块
///
/// 实现任务的发布与执行
pub mod queue;

/// 工具模块
///
/// 提供时钟、错误类型与遥测初始化
pub mod utils;

/// 工作器模块
///
/// 实现执行器轮询、心跳与租约回收的后台驱动
pub mod workers;
