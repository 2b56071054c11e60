// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工具模块
///
/// 提供时钟抽象、错误类型与遥测初始化
pub mod clock;
pub mod errors;
pub mod telemetry;
