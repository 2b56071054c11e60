// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 编解码（codec）：负载类型与字节之间的转换
/// - 分发（dispatch）：把负载路由到处理器的抽象
/// - 注册表（registry）：分发器的默认实现，编译期确定类型映射
pub mod codec;
pub mod dispatch;
pub mod registry;

pub use codec::{CodecError, JsonCodec, Payload, PayloadCodec};
pub use dispatch::{DispatchError, Dispatcher};
pub use registry::{Handler, TaskRegistry};
