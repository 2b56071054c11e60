// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

use super::codec::CodecError;

/// 分发错误
///
/// 任何分发错误都会被执行器记录为一次任务失败
#[derive(Error, Debug)]
pub enum DispatchError {
    /// 没有注册该类型
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),
    /// 类型要求至少一个处理器但没有注册
    #[error("No handler registered for task type: {0}")]
    NoHandler(String),
    /// 负载解码失败
    #[error(transparent)]
    Decode(#[from] CodecError),
    /// 处理器执行失败
    #[error("Handler failed for task type {task_type}: {source}")]
    Handler {
        task_type: String,
        #[source]
        source: anyhow::Error,
    },
}

/// 分发器
///
/// 将解码后的负载路由到零个或多个处理器
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, task_type: &str, payload: &[u8]) -> Result<(), DispatchError>;
}
