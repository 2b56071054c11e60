// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// 任务负载
///
/// 将负载类型与其类型标识静态绑定，取代运行时的类名反射。
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct SendEmail { to: String }
///
/// impl Payload for SendEmail {
///     const TYPE: &'static str = "mail.send.v1";
/// }
/// ```
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 类型标识，写入任务的 `task_type` 字段
    const TYPE: &'static str;

    /// 没有注册处理器时是否视为失败
    const REQUIRES_HANDLER: bool = true;
}

/// 编解码错误
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encode payload: {0}")]
    Encode(String),
    #[error("Failed to decode payload of type {task_type}: {message}")]
    Decode { task_type: String, message: String },
}

/// 负载编解码器
pub trait PayloadCodec: Send + Sync + 'static {
    fn encode<P: Payload>(&self, payload: &P) -> Result<Vec<u8>, CodecError>;

    fn decode<P: Payload>(&self, bytes: &[u8]) -> Result<P, CodecError>;
}

/// JSON 编解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode<P: Payload>(&self, payload: &P) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(payload).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<P: Payload>(&self, bytes: &[u8]) -> Result<P, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            task_type: P::TYPE.to_string(),
            message: e.to_string(),
        })
    }
}
