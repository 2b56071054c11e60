// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::codec::{CodecError, JsonCodec, Payload, PayloadCodec};
use super::dispatch::{DispatchError, Dispatcher};

/// 类型化处理器
///
/// ```ignore
/// struct SendEmailHandler;
///
/// #[async_trait]
/// impl Handler<SendEmail> for SendEmailHandler {
///     async fn handle(&self, payload: &SendEmail) -> anyhow::Result<()> {
///         mailer.send(&payload.to).await
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<P: Payload>: Send + Sync {
    async fn handle(&self, payload: &P) -> anyhow::Result<()>;
}

type AnyPayload = Box<dyn Any + Send + Sync>;
type DecodeFn<C> = fn(&C, &[u8]) -> Result<AnyPayload, CodecError>;

/// 类型擦除后的处理器，使不同负载类型的处理器可以放进同一张表
#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle_any(&self, payload: &(dyn Any + Send + Sync)) -> anyhow::Result<()>;
}

struct TypedHandler<P, H> {
    handler: H,
    _marker: PhantomData<fn() -> P>,
}

#[async_trait]
impl<P: Payload, H: Handler<P>> ErasedHandler for TypedHandler<P, H> {
    async fn handle_any(&self, payload: &(dyn Any + Send + Sync)) -> anyhow::Result<()> {
        let payload = payload
            .downcast_ref::<P>()
            .ok_or_else(|| anyhow::anyhow!("payload is not a {}", P::TYPE))?;
        self.handler.handle(payload).await
    }
}

struct Route<C> {
    decode: DecodeFn<C>,
    requires_handler: bool,
    handlers: Vec<Arc<dyn ErasedHandler>>,
}

fn decode_erased<P: Payload, C: PayloadCodec>(
    codec: &C,
    bytes: &[u8],
) -> Result<AnyPayload, CodecError> {
    let payload: P = codec.decode(bytes)?;
    Ok(Box::new(payload))
}

/// 任务类型注册表
///
/// 在启动时把类型标识映射到（解码函数，处理器列表），运行时只读。
/// 一个类型可以注册零个或多个处理器，按注册顺序依次执行，
/// 遇到第一个错误即停止。
pub struct TaskRegistry<C: PayloadCodec = JsonCodec> {
    codec: Arc<C>,
    routes: HashMap<&'static str, Route<C>>,
}

impl TaskRegistry<JsonCodec> {
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for TaskRegistry<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PayloadCodec> TaskRegistry<C> {
    pub fn with_codec(codec: C) -> Self {
        Self {
            codec: Arc::new(codec),
            routes: HashMap::new(),
        }
    }

    /// 声明一个负载类型，不附带处理器
    pub fn declare<P: Payload>(mut self) -> Self {
        self.route_mut::<P>();
        self
    }

    /// 为负载类型追加一个处理器
    pub fn register<P: Payload, H: Handler<P> + 'static>(mut self, handler: H) -> Self {
        let handler = TypedHandler {
            handler,
            _marker: PhantomData,
        };
        self.route_mut::<P>().handlers.push(Arc::new(handler));
        self
    }

    /// 已注册的类型标识
    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.routes.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn handler_count(&self, task_type: &str) -> usize {
        self.routes
            .get(task_type)
            .map(|route| route.handlers.len())
            .unwrap_or(0)
    }

    fn route_mut<P: Payload>(&mut self) -> &mut Route<C> {
        self.routes.entry(P::TYPE).or_insert_with(|| Route {
            decode: decode_erased::<P, C>,
            requires_handler: P::REQUIRES_HANDLER,
            handlers: Vec::new(),
        })
    }
}

#[async_trait]
impl<C: PayloadCodec> Dispatcher for TaskRegistry<C> {
    async fn dispatch(&self, task_type: &str, payload: &[u8]) -> Result<(), DispatchError> {
        let route = self
            .routes
            .get(task_type)
            .ok_or_else(|| DispatchError::UnknownTaskType(task_type.to_string()))?;

        let decoded = (route.decode)(self.codec.as_ref(), payload)?;

        if route.handlers.is_empty() {
            if route.requires_handler {
                return Err(DispatchError::NoHandler(task_type.to_string()));
            }
            debug!("No handler for task type {}, skipping", task_type);
            return Ok(());
        }

        for handler in &route.handlers {
            handler
                .handle_any(decoded.as_ref())
                .await
                .map_err(|source| DispatchError::Handler {
                    task_type: task_type.to_string(),
                    source,
                })?;
        }

        Ok(())
    }
}
