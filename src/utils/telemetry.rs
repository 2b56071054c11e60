// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志订阅器
///
/// 未设置 `RUST_LOG` 时默认使用 `info,taskbus=debug`；
/// `TASKBUS_LOG_FORMAT=json` 时输出 JSON 格式日志。
/// 重复调用时保留已安装的订阅器。
pub fn init_telemetry() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,taskbus=debug".into());
    let json = std::env::var("TASKBUS_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
}
