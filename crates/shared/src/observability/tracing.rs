//! 日志订阅器
//!
//! 日志统一写到 stderr，stdout 留给命令行工具输出评估结果。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::ObservabilityConfig;

/// 日志订阅器守卫
///
/// 订阅器安装后在进程内常驻，守卫只用于标记安装成功。
pub struct TracingGuard {
    _installed: (),
}

/// 解析日志过滤规则，RUST_LOG 优先于配置项
fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn span_events(enabled: bool) -> FmtSpan {
    if enabled { FmtSpan::CLOSE } else { FmtSpan::NONE }
}

/// 安装全局日志订阅器
///
/// 已存在全局订阅器时返回错误。
pub fn init(config: &ObservabilityConfig) -> Result<TracingGuard> {
    let filter = build_filter(&config.log_level);
    let events = span_events(config.span_events);

    let layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(events)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(events)
            .with_target(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;

    Ok(TracingGuard { _installed: () })
}
