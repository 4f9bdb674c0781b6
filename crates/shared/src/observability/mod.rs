//! 可观测性初始化
//!
//! 负责日志订阅器安装和规则指标描述。规则引擎不暴露网络端口，
//! 指标通过 `metrics` facade 记录，由嵌入方安装 recorder。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置（对应配置文件的 `[observability]` 段）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 日志中的服务名
    pub service_name: String,
    /// 默认过滤规则，如 "info" 或 "rule_engine=debug"
    pub log_level: String,
    /// 输出 JSON 格式日志
    pub json_logs: bool,
    /// 输出 span 关闭事件（包含耗时）
    pub span_events: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "rule-engine".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            span_events: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }

    pub fn with_log_level(mut self, log_level: &str) -> Self {
        self.log_level = log_level.to_string();
        self
    }
}

/// 可观测性守卫，需要在 main 中持有到进程退出
pub struct ObservabilityGuard {
    service_name: String,
    tracing_guard: Option<tracing::TracingGuard>,
}

impl ObservabilityGuard {
    /// 未安装订阅器的守卫，用于测试
    pub fn empty() -> Self {
        Self {
            service_name: String::new(),
            tracing_guard: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.tracing_guard.is_some()
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self.is_active() {
            info!(service = %self.service_name, "Observability shut down");
        }
    }
}

/// 安装日志订阅器并注册指标描述
///
/// ```ignore
/// let config = ObservabilityConfig::default().with_service_name("rule-engine");
/// let _guard = rules_shared::observability::init(&config)?;
/// ```
pub fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let tracing_guard = tracing::init(config)?;
    metrics::describe_rule_metrics();

    info!(
        service = %config.service_name,
        log_level = %config.log_level,
        json_logs = config.json_logs,
        "Observability initialized"
    );

    Ok(ObservabilityGuard {
        service_name: config.service_name.clone(),
        tracing_guard: Some(tracing_guard),
    })
}
