//! 可观测性模块集成测试
//!
//! 订阅器是进程级单例，初始化相关断言集中在同一个测试中。

use rules_shared::observability::metrics::{
    RULE_EVALUATIONS_TOTAL, RULE_EVALUATION_DURATION_SECONDS, describe_rule_metrics,
};
use rules_shared::observability::{self, ObservabilityConfig};

#[test]
fn test_init_once_per_process() {
    let config = ObservabilityConfig {
        log_level: "debug".to_string(),
        json_logs: true,
        ..Default::default()
    }
    .with_service_name("rule-engine-test");

    let guard = observability::init(&config).expect("first init succeeds");
    tracing::info!(family = "cart", "subscriber installed");

    // 全局订阅器已存在，重复初始化返回错误而不是 panic
    assert!(observability::init(&config).is_err());

    drop(guard);
}

#[test]
fn test_metrics_without_recorder() {
    // 未安装 recorder 时记录指标是空操作
    describe_rule_metrics();
    metrics::counter!(RULE_EVALUATIONS_TOTAL, "family" => "cart", "result" => "true").increment(1);
    metrics::histogram!(RULE_EVALUATION_DURATION_SECONDS, "family" => "cart").record(0.001);
}
