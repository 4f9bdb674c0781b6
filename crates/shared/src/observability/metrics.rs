//! 规则评估指标
//!
//! 指标名称集中定义在这里，规则引擎通过 `metrics` 宏记录，
//! 描述信息会出现在嵌入方 exporter 的 HELP 注释中。

/// 规则评估次数（标签：family, result）
pub const RULE_EVALUATIONS_TOTAL: &str = "rule_evaluations_total";

/// 规则评估耗时（标签：family）
pub const RULE_EVALUATION_DURATION_SECONDS: &str = "rule_evaluation_duration_seconds";

/// 规则评估失败次数（标签：family, kind）
pub const RULE_EVALUATION_ERRORS_TOTAL: &str = "rule_evaluation_errors_total";

/// 规则集物化次数（标签：outcome）
pub const RULE_SET_MATERIALIZATIONS_TOTAL: &str = "rule_set_materializations_total";

/// 注册规则引擎相关指标的描述
pub fn describe_rule_metrics() {
    metrics::describe_counter!(RULE_EVALUATIONS_TOTAL, "Total number of rule evaluations");
    metrics::describe_histogram!(
        RULE_EVALUATION_DURATION_SECONDS,
        "Rule evaluation duration in seconds"
    );
    metrics::describe_counter!(
        RULE_EVALUATION_ERRORS_TOTAL,
        "Total number of failed rule evaluations"
    );
    metrics::describe_counter!(
        RULE_SET_MATERIALIZATIONS_TOTAL,
        "Total number of rule set materializations"
    );
}
