//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    // ==================== 配置错误 ====================
    #[error("规则表达式缺少描述符: node_id={node_id}, raw_value={raw_value}")]
    MissingDescriptor { node_id: i64, raw_value: String },

    #[error("未注册的规则处理器: {kind} (node_id={node_id}, raw_value={raw_value})")]
    UnknownProcessor {
        kind: String,
        node_id: i64,
        raw_value: String,
    },

    #[error("规则 {rule_type} 不支持操作符 {operator}")]
    InvalidOperator { operator: String, rule_type: String },

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("规则集 {rule_set_id} 属于 {actual}, 当前提供者为 {expected}")]
    FamilyMismatch {
        rule_set_id: i64,
        expected: String,
        actual: String,
    },

    #[error("规则集循环引用: rule_set_id={rule_set_id}")]
    RuleSetCycle { rule_set_id: i64 },

    #[error("规则集嵌套过深: rule_set_id={rule_set_id}, 最大深度 {max_depth}")]
    RuleSetTooDeep { rule_set_id: i64, max_depth: usize },

    #[error("节点不是规则条件: node_id={node_id}")]
    NotALeaf { node_id: i64 },

    #[error("评估上下文缺少服务: {0}")]
    MissingService(&'static str),

    // ==================== 参数错误 ====================
    #[error("参数验证失败: {0}")]
    InvalidArgument(String),

    // ==================== 存储错误 ====================
    #[error("规则集未找到: {0}")]
    RuleSetNotFound(i64),

    // ==================== 处理器错误 ====================
    #[error("规则处理器执行失败: {0}")]
    Processor(#[from] anyhow::Error),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuleError {
    /// 是否为规则定义/目录不一致导致的配置错误
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingDescriptor { .. }
                | Self::UnknownProcessor { .. }
                | Self::InvalidOperator { .. }
                | Self::TypeMismatch { .. }
                | Self::FamilyMismatch { .. }
                | Self::RuleSetCycle { .. }
                | Self::RuleSetTooDeep { .. }
                | Self::NotALeaf { .. }
                | Self::MissingService(_)
        )
    }

    /// 用于指标标签的错误类别
    pub fn kind(&self) -> &'static str {
        if self.is_configuration_error() {
            "configuration"
        } else {
            match self {
                Self::InvalidArgument(_) => "invalid_argument",
                Self::RuleSetNotFound(_) => "not_found",
                Self::Processor(_) => "processor",
                Self::Json(_) => "json",
                _ => "other",
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_classification() {
        let err = RuleError::MissingDescriptor {
            node_id: 7,
            raw_value: "100".to_string(),
        };
        assert!(err.is_configuration_error());
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("node_id=7"));
        assert!(err.to_string().contains("raw_value=100"));

        let err = RuleError::InvalidArgument("rule_set_id".to_string());
        assert!(!err.is_configuration_error());
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn test_processor_error_from_anyhow() {
        let err: RuleError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.kind(), "processor");
        assert!(err.to_string().contains("connection reset"));
    }
}
