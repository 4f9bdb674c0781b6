//! 规则集存储与物化
//!
//! 持久化的规则集定义以 JSON 形式加载到 [`RuleSetStore`]，
//! 评估时再按提供者的描述符目录物化为表达式树。
//!
//! ## 物化规则
//!
//! - 规则集不存在或已停用时返回 `None`，由提供者丢弃
//! - `rule_type == "group"` 的规则引用另一个规则集，物化为子逻辑组
//! - 规则类型在目录中不存在时生成缺少描述符的条件，评估时报配置错误
//! - 操作符不在描述符允许范围内、值类型与声明不符时直接报错

use async_trait::async_trait;
use dashmap::DashMap;
use rules_shared::observability::metrics::RULE_SET_MATERIALIZATIONS_TOTAL;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::descriptor::{DescriptorCatalog, RuleFamily};
use crate::error::{Result, RuleError};
use crate::expression::{ExpressionGroup, ExpressionNode, RuleExpression};
use crate::operators::{LogicalOperator, RuleOperator};

/// 引用嵌套规则集的规则类型
pub const GROUP_RULE_TYPE: &str = "group";

/// 默认最大嵌套深度
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 16;

/// 规则集物化接口
///
/// 由提供者调用，根据规则集 ID 构建表达式树。返回 `None` 表示规则集已不存在。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleSetMaterializer: Send + Sync {
    async fn build_expression_group(
        &self,
        rule_set_id: i64,
        catalog: &DescriptorCatalog,
    ) -> Result<Option<ExpressionGroup>>;
}

/// 持久化的规则集定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetDefinition {
    pub id: i64,
    pub name: String,
    pub family: RuleFamily,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// 仅作为其他规则集的子组使用，不单独评估
    #[serde(default)]
    pub is_sub_group: bool,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

fn default_active() -> bool {
    true
}

/// 持久化的单条规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: i64,
    /// 描述符名称，或 `group`
    pub rule_type: String,
    #[serde(default = "default_rule_operator")]
    pub operator: RuleOperator,
    #[serde(default)]
    pub value: Value,
}

fn default_rule_operator() -> RuleOperator {
    RuleOperator::Eq
}

impl RuleDefinition {
    pub fn is_group(&self) -> bool {
        self.rule_type == GROUP_RULE_TYPE
    }
}

/// 规则集存储
///
/// 使用 DashMap 提供线程安全的读写，物化时不持有跨规则集的锁。
#[derive(Clone)]
pub struct RuleSetStore {
    rule_sets: Arc<DashMap<i64, RuleSetDefinition>>,
    max_nesting_depth: usize,
}

impl RuleSetStore {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_NESTING_DEPTH)
    }

    pub fn with_max_depth(max_nesting_depth: usize) -> Self {
        Self {
            rule_sets: Arc::new(DashMap::new()),
            max_nesting_depth,
        }
    }

    pub fn max_nesting_depth(&self) -> usize {
        self.max_nesting_depth
    }

    pub fn len(&self) -> usize {
        self.rule_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_sets.is_empty()
    }

    /// 加载规则集，同 ID 的规则集会被替换
    #[instrument(skip(self, rule_set), fields(rule_set_id = rule_set.id, name = %rule_set.name))]
    pub fn load(&self, rule_set: RuleSetDefinition) -> Result<()> {
        Self::validate(&rule_set)?;

        let id = rule_set.id;
        self.rule_sets.insert(id, rule_set);

        info!("规则集已加载: {}", id);
        Ok(())
    }

    /// 从 JSON 加载规则集，支持单个对象或数组
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<Vec<i64>> {
        let value: Value = serde_json::from_str(json)?;
        let rule_sets: Vec<RuleSetDefinition> = match value {
            Value::Array(_) => serde_json::from_value(value)?,
            _ => vec![serde_json::from_value(value)?],
        };

        let mut loaded = Vec::with_capacity(rule_sets.len());
        for rule_set in rule_sets {
            let id = rule_set.id;
            self.load(rule_set)?;
            loaded.push(id);
        }

        info!("批量加载完成: {} 个规则集", loaded.len());
        Ok(loaded)
    }

    /// 更新已存在的规则集
    #[instrument(skip(self, rule_set), fields(rule_set_id = rule_set.id))]
    pub fn update(&self, rule_set: RuleSetDefinition) -> Result<()> {
        if !self.rule_sets.contains_key(&rule_set.id) {
            warn!("更新不存在的规则集: {}", rule_set.id);
            return Err(RuleError::RuleSetNotFound(rule_set.id));
        }

        self.load(rule_set)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, rule_set_id: i64) -> Result<()> {
        if self.rule_sets.remove(&rule_set_id).is_some() {
            info!("规则集已删除: {}", rule_set_id);
            Ok(())
        } else {
            warn!("删除不存在的规则集: {}", rule_set_id);
            Err(RuleError::RuleSetNotFound(rule_set_id))
        }
    }

    pub fn get(&self, rule_set_id: i64) -> Option<RuleSetDefinition> {
        self.rule_sets.get(&rule_set_id).map(|r| r.clone())
    }

    pub fn contains(&self, rule_set_id: i64) -> bool {
        self.rule_sets.contains_key(&rule_set_id)
    }

    /// 获取所有规则集 ID（升序）
    pub fn list_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.rule_sets.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// 指定业务族中未标记为子组的规则集 ID（升序）
    ///
    /// 存储可同时保存多个业务族的规则集，其他族的规则集交给本族物化会报错。
    pub fn top_level_ids(&self, family: RuleFamily) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .rule_sets
            .iter()
            .filter(|r| r.family == family && !r.is_sub_group)
            .map(|r| *r.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rule_sets.len();
        self.rule_sets.clear();
        info!("已清空 {} 个规则集", count);
    }

    fn validate(rule_set: &RuleSetDefinition) -> Result<()> {
        if rule_set.id <= 0 {
            return Err(RuleError::InvalidArgument(format!(
                "规则集 ID 必须为正数: {}",
                rule_set.id
            )));
        }

        if rule_set.name.trim().is_empty() {
            return Err(RuleError::InvalidArgument(format!(
                "规则集名称不能为空: {}",
                rule_set.id
            )));
        }

        Ok(())
    }

    /// 物化规则集
    ///
    /// `path` 记录当前递归路径上的规则集，用于检测循环引用。
    fn materialize(
        &self,
        rule_set_id: i64,
        catalog: &DescriptorCatalog,
        path: &mut Vec<i64>,
    ) -> Result<Option<ExpressionGroup>> {
        if path.contains(&rule_set_id) {
            return Err(RuleError::RuleSetCycle { rule_set_id });
        }
        if path.len() >= self.max_nesting_depth {
            return Err(RuleError::RuleSetTooDeep {
                rule_set_id,
                max_depth: self.max_nesting_depth,
            });
        }

        // 克隆后释放分片锁，递归时不会与其他读写互相阻塞
        let Some(rule_set) = self.get(rule_set_id) else {
            debug!(rule_set_id, "规则集不存在");
            return Ok(None);
        };

        if !rule_set.is_active {
            debug!(rule_set_id, "规则集已停用");
            return Ok(None);
        }

        if rule_set.family != catalog.family() {
            return Err(RuleError::FamilyMismatch {
                rule_set_id,
                expected: catalog.family().to_string(),
                actual: rule_set.family.to_string(),
            });
        }

        path.push(rule_set_id);
        let mut children = Vec::with_capacity(rule_set.rules.len());
        for rule in &rule_set.rules {
            if let Some(child) = self.materialize_rule(rule, catalog, path)? {
                children.push(child);
            }
        }
        path.pop();

        let mut group = ExpressionGroup::new(
            rule_set.id,
            rule_set.family,
            rule_set.logical_operator,
            children,
        );
        group.is_sub_group = rule_set.is_sub_group || !path.is_empty();

        Ok(Some(group))
    }

    fn materialize_rule(
        &self,
        rule: &RuleDefinition,
        catalog: &DescriptorCatalog,
        path: &mut Vec<i64>,
    ) -> Result<Option<ExpressionNode>> {
        if rule.is_group() {
            let nested_id = rule.value.as_i64().ok_or_else(|| RuleError::TypeMismatch {
                expected: "rule set id".to_string(),
                actual: rule.value.to_string(),
            })?;

            let nested = self.materialize(nested_id, catalog, path)?;
            if nested.is_none() {
                warn!(rule_id = rule.id, nested_id, "嵌套规则集不存在或已停用，已丢弃");
            }
            return Ok(nested.map(ExpressionNode::Group));
        }

        let Some(descriptor) = catalog.get(&rule.rule_type) else {
            warn!(
                rule_id = rule.id,
                rule_type = %rule.rule_type,
                family = %catalog.family(),
                "未知规则类型，生成缺少描述符的条件"
            );
            return Ok(Some(
                RuleExpression::without_descriptor(rule.id, rule.operator, rule.value.clone())
                    .into(),
            ));
        };

        if !descriptor.allows(rule.operator) {
            return Err(RuleError::InvalidOperator {
                operator: rule.operator.to_string(),
                rule_type: rule.rule_type.clone(),
            });
        }

        let checks_presence = matches!(rule.operator, RuleOperator::IsEmpty | RuleOperator::IsNotEmpty);
        if !checks_presence && !descriptor.value_kind().accepts(&rule.value) {
            return Err(RuleError::TypeMismatch {
                expected: descriptor.value_kind().to_string(),
                actual: rule.value.to_string(),
            });
        }

        Ok(Some(
            RuleExpression::new(rule.id, descriptor, rule.operator, rule.value.clone()).into(),
        ))
    }
}

impl Default for RuleSetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleSetMaterializer for RuleSetStore {
    #[instrument(skip(self, catalog), fields(family = %catalog.family()))]
    async fn build_expression_group(
        &self,
        rule_set_id: i64,
        catalog: &DescriptorCatalog,
    ) -> Result<Option<ExpressionGroup>> {
        let result = self.materialize(rule_set_id, catalog, &mut Vec::new());

        let outcome = match &result {
            Ok(Some(_)) => "built",
            Ok(None) => "missing",
            Err(_) => "error",
        };
        metrics::counter!(RULE_SET_MATERIALIZATIONS_TOTAL, "outcome" => outcome).increment(1);

        result
    }
}
