//! 规则表达式树
//!
//! 表达式节点要么是单个条件（叶子），要么是按逻辑操作符组合子节点的逻辑组。
//! 表达式树在每次评估时由规则集定义构建，评估完成后即丢弃。

use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::descriptor::{RuleDescriptor, RuleFamily};
use crate::error::{Result, RuleError};
use crate::operators::{LogicalOperator, RuleOperator};

/// 表达式节点（条件或逻辑组）
#[derive(Debug, Clone)]
pub enum ExpressionNode {
    Leaf(RuleExpression),
    Group(ExpressionGroup),
}

impl ExpressionNode {
    pub fn id(&self) -> i64 {
        match self {
            Self::Leaf(leaf) => leaf.id,
            Self::Group(group) => group.id,
        }
    }

    /// 节点所属规则族；缺少描述符的条件返回 None
    pub fn family(&self) -> Option<RuleFamily> {
        match self {
            Self::Leaf(leaf) => leaf.descriptor.as_ref().map(|d| d.family()),
            Self::Group(group) => Some(group.family),
        }
    }

    pub fn as_leaf(&self) -> Option<&RuleExpression> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&ExpressionGroup> {
        match self {
            Self::Leaf(_) => None,
            Self::Group(group) => Some(group),
        }
    }

    /// 取出条件节点，供叶子处理器使用
    pub fn leaf(&self) -> Result<&RuleExpression> {
        self.as_leaf()
            .ok_or(RuleError::NotALeaf { node_id: self.id() })
    }

    /// 节点的结构标识，用于派生会话键
    pub fn structural_identity(&self) -> String {
        let mut out = String::new();
        self.write_identity(&mut out);
        out
    }

    fn write_identity(&self, out: &mut String) {
        match self {
            Self::Leaf(leaf) => {
                let name = leaf.descriptor.as_ref().map_or("?", |d| d.name());
                let _ = write!(
                    out,
                    "{}:{}:{}:{}",
                    leaf.id, name, leaf.operator, leaf.raw_value
                );
            }
            Self::Group(group) => group.write_identity(out),
        }
    }
}

impl From<RuleExpression> for ExpressionNode {
    fn from(leaf: RuleExpression) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<ExpressionGroup> for ExpressionNode {
    fn from(group: ExpressionGroup) -> Self {
        Self::Group(group)
    }
}

/// 条件节点
#[derive(Debug, Clone)]
pub struct RuleExpression {
    /// 来源规则定义 ID
    pub id: i64,
    /// 描述符由提供者的目录持有，节点只保存共享引用
    pub descriptor: Option<Arc<RuleDescriptor>>,
    pub operator: RuleOperator,
    pub value: Value,
    /// 持久化时的原始值文本，用于诊断
    pub raw_value: String,
}

impl RuleExpression {
    pub fn new(
        id: i64,
        descriptor: Arc<RuleDescriptor>,
        operator: RuleOperator,
        value: impl Into<Value>,
    ) -> Self {
        let value = value.into();
        Self {
            id,
            descriptor: Some(descriptor),
            operator,
            raw_value: value.to_string(),
            value,
        }
    }

    /// 创建缺少描述符的条件（例如规则类型已不存在的持久化规则）
    pub fn without_descriptor(id: i64, operator: RuleOperator, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            id,
            descriptor: None,
            operator,
            raw_value: value.to_string(),
            value,
        }
    }

    pub fn with_raw_value(mut self, raw_value: impl Into<String>) -> Self {
        self.raw_value = raw_value.into();
        self
    }

    /// 获取描述符，缺失时返回配置错误
    pub fn descriptor(&self) -> Result<&Arc<RuleDescriptor>> {
        self.descriptor
            .as_ref()
            .ok_or_else(|| RuleError::MissingDescriptor {
                node_id: self.id,
                raw_value: self.raw_value.clone(),
            })
    }

    pub fn is_comparing_sequences(&self) -> bool {
        self.descriptor
            .as_ref()
            .is_some_and(|d| d.is_comparing_sequences())
    }
}

/// 逻辑组节点
#[derive(Debug, Clone)]
pub struct ExpressionGroup {
    pub id: i64,
    pub family: RuleFamily,
    pub logical_operator: LogicalOperator,
    /// 仅用于描述符目录的簿记，不影响评估语义
    pub is_sub_group: bool,
    pub children: Vec<ExpressionNode>,
}

impl ExpressionGroup {
    pub fn new(
        id: i64,
        family: RuleFamily,
        logical_operator: LogicalOperator,
        children: Vec<ExpressionNode>,
    ) -> Self {
        Self {
            id,
            family,
            logical_operator,
            is_sub_group: false,
            children,
        }
    }

    pub fn and(id: i64, family: RuleFamily, children: Vec<ExpressionNode>) -> Self {
        Self::new(id, family, LogicalOperator::And, children)
    }

    pub fn or(id: i64, family: RuleFamily, children: Vec<ExpressionNode>) -> Self {
        Self::new(id, family, LogicalOperator::Or, children)
    }

    pub fn sub_group(mut self) -> Self {
        self.is_sub_group = true;
        self
    }

    pub fn push(&mut self, child: impl Into<ExpressionNode>) -> &mut Self {
        self.children.push(child.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// 逻辑组的结构标识
    pub fn structural_identity(&self) -> String {
        let mut out = String::new();
        self.write_identity(&mut out);
        out
    }

    fn write_identity(&self, out: &mut String) {
        let _ = write!(out, "{}:{}(", self.id, self.logical_operator);
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            child.write_identity(out);
        }
        out.push(')');
    }
}
