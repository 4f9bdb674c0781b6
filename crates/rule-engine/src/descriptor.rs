//! 规则描述符
//!
//! 描述符标识一条规则条件由哪个处理器评估、允许的操作符以及值的类型。
//! 描述符在目录构建完成后只读，由提供者持有并以 `Arc` 在所有表达式树间共享。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::operators::RuleOperator;

/// 规则族
///
/// 不同提供者（购物车、客户分组等）共享同一份规则存储，
/// 每个提供者只评估属于自己规则族的节点。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    Cart,
    Customer,
    Product,
    Order,
}

impl RuleFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Customer => "customer",
            Self::Product => "product",
            Self::Order => "order",
        }
    }
}

impl fmt::Display for RuleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 规则值类型，决定如何解释条件中的 `value`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleValueKind {
    String,
    Int,
    Float,
    Boolean,
    Money,
    IntArray,
    StringArray,
}

impl RuleValueKind {
    /// 是否为数组类型
    pub fn is_array(&self) -> bool {
        matches!(self, Self::IntArray | Self::StringArray)
    }

    /// 检查值的运行时类型是否与声明类型一致
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float | Self::Money => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::IntArray => value
                .as_array()
                .is_some_and(|arr| arr.iter().all(|v| v.is_i64() || v.is_u64())),
            Self::StringArray => value
                .as_array()
                .is_some_and(|arr| arr.iter().all(Value::is_string)),
        }
    }

    /// 值类型的默认可用操作符
    pub fn default_operators(&self, comparing_sequences: bool) -> Vec<RuleOperator> {
        use RuleOperator::*;

        match self {
            Self::String => vec![
                Eq, Neq, Contains, NotContains, StartsWith, EndsWith, IsEmpty, IsNotEmpty,
            ],
            Self::Int | Self::Float | Self::Money => vec![Eq, Neq, Gt, Gte, Lt, Lte],
            Self::Boolean => vec![Eq, Neq],
            Self::IntArray | Self::StringArray => {
                if comparing_sequences {
                    vec![In, NotIn, AllIn, NotAllIn]
                } else {
                    vec![In, NotIn]
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Money => "money",
            Self::IntArray => "int_array",
            Self::StringArray => "string_array",
        }
    }
}

impl fmt::Display for RuleValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 处理器标识，用于在处理器注册表中查找评估实现
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessorKind(Cow<'static, str>);

impl ProcessorKind {
    /// 保留标识：逻辑组由组合处理器评估
    pub const COMPOSITE: ProcessorKind = ProcessorKind(Cow::Borrowed("composite"));

    pub const fn from_static(kind: &'static str) -> Self {
        Self(Cow::Borrowed(kind))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_composite(&self) -> bool {
        *self == Self::COMPOSITE
    }
}

impl From<String> for ProcessorKind {
    fn from(kind: String) -> Self {
        Self(Cow::Owned(kind))
    }
}

impl From<&'static str> for ProcessorKind {
    fn from(kind: &'static str) -> Self {
        Self::from_static(kind)
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 规则描述符
#[derive(Debug, Clone)]
pub struct RuleDescriptor {
    name: String,
    display_name: String,
    family: RuleFamily,
    value_kind: RuleValueKind,
    processor: ProcessorKind,
    operators: Vec<RuleOperator>,
    comparing_sequences: bool,
}

impl RuleDescriptor {
    pub fn new(
        family: RuleFamily,
        name: impl Into<String>,
        value_kind: RuleValueKind,
        processor: impl Into<ProcessorKind>,
    ) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            family,
            value_kind,
            processor: processor.into(),
            operators: Vec::new(),
            comparing_sequences: false,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// 显式限定可用操作符；不设置时使用值类型的默认操作符
    pub fn with_operators(mut self, operators: impl IntoIterator<Item = RuleOperator>) -> Self {
        self.operators = operators.into_iter().collect();
        self
    }

    /// 标记条件值按集合（序列）比较，而非标量
    pub fn comparing_sequences(mut self) -> Self {
        self.comparing_sequences = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn family(&self) -> RuleFamily {
        self.family
    }

    pub fn value_kind(&self) -> RuleValueKind {
        self.value_kind
    }

    pub fn processor(&self) -> &ProcessorKind {
        &self.processor
    }

    pub fn is_comparing_sequences(&self) -> bool {
        self.comparing_sequences
    }

    pub fn allowed_operators(&self) -> Vec<RuleOperator> {
        if self.operators.is_empty() {
            self.value_kind.default_operators(self.comparing_sequences)
        } else {
            self.operators.clone()
        }
    }

    pub fn allows(&self, operator: RuleOperator) -> bool {
        self.allowed_operators().contains(&operator)
    }
}

/// 描述符目录
///
/// 某个规则族可用的全部描述符，按名称索引。
/// 在首次评估前构建完成，之后只读共享。
#[derive(Debug, Clone)]
pub struct DescriptorCatalog {
    family: RuleFamily,
    descriptors: HashMap<String, Arc<RuleDescriptor>>,
}

impl DescriptorCatalog {
    pub fn new(family: RuleFamily) -> Self {
        Self {
            family,
            descriptors: HashMap::new(),
        }
    }

    pub fn family(&self) -> RuleFamily {
        self.family
    }

    /// 注册描述符，同名描述符会被替换
    pub fn register(&mut self, descriptor: RuleDescriptor) -> Arc<RuleDescriptor> {
        debug!(
            family = %descriptor.family(),
            name = descriptor.name(),
            processor = %descriptor.processor(),
            "注册规则描述符"
        );
        let descriptor = Arc::new(descriptor);
        self.descriptors
            .insert(descriptor.name().to_string(), Arc::clone(&descriptor));
        descriptor
    }

    pub fn get(&self, name: &str) -> Option<Arc<RuleDescriptor>> {
        self.descriptors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
