//! 规则处理器与注册表
//!
//! 每种规则类型（"购物车总额"、"客户角色"等）由一个处理器评估，
//! 处理器通过描述符上的 [`ProcessorKind`] 在注册表中查找。
//!
//! ## 设计说明
//!
//! 注册表以 `ProcessorKind` 为 key 保存处理器工厂，启动时填充，之后只读。
//! 每次解析都会创建新的处理器实例，处理器不要求可跨上下文复用。
//!
//! ## 使用示例
//!
//! ```ignore
//! use rule_engine::processor::ProcessorRegistry;
//! use rule_engine::processors::CartTotalRule;
//!
//! let mut registry = ProcessorRegistry::new();
//! registry.register_default::<CartTotalRule>("cart_total");
//!
//! let processor = registry.create(&"cart_total".into()).unwrap();
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::RuleContext;
use crate::descriptor::{ProcessorKind, RuleFamily};
use crate::error::Result;
use crate::expression::ExpressionNode;

/// 规则处理器 Trait
///
/// 所有叶子规则插件和组合处理器都实现此接口。
/// 处理器可以在内部执行 I/O（如查询购物车），错误原样向上传播。
#[async_trait]
pub trait RuleProcessor: Send + Sync {
    async fn matches(&self, context: &RuleContext, expression: &ExpressionNode) -> Result<bool>;
}

/// 处理器工厂
pub trait ProcessorFactory: Send + Sync {
    fn create(&self) -> Box<dyn RuleProcessor>;
}

impl<F> ProcessorFactory for F
where
    F: Fn() -> Box<dyn RuleProcessor> + Send + Sync,
{
    fn create(&self) -> Box<dyn RuleProcessor> {
        self()
    }
}

/// 表达式节点到处理器的解析接口
///
/// 由提供者实现；组合处理器借助它递归解析子节点。
pub trait ProcessorResolver: Send + Sync {
    /// 解析器可评估的规则族
    fn family(&self) -> RuleFamily;

    fn resolve<'a>(&'a self, node: &'a ExpressionNode) -> Result<Box<dyn RuleProcessor + 'a>>;
}

/// 处理器注册表
pub struct ProcessorRegistry {
    factories: HashMap<ProcessorKind, Arc<dyn ProcessorFactory>>,
}

impl ProcessorRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// 注册处理器工厂
    ///
    /// 已存在相同标识的工厂会被替换。保留标识 `composite` 由提供者处理，不可注册。
    pub fn register(
        &mut self,
        kind: impl Into<ProcessorKind>,
        factory: Arc<dyn ProcessorFactory>,
    ) -> &mut Self {
        let kind = kind.into();
        if kind.is_composite() {
            warn!(kind = %kind, "组合处理器标识为保留标识，忽略注册");
            return self;
        }

        debug!(kind = %kind, "注册规则处理器");
        self.factories.insert(kind, factory);
        self
    }

    /// 注册无状态处理器类型，每次解析创建一个默认实例
    pub fn register_default<P>(&mut self, kind: impl Into<ProcessorKind>) -> &mut Self
    where
        P: RuleProcessor + Default + 'static,
    {
        self.register(
            kind,
            Arc::new(|| Box::new(P::default()) as Box<dyn RuleProcessor>),
        )
    }

    /// 创建指定标识的处理器实例
    ///
    /// 返回 None 表示该标识没有注册对应的工厂
    pub fn create(&self, kind: &ProcessorKind) -> Option<Box<dyn RuleProcessor>> {
        self.factories.get(kind).map(|factory| factory.create())
    }

    pub fn contains(&self, kind: &ProcessorKind) -> bool {
        self.factories.contains_key(kind)
    }

    /// 获取所有已注册的处理器标识
    pub fn registered_kinds(&self) -> Vec<ProcessorKind> {
        self.factories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
