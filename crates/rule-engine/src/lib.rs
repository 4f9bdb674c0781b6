//! 规则表达式引擎
//!
//! 将持久化的规则集物化为表达式树，并针对当前评估上下文求值，
//! 用于折扣、配送方式等按条件生效的业务场景。
//!
//! ## 架构
//!
//! - `expression`: 表达式树（条件 / 逻辑组）
//! - `descriptor`: 规则描述符与描述符目录
//! - `context`: 评估上下文（操作者、作用域、服务句柄、会话键）
//! - `processor`: 处理器接口与注册表
//! - `composite`: 逻辑组的短路求值
//! - `provider`: 评估入口，归一化选择器并构建上下文
//! - `materializer`: 规则集存储与物化
//! - `compare`: 叶子处理器共用的值比较
//! - `processors`: 内置的购物车规则族处理器
//!
//! ## 使用示例
//!
//! ```ignore
//! use rule_engine::{processors, ProcessorRegistry, RuleProvider, RuleSetStore};
//!
//! let mut registry = ProcessorRegistry::new();
//! processors::register_defaults(&mut registry);
//!
//! let provider = RuleProvider::new(
//!     Arc::new(processors::default_catalog()),
//!     Arc::new(registry),
//!     Arc::new(store),
//!     Arc::new(work_context),
//! );
//!
//! let matched = provider.match_rule_sets(&[1, 2], LogicalOperator::And).await?;
//! ```

pub mod cart;
pub mod compare;
pub mod composite;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod expression;
pub mod materializer;
pub mod operators;
pub mod processor;
pub mod processors;
pub mod provider;

pub use cart::{CartAccessor, CartItem, FixedCartAccessor, ShoppingCart};
pub use compare::ValueComparer;
pub use composite::CompositeRuleProcessor;
pub use context::{
    Actor, FixedWorkContext, RuleContext, RuleContextBuilder, RuleServices, StoreScope,
    WorkContext,
};
pub use descriptor::{DescriptorCatalog, ProcessorKind, RuleDescriptor, RuleFamily, RuleValueKind};
pub use error::{Result, RuleError};
pub use expression::{ExpressionGroup, ExpressionNode, RuleExpression};
pub use materializer::{RuleDefinition, RuleSetDefinition, RuleSetMaterializer, RuleSetStore};
pub use operators::{LogicalOperator, RuleOperator};
pub use processor::{ProcessorFactory, ProcessorRegistry, ProcessorResolver, RuleProcessor};
pub use provider::{ContextOverride, RuleProvider, RuleSelectors, RulesContainer};
