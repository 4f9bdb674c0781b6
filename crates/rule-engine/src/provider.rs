//! 规则提供者
//!
//! 提供者是规则评估的入口：接收规则集 ID、规则容器或现成的表达式树，
//! 归一化为单个顶层逻辑组，构建评估上下文后交给组合处理器求值。
//!
//! ## 归一化规则
//!
//! - 没有任何选择器（或规则集全部已不存在）时返回 true
//! - 只有一个选择器且为逻辑组时直接评估该组，忽略传入的逻辑操作符
//! - 其他情况合成 id 为 0 的顶层组，子节点为全部选择器
//!
//! 注意：空逻辑组本身评估为 false，与"没有选择器返回 true"不同。

use std::sync::Arc;
use std::time::Instant;

use rules_shared::observability::metrics::{
    RULE_EVALUATIONS_TOTAL, RULE_EVALUATION_DURATION_SECONDS, RULE_EVALUATION_ERRORS_TOTAL,
};
use tracing::{debug, instrument, warn};

use crate::composite::CompositeRuleProcessor;
use crate::context::{RuleContext, RuleContextBuilder, RuleServices, WorkContext, hash_session_key};
use crate::descriptor::{DescriptorCatalog, RuleFamily};
use crate::error::{Result, RuleError};
use crate::expression::{ExpressionGroup, ExpressionNode};
use crate::materializer::RuleSetMaterializer;
use crate::operators::LogicalOperator;
use crate::processor::{ProcessorRegistry, ProcessorResolver, RuleProcessor};

/// 关联了规则集的业务对象（折扣、配送方式等）
pub trait RulesContainer: Send + Sync {
    fn rule_set_ids(&self) -> Vec<i64>;
}

/// 待评估的规则来源
pub enum RuleSelectors<'a> {
    RuleSetIds(&'a [i64]),
    Container(&'a dyn RulesContainer),
    Expressions(Vec<ExpressionNode>),
}

/// 上下文覆盖回调，在默认值填充之后执行
pub type ContextOverride = Box<dyn FnOnce(&mut RuleContextBuilder) + Send>;

/// 规则提供者
pub struct RuleProvider {
    catalog: Arc<DescriptorCatalog>,
    registry: Arc<ProcessorRegistry>,
    materializer: Arc<dyn RuleSetMaterializer>,
    work_context: Arc<dyn WorkContext>,
    services: RuleServices,
}

impl RuleProvider {
    pub fn new(
        catalog: Arc<DescriptorCatalog>,
        registry: Arc<ProcessorRegistry>,
        materializer: Arc<dyn RuleSetMaterializer>,
        work_context: Arc<dyn WorkContext>,
    ) -> Self {
        Self {
            catalog,
            registry,
            materializer,
            work_context,
            services: RuleServices::default(),
        }
    }

    /// 设置评估上下文默认携带的服务句柄
    pub fn with_services(mut self, services: RuleServices) -> Self {
        self.services = services;
        self
    }

    pub fn family(&self) -> RuleFamily {
        self.catalog.family()
    }

    pub fn catalog(&self) -> &DescriptorCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// 评估一组规则集
    pub async fn match_rule_sets(
        &self,
        rule_set_ids: &[i64],
        logical_operator: LogicalOperator,
    ) -> Result<bool> {
        self.matches(RuleSelectors::RuleSetIds(rule_set_ids), logical_operator, None)
            .await
    }

    /// 评估业务对象关联的规则集（OR）
    pub async fn match_container(&self, container: &dyn RulesContainer) -> Result<bool> {
        self.match_container_with(container, LogicalOperator::Or)
            .await
    }

    pub async fn match_container_with(
        &self,
        container: &dyn RulesContainer,
        logical_operator: LogicalOperator,
    ) -> Result<bool> {
        self.matches(RuleSelectors::Container(container), logical_operator, None)
            .await
    }

    /// 评估调用方构建好的表达式树
    pub async fn match_expressions(
        &self,
        expressions: Vec<ExpressionNode>,
        logical_operator: LogicalOperator,
    ) -> Result<bool> {
        self.matches(RuleSelectors::Expressions(expressions), logical_operator, None)
            .await
    }

    /// 评估入口
    #[instrument(
        level = "info",
        skip_all,
        fields(family = %self.catalog.family(), operator = %logical_operator)
    )]
    pub async fn matches(
        &self,
        selectors: RuleSelectors<'_>,
        logical_operator: LogicalOperator,
        context_override: Option<ContextOverride>,
    ) -> Result<bool> {
        let start = Instant::now();
        let family = self.family().as_str();

        let result = self
            .evaluate_selectors(selectors, logical_operator, context_override)
            .await;

        metrics::histogram!(RULE_EVALUATION_DURATION_SECONDS, "family" => family)
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(matched) => {
                debug!(matched, "规则评估完成");
                metrics::counter!(
                    RULE_EVALUATIONS_TOTAL,
                    "family" => family,
                    "result" => if *matched { "true" } else { "false" }
                )
                .increment(1);
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "规则评估失败");
                metrics::counter!(
                    RULE_EVALUATION_ERRORS_TOTAL,
                    "family" => family,
                    "kind" => e.kind()
                )
                .increment(1);
            }
        }

        result
    }

    async fn evaluate_selectors(
        &self,
        selectors: RuleSelectors<'_>,
        logical_operator: LogicalOperator,
        context_override: Option<ContextOverride>,
    ) -> Result<bool> {
        let mut expressions = match selectors {
            RuleSelectors::RuleSetIds(ids) => self.materialize(ids).await?,
            RuleSelectors::Container(container) => {
                self.materialize(&container.rule_set_ids()).await?
            }
            RuleSelectors::Expressions(expressions) => expressions,
        };

        let group = match expressions.pop() {
            None => {
                debug!("没有待评估的规则，视为匹配");
                return Ok(true);
            }
            Some(ExpressionNode::Group(group)) if expressions.is_empty() => group,
            Some(last) => {
                expressions.push(last);
                ExpressionGroup::new(0, self.family(), logical_operator, expressions)
            }
        };

        let context = self.create_context(&group, context_override)?;
        CompositeRuleProcessor::new(&group, self)
            .evaluate(&context)
            .await
    }

    /// 物化规则集，已不存在的规则集被丢弃
    async fn materialize(&self, rule_set_ids: &[i64]) -> Result<Vec<ExpressionNode>> {
        if let Some(id) = rule_set_ids.iter().find(|id| **id <= 0) {
            return Err(RuleError::InvalidArgument(format!(
                "规则集 ID 必须为正数: {}",
                id
            )));
        }

        let mut expressions = Vec::with_capacity(rule_set_ids.len());
        for &rule_set_id in rule_set_ids {
            match self
                .materializer
                .build_expression_group(rule_set_id, &self.catalog)
                .await?
            {
                Some(group) => expressions.push(ExpressionNode::Group(group)),
                None => warn!(rule_set_id, "规则集不存在，已跳过"),
            }
        }

        Ok(expressions)
    }

    /// 为一次评估构建上下文
    ///
    /// 默认值来自环境（操作者、作用域）和提供者的服务句柄，覆盖回调之后执行；
    /// 回调清空的操作者或作用域会重新取默认值。
    pub fn create_context(
        &self,
        group: &ExpressionGroup,
        context_override: Option<ContextOverride>,
    ) -> Result<RuleContext> {
        let actor = self.work_context.current_actor();
        let scope = self.work_context.current_scope();
        let identity = group.structural_identity();

        let mut builder = RuleContext::builder()
            .actor(Arc::clone(&actor))
            .scope(Arc::clone(&scope))
            .services(self.services.clone())
            .session_key_builder(move |actor, scope| {
                hash_session_key(&[&actor.id.to_string(), &scope.id.to_string(), &identity])
            });

        if let Some(apply) = context_override {
            apply(&mut builder);
        }

        if builder.actor.is_none() {
            builder.actor = Some(actor);
        }
        if builder.scope.is_none() {
            builder.scope = Some(scope);
        }

        builder.build()
    }

    /// 将表达式节点解析为处理器
    ///
    /// 逻辑组解析为绑定到该组的组合处理器；条件按描述符的处理器标识在注册表中查找。
    pub fn resolve<'a>(&'a self, node: &'a ExpressionNode) -> Result<Box<dyn RuleProcessor + 'a>> {
        match node {
            ExpressionNode::Group(group) => Ok(Box::new(CompositeRuleProcessor::new(group, self))),
            ExpressionNode::Leaf(leaf) => {
                let descriptor = leaf.descriptor()?;
                match self.registry.create(descriptor.processor()) {
                    Some(processor) => Ok(processor),
                    None => Err(RuleError::UnknownProcessor {
                        kind: descriptor.processor().to_string(),
                        node_id: leaf.id,
                        raw_value: leaf.raw_value.clone(),
                    }),
                }
            }
        }
    }
}

impl ProcessorResolver for RuleProvider {
    fn family(&self) -> RuleFamily {
        self.catalog.family()
    }

    fn resolve<'a>(&'a self, node: &'a ExpressionNode) -> Result<Box<dyn RuleProcessor + 'a>> {
        RuleProvider::resolve(self, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Actor, MockWorkContext, StoreScope};
    use crate::descriptor::{RuleDescriptor, RuleValueKind};
    use crate::expression::RuleExpression;
    use crate::materializer::MockRuleSetMaterializer;
    use crate::operators::RuleOperator;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 返回条件布尔值的处理器
    #[derive(Default)]
    struct ValueRule;

    #[async_trait]
    impl RuleProcessor for ValueRule {
        async fn matches(&self, _context: &RuleContext, expression: &ExpressionNode) -> Result<bool> {
            Ok(expression.leaf()?.value.as_bool().unwrap_or(false))
        }
    }

    fn catalog() -> DescriptorCatalog {
        let mut catalog = DescriptorCatalog::new(RuleFamily::Cart);
        catalog.register(RuleDescriptor::new(
            RuleFamily::Cart,
            "Value",
            RuleValueKind::Boolean,
            "value",
        ));
        catalog.register(RuleDescriptor::new(
            RuleFamily::Cart,
            "Unregistered",
            RuleValueKind::Boolean,
            "unregistered",
        ));
        catalog
    }

    fn work_context() -> MockWorkContext {
        let mut work = MockWorkContext::new();
        work.expect_current_actor()
            .returning(|| Arc::new(Actor::new(7).with_roles(["Registered"])));
        work.expect_current_scope()
            .returning(|| Arc::new(StoreScope::new(1, "main")));
        work
    }

    fn provider(materializer: MockRuleSetMaterializer) -> RuleProvider {
        let mut registry = ProcessorRegistry::new();
        registry.register_default::<ValueRule>("value");

        RuleProvider::new(
            Arc::new(catalog()),
            Arc::new(registry),
            Arc::new(materializer),
            Arc::new(work_context()),
        )
    }

    fn leaf(id: i64, value: bool) -> ExpressionNode {
        let descriptor = catalog().get("Value").unwrap();
        RuleExpression::new(id, descriptor, RuleOperator::Eq, value).into()
    }

    fn group(id: i64, operator: LogicalOperator, children: Vec<ExpressionNode>) -> ExpressionGroup {
        ExpressionGroup::new(id, RuleFamily::Cart, operator, children)
    }

    struct Discount(Vec<i64>);

    impl RulesContainer for Discount {
        fn rule_set_ids(&self) -> Vec<i64> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_no_selectors_is_true() {
        let provider = provider(MockRuleSetMaterializer::new());

        assert!(provider.match_rule_sets(&[], LogicalOperator::And).await.unwrap());
        assert!(provider.match_rule_sets(&[], LogicalOperator::Or).await.unwrap());
        assert!(provider
            .match_expressions(vec![], LogicalOperator::And)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_single_group_uses_its_own_operator() {
        let provider = provider(MockRuleSetMaterializer::new());
        let single = group(
            5,
            LogicalOperator::Or,
            vec![leaf(1, false), leaf(2, true)],
        );

        // 传入的 AND 被忽略，按组自身的 OR 评估
        assert!(provider
            .match_expressions(vec![single.into()], LogicalOperator::And)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_multiple_selectors_are_wrapped() {
        let provider = provider(MockRuleSetMaterializer::new());

        let expressions = vec![leaf(1, true), leaf(2, false)];
        assert!(!provider
            .match_expressions(expressions.clone(), LogicalOperator::And)
            .await
            .unwrap());
        assert!(provider
            .match_expressions(expressions, LogicalOperator::Or)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_rule_sets_materialized_and_missing_dropped() {
        let mut materializer = MockRuleSetMaterializer::new();
        materializer
            .expect_build_expression_group()
            .withf(|id, _| *id == 1)
            .times(1)
            .returning(|id, _| Ok(Some(group(id, LogicalOperator::And, vec![leaf(10, true)]))));
        materializer
            .expect_build_expression_group()
            .withf(|id, _| *id == 2)
            .times(1)
            .returning(|_, _| Ok(None));

        let provider = provider(materializer);
        assert!(provider
            .match_rule_sets(&[1, 2], LogicalOperator::And)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_all_rule_sets_missing_is_true() {
        let mut materializer = MockRuleSetMaterializer::new();
        materializer
            .expect_build_expression_group()
            .returning(|_, _| Ok(None));

        let provider = provider(materializer);
        assert!(provider
            .match_container(&Discount(vec![3, 4]))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_container_defaults_to_or() {
        let mut materializer = MockRuleSetMaterializer::new();
        materializer
            .expect_build_expression_group()
            .returning(|id, _| Ok(Some(group(id, LogicalOperator::And, vec![leaf(id, id == 2)]))));

        let provider = provider(materializer);
        let discount = Discount(vec![1, 2]);

        assert!(provider.match_container(&discount).await.unwrap());
        assert!(!provider
            .match_container_with(&discount, LogicalOperator::And)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_non_positive_rule_set_id_rejected() {
        let mut materializer = MockRuleSetMaterializer::new();
        materializer.expect_build_expression_group().times(0);

        let provider = provider(materializer);
        let err = provider
            .match_rule_sets(&[1, 0], LogicalOperator::Or)
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_materializer_error_propagates() {
        let mut materializer = MockRuleSetMaterializer::new();
        materializer
            .expect_build_expression_group()
            .returning(|id, _| Err(RuleError::RuleSetCycle { rule_set_id: id }));

        let provider = provider(materializer);
        let err = provider
            .match_rule_sets(&[8], LogicalOperator::Or)
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::RuleSetCycle { rule_set_id: 8 }));
    }

    #[tokio::test]
    async fn test_resolve_leaf_and_group() {
        let provider = provider(MockRuleSetMaterializer::new());
        let context = provider
            .create_context(&group(0, LogicalOperator::And, vec![]), None)
            .unwrap();

        // 条件节点由注册的处理器求值
        for value in [true, false] {
            let node = leaf(1, value);
            let processor = provider.resolve(&node).unwrap();
            assert_eq!(processor.matches(&context, &node).await.unwrap(), value);
        }

        // 逻辑组解析为绑定到该组的组合处理器
        let all: ExpressionNode =
            group(2, LogicalOperator::And, vec![leaf(21, true), leaf(22, false)]).into();
        let any: ExpressionNode =
            group(3, LogicalOperator::Or, vec![leaf(31, false), leaf(32, true)]).into();

        let processor = provider.resolve(&all).unwrap();
        assert!(!processor.matches(&context, &all).await.unwrap());

        let processor = provider.resolve(&any).unwrap();
        assert!(processor.matches(&context, &any).await.unwrap());
    }

    #[test]
    fn test_resolve_configuration_errors() {
        let provider = provider(MockRuleSetMaterializer::new());

        let descriptor = provider.catalog().get("Unregistered").unwrap();
        let node: ExpressionNode = RuleExpression::new(3, descriptor, RuleOperator::Eq, true).into();
        let err = provider.resolve(&node).err().unwrap();
        assert!(matches!(err, RuleError::UnknownProcessor { ref kind, node_id: 3, .. } if kind == "unregistered"));
        assert!(err.is_configuration_error());

        let node: ExpressionNode = RuleExpression::without_descriptor(4, RuleOperator::Eq, true).into();
        let err = provider.resolve(&node).err().unwrap();
        assert!(matches!(err, RuleError::MissingDescriptor { node_id: 4, .. }));
    }

    #[test]
    fn test_create_context_defaults() {
        let provider = provider(MockRuleSetMaterializer::new());
        let group = group(1, LogicalOperator::And, vec![leaf(2, true)]);

        let context = provider.create_context(&group, None).unwrap();
        assert_eq!(context.actor().id, 7);
        assert_eq!(context.scope().id, 1);

        let identity = group.structural_identity();
        assert_eq!(context.session_key(), hash_session_key(&["7", "1", identity.as_str()]));
    }

    #[test]
    fn test_create_context_override() {
        let provider = provider(MockRuleSetMaterializer::new());
        let group = group(1, LogicalOperator::And, vec![]);

        let context = provider
            .create_context(
                &group,
                Some(Box::new(|builder: &mut RuleContextBuilder| {
                    builder.actor = Some(Arc::new(Actor::new(99)));
                    builder.scope = None;
                })),
            )
            .unwrap();

        assert_eq!(context.actor().id, 99);
        // 被清空的作用域重新取默认值
        assert_eq!(context.scope().id, 1);
    }

    #[tokio::test]
    async fn test_override_session_key_builder() {
        let provider = provider(MockRuleSetMaterializer::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let group = group(1, LogicalOperator::And, vec![]);
        let context = provider
            .create_context(
                &group,
                Some(Box::new(move |builder: &mut RuleContextBuilder| {
                    builder.session_key_builder = Some(Arc::new(move |actor: &Actor, _scope: &StoreScope| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        format!("actor-{}", actor.id)
                    }));
                })),
            )
            .unwrap();

        assert_eq!(context.session_key(), "actor-7");
        assert_eq!(context.session_key(), "actor-7");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
