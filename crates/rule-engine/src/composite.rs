//! 组合处理器
//!
//! 按声明顺序逐个评估逻辑组的子节点，实现短路求值：
//! AND 遇到 false 立即返回，OR 遇到 true 立即返回。

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::context::RuleContext;
use crate::error::Result;
use crate::expression::{ExpressionGroup, ExpressionNode};
use crate::operators::LogicalOperator;
use crate::processor::{ProcessorResolver, RuleProcessor};

/// 组合处理器，绑定到一个逻辑组和解析它子节点的提供者
pub struct CompositeRuleProcessor<'a> {
    group: &'a ExpressionGroup,
    resolver: &'a dyn ProcessorResolver,
}

impl<'a> CompositeRuleProcessor<'a> {
    pub fn new(group: &'a ExpressionGroup, resolver: &'a dyn ProcessorResolver) -> Self {
        Self { group, resolver }
    }

    pub fn group(&self) -> &ExpressionGroup {
        self.group
    }

    /// 评估绑定的逻辑组
    ///
    /// 子节点严格串行 await，任一子节点出错立即中止整个评估。
    /// 不属于当前规则族的子节点被跳过；没有评估任何子节点时返回 false。
    pub async fn evaluate(&self, context: &RuleContext) -> Result<bool> {
        let group = self.group;
        let family = self.resolver.family();
        let mut result = false;

        for (i, child) in group.children.iter().enumerate() {
            if let Some(child_family) = child.family() {
                if child_family != family {
                    trace!(
                        group_id = group.id,
                        index = i,
                        child_family = %child_family,
                        "跳过其他规则族的子节点"
                    );
                    continue;
                }
            }

            let processor = self.resolver.resolve(child)?;
            result = processor.matches(context, child).await?;

            trace!(
                group_id = group.id,
                index = i,
                node_id = child.id(),
                matched = result,
                "子节点评估完成"
            );

            match group.logical_operator {
                LogicalOperator::And if !result => {
                    debug!(group_id = group.id, index = i, "AND 短路 - 子节点不匹配");
                    return Ok(false);
                }
                LogicalOperator::Or if result => {
                    debug!(group_id = group.id, index = i, "OR 短路 - 子节点匹配");
                    return Ok(true);
                }
                _ => {}
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl<'a> RuleProcessor for CompositeRuleProcessor<'a> {
    /// 评估解析时绑定的逻辑组；`expression` 即该组本身
    async fn matches(&self, context: &RuleContext, expression: &ExpressionNode) -> Result<bool> {
        debug_assert_eq!(
            expression.id(),
            self.group.id,
            "组合处理器只能评估解析时绑定的逻辑组"
        );
        self.evaluate(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Actor, StoreScope};
    use crate::descriptor::{RuleDescriptor, RuleFamily, RuleValueKind};
    use crate::error::RuleError;
    use crate::expression::RuleExpression;
    use crate::operators::RuleOperator;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按条件值返回结果并记录调用次数的处理器
    struct ValueProcessor {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RuleProcessor for ValueProcessor {
        async fn matches(&self, _context: &RuleContext, expression: &ExpressionNode) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(expression.leaf()?.value.as_bool().unwrap_or(false))
        }
    }

    struct TestResolver {
        family: RuleFamily,
        calls: Arc<AtomicUsize>,
    }

    impl TestResolver {
        fn new() -> Self {
            Self {
                family: RuleFamily::Cart,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProcessorResolver for TestResolver {
        fn family(&self) -> RuleFamily {
            self.family
        }

        fn resolve<'a>(&'a self, node: &'a ExpressionNode) -> Result<Box<dyn RuleProcessor + 'a>> {
            match node {
                ExpressionNode::Group(group) => Ok(Box::new(CompositeRuleProcessor::new(group, self))),
                ExpressionNode::Leaf(leaf) => {
                    leaf.descriptor()?;
                    Ok(Box::new(ValueProcessor {
                        calls: Arc::clone(&self.calls),
                    }))
                }
            }
        }
    }

    fn leaf(id: i64, family: RuleFamily, value: bool) -> ExpressionNode {
        let descriptor = Arc::new(RuleDescriptor::new(
            family,
            "Value",
            RuleValueKind::Boolean,
            "value",
        ));
        RuleExpression::new(id, descriptor, RuleOperator::Eq, value).into()
    }

    fn context() -> RuleContext {
        RuleContext::new(Arc::new(Actor::new(1)), Arc::new(StoreScope::new(1, "main")))
    }

    async fn evaluate(resolver: &TestResolver, group: &ExpressionGroup) -> Result<bool> {
        CompositeRuleProcessor::new(group, resolver)
            .evaluate(&context())
            .await
    }

    #[test]
    fn test_matches_bound_group() {
        let resolver = TestResolver::new();
        let group = ExpressionGroup::or(1, RuleFamily::Cart, vec![leaf(2, RuleFamily::Cart, true)]);
        let node: ExpressionNode = group.clone().into();

        let processor = CompositeRuleProcessor::new(&group, &resolver);
        assert!(tokio_test::block_on(processor.matches(&context(), &node)).unwrap());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "组合处理器只能评估解析时绑定的逻辑组")]
    fn test_matches_other_group_panics() {
        let resolver = TestResolver::new();
        let bound = ExpressionGroup::or(1, RuleFamily::Cart, vec![leaf(2, RuleFamily::Cart, true)]);
        let other: ExpressionNode = ExpressionGroup::or(5, RuleFamily::Cart, vec![]).into();

        let processor = CompositeRuleProcessor::new(&bound, &resolver);
        let _ = tokio_test::block_on(processor.matches(&context(), &other));
    }

    #[tokio::test]
    async fn test_and_all_true() {
        let resolver = TestResolver::new();
        let group = ExpressionGroup::and(
            1,
            RuleFamily::Cart,
            vec![leaf(2, RuleFamily::Cart, true), leaf(3, RuleFamily::Cart, true)],
        );

        assert!(evaluate(&resolver, &group).await.unwrap());
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test]
    async fn test_and_short_circuit() {
        let resolver = TestResolver::new();
        let group = ExpressionGroup::and(
            1,
            RuleFamily::Cart,
            vec![
                leaf(2, RuleFamily::Cart, false),
                leaf(3, RuleFamily::Cart, true),
                leaf(4, RuleFamily::Cart, true),
            ],
        );

        assert!(!evaluate(&resolver, &group).await.unwrap());
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_or_short_circuit() {
        let resolver = TestResolver::new();
        let group = ExpressionGroup::or(
            1,
            RuleFamily::Cart,
            vec![
                leaf(2, RuleFamily::Cart, false),
                leaf(3, RuleFamily::Cart, true),
                leaf(4, RuleFamily::Cart, false),
            ],
        );

        assert!(evaluate(&resolver, &group).await.unwrap());
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test]
    async fn test_or_all_false() {
        let resolver = TestResolver::new();
        let group = ExpressionGroup::or(
            1,
            RuleFamily::Cart,
            vec![leaf(2, RuleFamily::Cart, false), leaf(3, RuleFamily::Cart, false)],
        );

        assert!(!evaluate(&resolver, &group).await.unwrap());
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_group_is_false() {
        let resolver = TestResolver::new();

        let group = ExpressionGroup::and(1, RuleFamily::Cart, vec![]);
        assert!(!evaluate(&resolver, &group).await.unwrap());

        let group = ExpressionGroup::or(1, RuleFamily::Cart, vec![]);
        assert!(!evaluate(&resolver, &group).await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_family_children_skipped() {
        let resolver = TestResolver::new();
        let group = ExpressionGroup::and(
            1,
            RuleFamily::Cart,
            vec![
                leaf(2, RuleFamily::Customer, false),
                leaf(3, RuleFamily::Cart, true),
            ],
        );

        assert!(evaluate(&resolver, &group).await.unwrap());
        assert_eq!(resolver.calls(), 1);

        // 只有其他规则族的子节点时，OR 组也返回 false
        let group = ExpressionGroup::or(
            1,
            RuleFamily::Cart,
            vec![leaf(2, RuleFamily::Customer, true)],
        );
        assert!(!evaluate(&resolver, &group).await.unwrap());
    }

    #[tokio::test]
    async fn test_nested_groups() {
        let resolver = TestResolver::new();
        let group = ExpressionGroup::and(
            1,
            RuleFamily::Cart,
            vec![
                leaf(2, RuleFamily::Cart, true),
                ExpressionGroup::or(
                    3,
                    RuleFamily::Cart,
                    vec![leaf(4, RuleFamily::Cart, false), leaf(5, RuleFamily::Cart, true)],
                )
                .sub_group()
                .into(),
            ],
        );

        assert!(evaluate(&resolver, &group).await.unwrap());
        assert_eq!(resolver.calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_descriptor_is_not_skipped() {
        let resolver = TestResolver::new();
        let group = ExpressionGroup::or(
            1,
            RuleFamily::Cart,
            vec![
                RuleExpression::without_descriptor(2, RuleOperator::Eq, true).into(),
                leaf(3, RuleFamily::Cart, true),
            ],
        );

        let err = evaluate(&resolver, &group).await.unwrap_err();
        assert!(matches!(err, RuleError::MissingDescriptor { node_id: 2, .. }));
        assert_eq!(resolver.calls(), 0);
    }
}
