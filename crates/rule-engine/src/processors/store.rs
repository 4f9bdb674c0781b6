//! 店铺规则处理器

use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;

use crate::compare::ValueComparer;
use crate::context::RuleContext;
use crate::error::Result;
use crate::expression::ExpressionNode;
use crate::processor::RuleProcessor;

/// 当前店铺是否在列表中
#[derive(Debug, Default)]
pub struct StoreRule;

#[async_trait]
impl RuleProcessor for StoreRule {
    #[instrument(skip_all, fields(node_id = expression.id(), store_id = context.scope().id))]
    async fn matches(&self, context: &RuleContext, expression: &ExpressionNode) -> Result<bool> {
        let leaf = expression.leaf()?;
        ValueComparer::matches(Some(&json!(context.scope().id)), leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Actor, StoreScope};
    use crate::expression::RuleExpression;
    use crate::operators::RuleOperator;
    use crate::processors::default_catalog;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_store_in_list() {
        let context = RuleContext::new(
            Arc::new(Actor::new(1)),
            Arc::new(StoreScope::new(2, "outlet")),
        );
        let descriptor = default_catalog().get("Store").unwrap();

        let node: ExpressionNode =
            RuleExpression::new(1, Arc::clone(&descriptor), RuleOperator::In, json!([1, 2])).into();
        assert!(StoreRule.matches(&context, &node).await.unwrap());

        let node: ExpressionNode =
            RuleExpression::new(2, descriptor, RuleOperator::NotIn, json!([2])).into();
        assert!(!StoreRule.matches(&context, &node).await.unwrap());
    }
}
