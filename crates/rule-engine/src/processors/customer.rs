//! 客户规则处理器

use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;

use crate::compare::ValueComparer;
use crate::context::RuleContext;
use crate::error::Result;
use crate::expression::ExpressionNode;
use crate::processor::RuleProcessor;

/// 当前客户的角色系统名
#[derive(Debug, Default)]
pub struct CustomerRoleRule;

#[async_trait]
impl RuleProcessor for CustomerRoleRule {
    #[instrument(skip_all, fields(node_id = expression.id(), actor_id = context.actor().id))]
    async fn matches(&self, context: &RuleContext, expression: &ExpressionNode) -> Result<bool> {
        let leaf = expression.leaf()?;
        ValueComparer::matches(Some(&json!(context.actor().roles)), leaf)
    }
}
