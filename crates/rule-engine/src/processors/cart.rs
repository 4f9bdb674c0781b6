//! 购物车规则处理器

use async_trait::async_trait;
use serde_json::json;
use tracing::{instrument, trace};

use crate::compare::ValueComparer;
use crate::context::RuleContext;
use crate::error::Result;
use crate::expression::ExpressionNode;
use crate::processor::RuleProcessor;

/// 购物车应付总额（小计 - 折扣 + 运费）
#[derive(Debug, Default)]
pub struct CartTotalRule;

#[async_trait]
impl RuleProcessor for CartTotalRule {
    #[instrument(skip_all, fields(node_id = expression.id()))]
    async fn matches(&self, context: &RuleContext, expression: &ExpressionNode) -> Result<bool> {
        let leaf = expression.leaf()?;
        let total = context.cart().await?.total();

        trace!(total, expected = %leaf.value, "购物车总额");
        ValueComparer::matches(Some(&json!(total)), leaf)
    }
}

/// 购物车商品小计
#[derive(Debug, Default)]
pub struct CartSubtotalRule;

#[async_trait]
impl RuleProcessor for CartSubtotalRule {
    #[instrument(skip_all, fields(node_id = expression.id()))]
    async fn matches(&self, context: &RuleContext, expression: &ExpressionNode) -> Result<bool> {
        let leaf = expression.leaf()?;
        let subtotal = context.cart().await?.subtotal();

        trace!(subtotal, expected = %leaf.value, "购物车小计");
        ValueComparer::matches(Some(&json!(subtotal)), leaf)
    }
}

/// 购物车中的商品
#[derive(Debug, Default)]
pub struct ProductInCartRule;

#[async_trait]
impl RuleProcessor for ProductInCartRule {
    #[instrument(skip_all, fields(node_id = expression.id()))]
    async fn matches(&self, context: &RuleContext, expression: &ExpressionNode) -> Result<bool> {
        let leaf = expression.leaf()?;
        let product_ids = context.cart().await?.product_ids();

        ValueComparer::matches(Some(&json!(product_ids)), leaf)
    }
}
