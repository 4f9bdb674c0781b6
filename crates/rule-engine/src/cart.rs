//! 购物车领域模型
//!
//! 购物车规则处理器通过 [`CartAccessor`] 读取当前购物车，
//! 访问器由评估上下文携带，具体实现（数据库、缓存等）由调用方提供。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{Actor, StoreScope};
use crate::error::Result;

/// 金额精度（分）
const CENTS_PER_UNIT: f64 = 100.0;

/// 金额按分取整，累加在整数上进行
fn to_cents(amount: f64) -> i64 {
    (amount * CENTS_PER_UNIT).round() as i64
}

fn from_cents(cents: i64) -> f64 {
    cents as f64 / CENTS_PER_UNIT
}

/// 购物车条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price: f64,
}

impl CartItem {
    pub fn new(product_id: i64, quantity: u32, unit_price: f64) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }

    pub fn line_total(&self) -> f64 {
        from_cents(self.line_total_cents())
    }

    fn line_total_cents(&self) -> i64 {
        to_cents(self.unit_price) * i64::from(self.quantity)
    }
}

/// 购物车
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShoppingCart {
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub discount_amount: f64,
    #[serde(default)]
    pub shipping_amount: f64,
}

impl ShoppingCart {
    pub fn new(items: Vec<CartItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// 商品小计：Σ 单价 × 数量
    pub fn subtotal(&self) -> f64 {
        from_cents(self.subtotal_cents())
    }

    /// 应付总额：小计 - 折扣 + 运费
    pub fn total(&self) -> f64 {
        from_cents(
            self.subtotal_cents() - to_cents(self.discount_amount)
                + to_cents(self.shipping_amount),
        )
    }

    fn subtotal_cents(&self) -> i64 {
        self.items.iter().map(CartItem::line_total_cents).sum()
    }

    pub fn product_ids(&self) -> Vec<i64> {
        self.items.iter().map(|item| item.product_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 购物车访问接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartAccessor: Send + Sync {
    async fn get_cart(&self, actor: &Actor, scope: &StoreScope) -> Result<ShoppingCart>;
}

/// 返回固定购物车的访问器，用于调用方已持有购物车的场景
#[derive(Debug, Clone, Default)]
pub struct FixedCartAccessor {
    cart: ShoppingCart,
}

impl FixedCartAccessor {
    pub fn new(cart: ShoppingCart) -> Self {
        Self { cart }
    }
}

#[async_trait]
impl CartAccessor for FixedCartAccessor {
    async fn get_cart(&self, _actor: &Actor, _scope: &StoreScope) -> Result<ShoppingCart> {
        Ok(self.cart.clone())
    }
}
