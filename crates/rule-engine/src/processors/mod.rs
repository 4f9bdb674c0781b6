//! 内置规则处理器
//!
//! 提供购物车规则族的参考实现：
//!
//! - `CartTotalRule`: 购物车应付总额
//! - `CartSubtotalRule`: 购物车商品小计
//! - `ProductInCartRule`: 购物车中的商品（集合比较）
//! - `CustomerRoleRule`: 当前客户的角色（集合比较）
//! - `StoreRule`: 当前店铺
//!
//! 处理器都是无状态的，通过 [`register_defaults`] 注册到注册表，
//! 对应的描述符由 [`default_catalog`] 提供。

mod cart;
mod customer;
mod store;

pub use cart::{CartSubtotalRule, CartTotalRule, ProductInCartRule};
pub use customer::CustomerRoleRule;
pub use store::StoreRule;

use crate::descriptor::{DescriptorCatalog, ProcessorKind, RuleDescriptor, RuleFamily, RuleValueKind};
use crate::processor::ProcessorRegistry;

pub const CART_TOTAL: ProcessorKind = ProcessorKind::from_static("cart_total");
pub const CART_SUBTOTAL: ProcessorKind = ProcessorKind::from_static("cart_subtotal");
pub const PRODUCT_IN_CART: ProcessorKind = ProcessorKind::from_static("product_in_cart");
pub const CUSTOMER_ROLE: ProcessorKind = ProcessorKind::from_static("customer_role");
pub const STORE: ProcessorKind = ProcessorKind::from_static("store");

/// 注册全部内置处理器
pub fn register_defaults(registry: &mut ProcessorRegistry) -> &mut ProcessorRegistry {
    registry
        .register_default::<CartTotalRule>(CART_TOTAL)
        .register_default::<CartSubtotalRule>(CART_SUBTOTAL)
        .register_default::<ProductInCartRule>(PRODUCT_IN_CART)
        .register_default::<CustomerRoleRule>(CUSTOMER_ROLE)
        .register_default::<StoreRule>(STORE)
}

/// 内置处理器对应的购物车规则族描述符目录
pub fn default_catalog() -> DescriptorCatalog {
    let mut catalog = DescriptorCatalog::new(RuleFamily::Cart);

    catalog.register(
        RuleDescriptor::new(RuleFamily::Cart, "CartTotal", RuleValueKind::Money, CART_TOTAL)
            .with_display_name("购物车总额"),
    );
    catalog.register(
        RuleDescriptor::new(
            RuleFamily::Cart,
            "CartSubtotal",
            RuleValueKind::Money,
            CART_SUBTOTAL,
        )
        .with_display_name("购物车小计"),
    );
    catalog.register(
        RuleDescriptor::new(
            RuleFamily::Cart,
            "ProductInCart",
            RuleValueKind::IntArray,
            PRODUCT_IN_CART,
        )
        .with_display_name("购物车中的商品")
        .comparing_sequences(),
    );
    catalog.register(
        RuleDescriptor::new(
            RuleFamily::Cart,
            "CustomerRole",
            RuleValueKind::StringArray,
            CUSTOMER_ROLE,
        )
        .with_display_name("客户角色")
        .comparing_sequences(),
    );
    catalog.register(
        RuleDescriptor::new(RuleFamily::Cart, "Store", RuleValueKind::IntArray, STORE)
            .with_display_name("店铺"),
    );

    catalog
}
