//! 评估上下文
//!
//! 每次评估调用都会新建一个上下文，携带当前用户、当前店铺以及叶子处理器需要的服务句柄。
//! 会话键在首次访问时计算一次并缓存到上下文生命周期结束。

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::cart::{CartAccessor, ShoppingCart};
use crate::error::{Result, RuleError};

/// 当前操作者（客户/会话主体）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    /// 角色系统名，如 "Registered"
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            username: None,
            roles: Vec::new(),
        }
    }

    /// 匿名访客
    pub fn guest(id: i64) -> Self {
        Self::new(id).with_roles(["Guests"])
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

/// 当前作用域（店铺/租户）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreScope {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_currency")]
    pub currency_code: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl StoreScope {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            currency_code: default_currency(),
        }
    }
}

/// 环境访问接口：提供当前操作者和当前作用域
#[cfg_attr(test, mockall::automock)]
pub trait WorkContext: Send + Sync {
    fn current_actor(&self) -> Arc<Actor>;
    fn current_scope(&self) -> Arc<StoreScope>;
}

/// 固定操作者与作用域的环境实现
#[derive(Debug, Clone)]
pub struct FixedWorkContext {
    actor: Arc<Actor>,
    scope: Arc<StoreScope>,
}

impl FixedWorkContext {
    pub fn new(actor: Actor, scope: StoreScope) -> Self {
        Self {
            actor: Arc::new(actor),
            scope: Arc::new(scope),
        }
    }
}

impl WorkContext for FixedWorkContext {
    fn current_actor(&self) -> Arc<Actor> {
        Arc::clone(&self.actor)
    }

    fn current_scope(&self) -> Arc<StoreScope> {
        Arc::clone(&self.scope)
    }
}

/// 叶子处理器可用的服务句柄
#[derive(Clone, Default)]
pub struct RuleServices {
    pub cart: Option<Arc<dyn CartAccessor>>,
}

impl RuleServices {
    pub fn with_cart(mut self, cart: Arc<dyn CartAccessor>) -> Self {
        self.cart = Some(cart);
        self
    }
}

impl fmt::Debug for RuleServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleServices")
            .field("cart", &self.cart.is_some())
            .finish()
    }
}

/// 会话键生成函数
pub type SessionKeyBuilder = Arc<dyn Fn(&Actor, &StoreScope) -> String + Send + Sync>;

/// 对若干片段计算 SHA-256 十六进制摘要
pub fn hash_session_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

/// 评估上下文
pub struct RuleContext {
    actor: Arc<Actor>,
    scope: Arc<StoreScope>,
    services: RuleServices,
    session_key: OnceLock<String>,
    session_key_builder: Option<SessionKeyBuilder>,
}

impl RuleContext {
    pub fn new(actor: Arc<Actor>, scope: Arc<StoreScope>) -> Self {
        Self {
            actor,
            scope,
            services: RuleServices::default(),
            session_key: OnceLock::new(),
            session_key_builder: None,
        }
    }

    pub fn builder() -> RuleContextBuilder {
        RuleContextBuilder::default()
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn scope(&self) -> &StoreScope {
        &self.scope
    }

    pub fn services(&self) -> &RuleServices {
        &self.services
    }

    /// 会话键：首次访问时计算，之后返回缓存值
    ///
    /// 未提供生成函数时，仅由操作者和作用域派生。
    pub fn session_key(&self) -> &str {
        self.session_key.get_or_init(|| match &self.session_key_builder {
            Some(builder) => builder(&self.actor, &self.scope),
            None => hash_session_key(&[&self.actor.id.to_string(), &self.scope.id.to_string()]),
        })
    }

    pub fn cart_accessor(&self) -> Result<&Arc<dyn CartAccessor>> {
        self.services
            .cart
            .as_ref()
            .ok_or(RuleError::MissingService("cart"))
    }

    /// 读取当前操作者在当前作用域下的购物车
    pub async fn cart(&self) -> Result<ShoppingCart> {
        self.cart_accessor()?
            .get_cart(&self.actor, &self.scope)
            .await
    }
}

impl fmt::Debug for RuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleContext")
            .field("actor", &self.actor.id)
            .field("scope", &self.scope.id)
            .field("services", &self.services)
            .field("session_key", &self.session_key.get())
            .finish()
    }
}

/// 评估上下文构建器
///
/// 提供者先填充默认值，再交给调用方的覆盖回调修改。
#[derive(Default)]
pub struct RuleContextBuilder {
    pub actor: Option<Arc<Actor>>,
    pub scope: Option<Arc<StoreScope>>,
    pub services: RuleServices,
    pub session_key_builder: Option<SessionKeyBuilder>,
}

impl RuleContextBuilder {
    pub fn actor(mut self, actor: Arc<Actor>) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn scope(mut self, scope: Arc<StoreScope>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn services(mut self, services: RuleServices) -> Self {
        self.services = services;
        self
    }

    pub fn cart_accessor(mut self, cart: Arc<dyn CartAccessor>) -> Self {
        self.services.cart = Some(cart);
        self
    }

    pub fn session_key_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(&Actor, &StoreScope) -> String + Send + Sync + 'static,
    {
        self.session_key_builder = Some(Arc::new(builder));
        self
    }

    /// 构建上下文，操作者和作用域必须已设置
    pub fn build(self) -> Result<RuleContext> {
        let actor = self
            .actor
            .ok_or_else(|| RuleError::InvalidArgument("评估上下文缺少操作者".to_string()))?;
        let scope = self
            .scope
            .ok_or_else(|| RuleError::InvalidArgument("评估上下文缺少作用域".to_string()))?;

        Ok(RuleContext {
            actor,
            scope,
            services: self.services,
            session_key: OnceLock::new(),
            session_key_builder: self.session_key_builder,
        })
    }
}
