//! 规则引擎命令行工具
//!
//! 从文件加载规则集与评估输入（操作者、店铺、购物车），输出评估结果。

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rule_engine::{
    Actor, FixedCartAccessor, FixedWorkContext, LogicalOperator, ProcessorRegistry, RuleProvider,
    RuleServices, RuleSetStore, ShoppingCart, StoreScope, processors,
};
use rules_shared::config::AppConfig;
use rules_shared::observability;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 规则引擎命令行参数
#[derive(Parser, Debug)]
#[command(name = "rule-engine")]
#[command(version, about = "规则表达式评估工具")]
struct Cli {
    /// 规则集定义文件（JSON，单个对象或数组）
    #[arg(long)]
    rule_sets: PathBuf,

    /// 评估输入文件（JSON：actor, scope, cart）
    #[arg(long)]
    input: PathBuf,

    /// 待评估的规则集 ID，可重复；不指定时评估全部顶层规则集
    #[arg(long = "rule-set")]
    rule_set_ids: Vec<i64>,

    /// 多个规则集之间的逻辑操作符
    #[arg(long, value_enum, default_value = "or")]
    operator: OperatorArg,

    /// 日志过滤规则，覆盖配置文件，如 "rule_engine=debug"
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OperatorArg {
    And,
    Or,
}

impl From<OperatorArg> for LogicalOperator {
    fn from(arg: OperatorArg) -> Self {
        match arg {
            OperatorArg::And => LogicalOperator::And,
            OperatorArg::Or => LogicalOperator::Or,
        }
    }
}

/// 评估输入
#[derive(Debug, Deserialize)]
struct EvaluationInput {
    actor: Actor,
    scope: StoreScope,
    #[serde(default)]
    cart: ShoppingCart,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load("rule-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let mut obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    if let Some(log_level) = cli.log_level.as_deref() {
        obs_config = obs_config.with_log_level(log_level);
    }
    let _guard = observability::init(&obs_config)?;

    info!("Starting rule-engine...");

    let store = RuleSetStore::with_max_depth(config.engine.max_nesting_depth);
    let rule_sets = std::fs::read_to_string(&cli.rule_sets)
        .with_context(|| format!("读取规则集文件失败: {}", cli.rule_sets.display()))?;
    let loaded = store.load_from_json(&rule_sets)?;
    info!("Loaded {} rule sets", loaded.len());

    let input = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("读取评估输入失败: {}", cli.input.display()))?;
    let input: EvaluationInput = serde_json::from_str(&input).context("评估输入格式错误")?;

    let catalog = processors::default_catalog();
    let rule_set_ids = if cli.rule_set_ids.is_empty() {
        store.top_level_ids(catalog.family())
    } else {
        cli.rule_set_ids
    };

    let mut registry = ProcessorRegistry::new();
    processors::register_defaults(&mut registry);

    let provider = RuleProvider::new(
        Arc::new(catalog),
        Arc::new(registry),
        Arc::new(store),
        Arc::new(FixedWorkContext::new(input.actor, input.scope)),
    )
    .with_services(RuleServices::default().with_cart(Arc::new(FixedCartAccessor::new(input.cart))));

    let matched = provider
        .match_rule_sets(&rule_set_ids, cli.operator.into())
        .await?;

    info!(?rule_set_ids, matched, "Evaluation finished");
    println!("{}", matched);

    Ok(())
}
