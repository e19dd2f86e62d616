pub mod cli;
pub mod core;
pub mod loader;
pub mod providers;

use crate::cli::value::Scope;
use crate::core::cache::Cache;
use crate::core::config::AppConfig;
use crate::core::currency::CurrencyNormalizer;
use crate::core::fetch::{FetchOrchestrator, FundamentalsCache};
use crate::providers::yahoo_finance::{YahooCurrencyProvider, YahooFundamentalsProvider};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Commands that run against a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Value every portfolio and basket
    Value,
    /// Value portfolio stocks only
    Stocks,
    /// Value baskets only
    Baskets,
    /// Show peer multiples behind one target's valuation
    Peers(String),
}

fn build_orchestrator(config: &AppConfig) -> FetchOrchestrator {
    let base_url = config.yahoo_base_url();
    let fundamentals_provider = Arc::new(YahooFundamentalsProvider::new(base_url));
    let currency_provider = Arc::new(YahooCurrencyProvider::new(base_url));

    let normalizer = Arc::new(CurrencyNormalizer::new(currency_provider, &config.currency));
    let cache: Arc<FundamentalsCache> = Arc::new(Cache::with_capacity(config.fetch.cache_capacity));

    FetchOrchestrator::new(
        fundamentals_provider,
        normalizer,
        cache,
        config.fetch.max_workers,
        config.fetch.delay(),
    )
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fairval starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    // Caches live for this run only
    let orchestrator = build_orchestrator(&config);

    match command {
        AppCommand::Value => cli::value::run(&config, &orchestrator, Scope::All).await,
        AppCommand::Stocks => cli::value::run(&config, &orchestrator, Scope::Stocks).await,
        AppCommand::Baskets => cli::value::run(&config, &orchestrator, Scope::Baskets).await,
        AppCommand::Peers(ticker) => cli::peers::run(&config, &orchestrator, &ticker).await,
    }
}
