pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::batch::{BatchOptions, PriceService};
use crate::core::config::AppConfig;
use crate::core::exchange::ExchangeRateService;
use crate::core::price_cache::PriceCache;
use crate::core::resolver::SymbolResolver;
use crate::store::KeyValueStore;
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info};

pub const QUOTES_COLLECTION: &str = "quotes";
pub const RATES_COLLECTION: &str = "exchange_rates";

pub enum AppCommand {
    Prices { symbols: Vec<String>, json: bool },
    Rate { currency: String },
    Watch { symbols: Vec<String>, every: Duration },
    ClearCache,
}

pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

/// Opens the cache keyspace under the configured data directory.
pub fn open_store(config: &AppConfig) -> Result<KeyValueStore> {
    let data_path = config.default_data_path()?;
    if let Err(e) = std::fs::create_dir_all(&data_path) {
        tracing::warn!(path = %data_path.display(), error = %e, "Failed to create data directory");
    }
    Ok(KeyValueStore::open(&data_path))
}

/// Wires vendors, caches and the rate service into a `PriceService`.
pub fn build_service(config: &AppConfig, store: &KeyValueStore) -> Result<PriceService> {
    let fetcher = providers::build_quote_fetcher(config)?;
    let rate_provider = providers::build_rate_provider(config)?;

    let window = config.cache.freshness_window();
    let cache = PriceCache::new(store.collection_or_memory(QUOTES_COLLECTION), window);
    let rates = ExchangeRateService::new(
        rate_provider,
        store.collection_or_memory(RATES_COLLECTION),
        &config.reporting_currency,
        window,
        config.fallback_rates.clone(),
    );
    let resolver = SymbolResolver::new(
        fetcher.clone(),
        config.symbol_overrides.clone(),
        config.exchange_suffixes.clone(),
    );

    Ok(PriceService::new(
        cache,
        resolver,
        fetcher,
        rates,
        BatchOptions::from_config(config),
    ))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("quotefx starting...");

    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let service = build_service(&config, &store)?;

    match command {
        AppCommand::Prices { symbols, json } => cli::prices::run(&service, &symbols, json).await,
        AppCommand::Rate { currency } => cli::rate::run(service.rates(), &currency).await,
        AppCommand::Watch { symbols, every } => cli::watch::run(&service, &symbols, every).await,
        AppCommand::ClearCache => cli::cache::clear(&service).await,
    }
}
