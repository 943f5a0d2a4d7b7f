pub mod alpha_vantage;
pub mod util;
pub mod yahoo_finance;

use crate::core::config::{AppConfig, Vendor};
use crate::core::{CurrencyRateProvider, QuoteFetcher};
use alpha_vantage::{AlphaVantageCurrencyProvider, AlphaVantageQuoteFetcher};
use anyhow::{Context, Result};
use std::sync::Arc;
use util::{RetryPolicy, build_client};
use yahoo_finance::{YahooCurrencyProvider, YahooQuoteFetcher};

fn alpha_vantage_key(config: &AppConfig) -> Result<String> {
    config
        .providers
        .alpha_vantage
        .resolve_api_key()
        .with_context(|| {
            format!(
                "Alpha Vantage needs an API key: set providers.alpha_vantage.api_key or {}",
                crate::core::config::ALPHA_VANTAGE_API_KEY_ENV
            )
        })
}

/// Builds the quote adapter selected by `provider`.
pub fn build_quote_fetcher(config: &AppConfig) -> Result<Arc<dyn QuoteFetcher>> {
    let client = build_client(&config.request)?;
    let retry = RetryPolicy::from_config(&config.request);

    Ok(match config.provider {
        Vendor::Yahoo => Arc::new(YahooQuoteFetcher::new(
            &config.providers.yahoo.base_url,
            client,
            retry,
        )),
        Vendor::AlphaVantage => Arc::new(AlphaVantageQuoteFetcher::new(
            &config.providers.alpha_vantage.base_url,
            &alpha_vantage_key(config)?,
            client,
            retry,
        )),
    })
}

/// Builds the exchange rate adapter selected by `rate_provider`.
pub fn build_rate_provider(config: &AppConfig) -> Result<Arc<dyn CurrencyRateProvider>> {
    let client = build_client(&config.request)?;
    let retry = RetryPolicy::from_config(&config.request);

    Ok(match config.rate_vendor() {
        Vendor::Yahoo => Arc::new(YahooCurrencyProvider::new(
            &config.providers.yahoo.base_url,
            client,
            retry,
        )),
        Vendor::AlphaVantage => Arc::new(AlphaVantageCurrencyProvider::new(
            &config.providers.alpha_vantage.base_url,
            &alpha_vantage_key(config)?,
            client,
            retry,
        )),
    })
}
