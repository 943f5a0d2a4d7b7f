//! Currency conversion abstractions

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted rate row, one per currency pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub last_updated: DateTime<Utc>,
    pub source: String,
    pub is_active: bool,
}

impl ExchangeRate {
    pub fn pair_key(from: &str, to: &str) -> String {
        format!("{from}-{to}")
    }

    pub fn is_valid(&self) -> bool {
        is_valid_rate(self.rate)
    }
}

pub fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

#[async_trait]
pub trait CurrencyRateProvider: Send + Sync {
    /// Short vendor name recorded as the rate's source.
    fn name(&self) -> &str;

    async fn get_rate(&self, from: &str, to: &str) -> Result<f64>;
}
