use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const ALPHA_VANTAGE_API_KEY_ENV: &str = "ALPHA_VANTAGE_API_KEY";

/// Upstream market-data vendor.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    #[default]
    Yahoo,
    AlphaVantage,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlphaVantageProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for AlphaVantageProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.alphavantage.co".to_string(),
            api_key: None,
        }
    }
}

impl AlphaVantageProviderConfig {
    /// The configured key, falling back to the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(ALPHA_VANTAGE_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub yahoo: YahooProviderConfig,
    #[serde(default)]
    pub alpha_vantage: AlphaVantageProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum age of a cached quote or exchange rate.
    pub freshness_window_secs: u64,
    /// Minimum time between two batches that reach upstream. 0 disables.
    pub min_batch_interval_secs: u64,
    /// How long failed symbols are skipped. Unset means failures are
    /// retried on every batch.
    pub negative_ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: 30 * 60,
            min_batch_interval_secs: 30,
            negative_ttl_secs: None,
        }
    }
}

impl CacheConfig {
    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    pub fn min_batch_interval(&self) -> Duration {
        Duration::from_secs(self.min_batch_interval_secs)
    }

    pub fn negative_ttl(&self) -> Option<Duration> {
        self.negative_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RequestConfig {
    pub timeout_secs: u64,
    pub retries: usize,
    pub retry_delay_ms: u64,
    pub max_concurrency: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 1,
            retry_delay_ms: 500,
            max_concurrency: 4,
        }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

pub fn default_exchange_suffixes() -> Vec<String> {
    [".L", ".PA", ".AS", ".ST", ".MI", ".DE"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Rates to EUR used when the live rate provider is unavailable.
pub fn default_fallback_rates() -> HashMap<String, f64> {
    [
        ("USD", 0.92),
        ("SEK", 0.087),
        ("GBP", 1.17),
        ("JPY", 0.0062),
        ("CHF", 1.05),
        ("NOK", 0.086),
        ("DKK", 0.134),
        ("CAD", 0.68),
        ("AUD", 0.61),
    ]
    .into_iter()
    .map(|(currency, rate)| (currency.to_string(), rate))
    .collect()
}

fn default_reporting_currency() -> String {
    "EUR".to_string()
}

fn default_quote_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_reporting_currency")]
    pub reporting_currency: String,
    /// Currency assumed when a quote does not report one.
    #[serde(default = "default_quote_currency")]
    pub default_quote_currency: String,
    #[serde(default)]
    pub provider: Vendor,
    /// Vendor for exchange rates. Defaults to `provider`.
    #[serde(default)]
    pub rate_provider: Option<Vendor>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub symbol_overrides: HashMap<String, Vec<String>>,
    #[serde(default = "default_exchange_suffixes")]
    pub exchange_suffixes: Vec<String>,
    #[serde(default = "default_fallback_rates")]
    pub fallback_rates: HashMap<String, f64>,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reporting_currency: default_reporting_currency(),
            default_quote_currency: default_quote_currency(),
            provider: Vendor::default(),
            rate_provider: None,
            providers: ProvidersConfig::default(),
            cache: CacheConfig::default(),
            request: RequestConfig::default(),
            symbol_overrides: HashMap::new(),
            exchange_suffixes: default_exchange_suffixes(),
            fallback_rates: default_fallback_rates(),
            data_path: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(path = %config_path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "quotefx", "quotefx")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "quotefx", "quotefx")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config.normalized())
    }

    /// Uppercases currency codes and symbol keys so lookups are
    /// case-insensitive.
    pub fn normalized(mut self) -> Self {
        self.reporting_currency = self.reporting_currency.trim().to_uppercase();
        self.default_quote_currency = self.default_quote_currency.trim().to_uppercase();
        self.symbol_overrides = self
            .symbol_overrides
            .into_iter()
            .map(|(symbol, candidates)| (symbol.trim().to_uppercase(), candidates))
            .collect();
        self.fallback_rates = self
            .fallback_rates
            .into_iter()
            .map(|(currency, rate)| (currency.trim().to_uppercase(), rate))
            .collect();
        self
    }

    pub fn rate_vendor(&self) -> Vendor {
        self.rate_provider.unwrap_or(self.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").expect("Failed to deserialize");
        assert_eq!(config.reporting_currency, "EUR");
        assert_eq!(config.default_quote_currency, "USD");
        assert_eq!(config.provider, Vendor::Yahoo);
        assert_eq!(config.rate_vendor(), Vendor::Yahoo);
        assert_eq!(config.cache.freshness_window(), Duration::from_secs(1800));
        assert_eq!(config.cache.min_batch_interval(), Duration::from_secs(30));
        assert!(config.cache.negative_ttl().is_none());
        assert_eq!(config.exchange_suffixes, default_exchange_suffixes());
        assert_eq!(config.fallback_rates.get("USD"), Some(&0.92));
        assert_eq!(
            config.providers.yahoo.base_url,
            "https://query1.finance.yahoo.com"
        );
    }

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
reporting_currency: eur
default_quote_currency: usd
provider: alpha_vantage
rate_provider: yahoo
providers:
  yahoo:
    base_url: "http://example.com/yahoo"
  alpha_vantage:
    base_url: "http://example.com/av"
    api_key: "demo"
cache:
  freshness_window_secs: 600
  negative_ttl_secs: 120
request:
  timeout_secs: 5
  max_concurrency: 2
symbol_overrides:
  cspx: ["CSPX.L", "SXR8.DE"]
exchange_suffixes: [".L", ".DE"]
fallback_rates:
  usd: 0.9
"#;

        let config = serde_yaml::from_str::<AppConfig>(yaml_str)
            .expect("Failed to deserialize")
            .normalized();

        assert_eq!(config.reporting_currency, "EUR");
        assert_eq!(config.default_quote_currency, "USD");
        assert_eq!(config.provider, Vendor::AlphaVantage);
        assert_eq!(config.rate_vendor(), Vendor::Yahoo);
        assert_eq!(config.providers.yahoo.base_url, "http://example.com/yahoo");
        assert_eq!(config.providers.alpha_vantage.base_url, "http://example.com/av");
        assert_eq!(
            config.providers.alpha_vantage.resolve_api_key().as_deref(),
            Some("demo")
        );
        assert_eq!(config.cache.freshness_window_secs, 600);
        // Unspecified fields inside a section keep their defaults
        assert_eq!(config.cache.min_batch_interval_secs, 30);
        assert_eq!(config.cache.negative_ttl(), Some(Duration::from_secs(120)));
        assert_eq!(config.request.timeout(), Duration::from_secs(5));
        assert_eq!(config.request.retries, 1);
        assert_eq!(config.request.max_concurrency, 2);
        assert_eq!(
            config.symbol_overrides.get("CSPX"),
            Some(&vec!["CSPX.L".to_string(), "SXR8.DE".to_string()])
        );
        assert_eq!(config.exchange_suffixes, vec![".L", ".DE"]);
        assert_eq!(config.fallback_rates.get("USD"), Some(&0.9));
        assert!(!config.fallback_rates.contains_key("SEK"));
    }

    #[test]
    fn test_zero_negative_ttl_disables_negative_cache() {
        let config: AppConfig =
            serde_yaml::from_str("cache:\n  negative_ttl_secs: 0\n").unwrap();
        assert!(config.cache.negative_ttl().is_none());
    }

    #[test]
    fn test_custom_data_path() {
        let config: AppConfig = serde_yaml::from_str("data_path: /tmp/quotefx\n").unwrap();
        assert_eq!(
            config.default_data_path().unwrap(),
            PathBuf::from("/tmp/quotefx")
        );
    }

    #[test]
    fn test_load_from_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "reporting_currency: sek\n").unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.reporting_currency, "SEK");
    }

    #[test]
    fn test_load_from_path_reports_parse_errors() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "cache: [not, a, map]\n").unwrap();

        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }
}
