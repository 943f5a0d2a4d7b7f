//! Core business logic abstractions

pub mod batch;
pub mod cache;
pub mod config;
pub mod currency;
pub mod exchange;
pub mod log;
pub mod price;
pub mod price_cache;
pub mod resolver;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for cleaner imports
pub use batch::{BatchError, BatchOptions, PriceService};
pub use currency::CurrencyRateProvider;
pub use exchange::ExchangeRateService;
pub use price::{PriceRecord, QuoteError, QuoteFetcher};
pub use price_cache::PriceCache;
pub use resolver::{Resolved, SymbolResolver};
