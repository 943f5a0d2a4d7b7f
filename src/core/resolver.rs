//! Maps requested tickers to identifiers the quote vendor accepts.

use crate::core::cache::KeyValueCollection;
use crate::core::price::{QuoteError, QuoteFetcher, RawQuote};
use crate::store::memory::MemoryCollection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A vendor identifier for a requested symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub identifier: String,
    /// The quote fetched while resolving, absent for a remembered resolution.
    pub quote: Option<RawQuote>,
}

pub struct SymbolResolver {
    fetcher: Arc<dyn QuoteFetcher>,
    overrides: HashMap<String, Vec<String>>,
    suffixes: Vec<String>,
    resolved: MemoryCollection,
}

impl SymbolResolver {
    pub fn new(
        fetcher: Arc<dyn QuoteFetcher>,
        overrides: HashMap<String, Vec<String>>,
        suffixes: Vec<String>,
    ) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(symbol, candidates)| (symbol.to_uppercase(), candidates))
            .collect();
        Self {
            fetcher,
            overrides,
            suffixes,
            resolved: MemoryCollection::new(),
        }
    }

    /// Identifiers to try for `symbol`, in order: configured overrides,
    /// the raw symbol, then the symbol with each exchange suffix.
    pub fn candidates(&self, symbol: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let mut push = |candidate: String| {
            if !candidate.is_empty() && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        };

        if let Some(overrides) = self.overrides.get(symbol) {
            overrides.iter().map(|c| c.trim().to_string()).for_each(&mut push);
        }
        push(symbol.to_string());

        let has_suffix = self
            .suffixes
            .iter()
            .any(|suffix| symbol.ends_with(suffix.as_str()));
        if !has_suffix {
            self.suffixes
                .iter()
                .map(|suffix| format!("{symbol}{suffix}"))
                .for_each(&mut push);
        }
        candidates
    }

    /// Returns the first candidate with a usable quote, or `None` if every
    /// candidate failed. Errors only when the vendor rate limits us.
    pub async fn resolve(&self, symbol: &str) -> Result<Option<Resolved>, QuoteError> {
        if let Ok(Some(bytes)) = self.resolved.get(symbol.as_bytes()).await {
            if let Ok(identifier) = String::from_utf8(bytes) {
                debug!(symbol, identifier = %identifier, "Using remembered resolution");
                return Ok(Some(Resolved {
                    identifier,
                    quote: None,
                }));
            }
        }

        for candidate in self.candidates(symbol) {
            debug!(symbol, candidate = %candidate, "Trying identifier");
            if let Some(quote) = self.fetcher.try_quote(&candidate).await? {
                if candidate != symbol {
                    info!(symbol, identifier = %candidate, "Resolved symbol");
                }
                let _ = self
                    .resolved
                    .put(symbol.as_bytes(), candidate.as_bytes(), None)
                    .await;
                return Ok(Some(Resolved {
                    identifier: candidate,
                    quote: Some(quote),
                }));
            }
        }

        info!(symbol, "Could not resolve symbol");
        Ok(None)
    }

    /// Discards a remembered resolution so the next call tries every
    /// candidate again.
    pub async fn forget(&self, symbol: &str) {
        let _ = self.resolved.remove(symbol.as_bytes()).await;
    }
}
