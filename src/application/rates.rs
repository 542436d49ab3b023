use crate::domain::money::ExchangeRate;
use crate::domain::ports::{RateQuote, RateSourceRef};
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct CachedQuote {
    quote: RateQuote,
    fetched_at: Instant,
}

/// TTL cache in front of the exchange-rate feed.
///
/// Never fails: when the feed is down the last known rate is served, and
/// before any successful fetch the configured default applies.
pub struct RateCache {
    source: RateSourceRef,
    ttl: Duration,
    fallback: ExchangeRate,
    quotes: RwLock<HashMap<(String, String), CachedQuote>>,
}

impl RateCache {
    pub fn new(source: RateSourceRef, ttl: Duration, fallback: ExchangeRate) -> Self {
        Self {
            source,
            ttl,
            fallback,
            quotes: RwLock::new(HashMap::new()),
        }
    }

    pub async fn rate(&self, base: &str, quote: &str) -> RateQuote {
        let key = (base.to_ascii_uppercase(), quote.to_ascii_uppercase());

        let cached = self.quotes.read().await.get(&key).copied();
        if let Some(cached) = cached
            && cached.fetched_at.elapsed() < self.ttl
        {
            return cached.quote;
        }

        match self.source.get_rate(&key.0, &key.1).await {
            Ok(fresh) => {
                tracing::debug!(base = %key.0, quote = %key.1, rate = %fresh.rate, "Refreshed exchange rate");
                self.quotes.write().await.insert(
                    key,
                    CachedQuote {
                        quote: fresh,
                        fetched_at: Instant::now(),
                    },
                );
                fresh
            }
            Err(e) => match cached {
                Some(stale) => {
                    tracing::warn!(error = %e, rate = %stale.quote.rate, as_of = %stale.quote.as_of, "Rate feed failed, serving last known rate");
                    stale.quote
                }
                None => {
                    tracing::warn!(error = %e, rate = %self.fallback, "Rate feed failed with no cached rate, using default");
                    RateQuote {
                        rate: self.fallback,
                        as_of: Utc::now(),
                    }
                }
            },
        }
    }
}
