//! BTC/USD price oracle.
//!
//! Quotes come from an upstream ticker, cached for a short window. When
//! the upstream keeps failing, the oracle falls back to a configured
//! price after a bounded number of logged warnings so attempt pricing
//! keeps working through an outage.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::{LightningError, Result};

/// How a quote was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSource {
    Live,
    Cached,
    Fallback,
}

#[derive(Debug, Clone, Copy)]
pub struct PriceQuote {
    pub usd_per_btc: f64,
    pub source: QuoteSource,
}

/// Seam between the engine and the price feed.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn btc_usd(&self) -> Result<PriceQuote>;
}

/// Fixed price source for dev and tests.
pub struct FixedPrice(pub f64);

#[async_trait]
impl PriceSource for FixedPrice {
    async fn btc_usd(&self) -> Result<PriceQuote> {
        Ok(PriceQuote {
            usd_per_btc: self.0,
            source: QuoteSource::Live,
        })
    }
}

#[derive(Deserialize)]
struct TickerResponse {
    bitcoin: TickerEntry,
}

#[derive(Deserialize)]
struct TickerEntry {
    usd: f64,
}

/// Caching oracle over an upstream ticker.
pub struct CachedPriceOracle {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
    cache_window: Duration,
    fallback_price: Option<f64>,
    /// Consecutive upstream failures; reset on success.
    failures: AtomicU32,
    /// Warnings to emit before silently using the fallback.
    max_warnings: u32,
    cached: Mutex<Option<(f64, Instant)>>,
}

impl CachedPriceOracle {
    pub const DEFAULT_URL: &'static str =
        "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd";

    pub fn new(url: Option<String>, fallback_price: Option<f64>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LightningError::Transient(e.to_string()))?;
        Ok(Self {
            http,
            url: url.unwrap_or_else(|| Self::DEFAULT_URL.to_string()),
            timeout,
            cache_window: Duration::from_secs(60),
            fallback_price,
            failures: AtomicU32::new(0),
            max_warnings: 5,
            cached: Mutex::new(None),
        })
    }

    async fn fetch_live(&self) -> Result<f64> {
        let body: TickerResponse = tokio::time::timeout(self.timeout, async {
            let response = self
                .http
                .get(&self.url)
                .send()
                .await
                .map_err(|e| LightningError::Transient(e.to_string()))?;
            if !response.status().is_success() {
                return Err(LightningError::Transient(format!(
                    "price feed returned {}",
                    response.status()
                )));
            }
            response
                .json()
                .await
                .map_err(|e| LightningError::Protocol(e.to_string()))
        })
        .await
        .map_err(|_| LightningError::Transient("price fetch timed out".into()))??;

        if !body.bitcoin.usd.is_finite() || body.bitcoin.usd <= 0.0 {
            return Err(LightningError::Protocol(format!(
                "implausible price: {}",
                body.bitcoin.usd
            )));
        }
        Ok(body.bitcoin.usd)
    }
}

#[async_trait]
impl PriceSource for CachedPriceOracle {
    async fn btc_usd(&self) -> Result<PriceQuote> {
        if let Some((price, at)) = *self.cached.lock() {
            if at.elapsed() < self.cache_window {
                return Ok(PriceQuote {
                    usd_per_btc: price,
                    source: QuoteSource::Cached,
                });
            }
        }

        match self.fetch_live().await {
            Ok(price) => {
                self.failures.store(0, Ordering::Relaxed);
                *self.cached.lock() = Some((price, Instant::now()));
                Ok(PriceQuote {
                    usd_per_btc: price,
                    source: QuoteSource::Live,
                })
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures <= self.max_warnings {
                    tracing::warn!(error = %e, failures, "Price fetch failed");
                }

                // Prefer a stale quote over the static fallback.
                if let Some((price, _)) = *self.cached.lock() {
                    return Ok(PriceQuote {
                        usd_per_btc: price,
                        source: QuoteSource::Cached,
                    });
                }
                if let Some(price) = self.fallback_price {
                    return Ok(PriceQuote {
                        usd_per_btc: price,
                        source: QuoteSource::Fallback,
                    });
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_price_source() {
        let quote = FixedPrice(65_000.0).btc_usd().await.unwrap();
        assert_eq!(quote.usd_per_btc, 65_000.0);
    }

    #[tokio::test]
    async fn unreachable_feed_uses_fallback() {
        // Reserved TEST-NET-1 address; connections fail fast.
        let oracle = CachedPriceOracle::new(
            Some("http://192.0.2.1:1/price".to_string()),
            Some(42_000.0),
            Duration::from_millis(100),
        )
        .unwrap();

        let quote = oracle.btc_usd().await.unwrap();
        assert_eq!(quote.usd_per_btc, 42_000.0);
        assert_eq!(quote.source, QuoteSource::Fallback);
    }

    #[tokio::test]
    async fn unreachable_feed_without_fallback_errors() {
        let oracle = CachedPriceOracle::new(
            Some("http://192.0.2.1:1/price".to_string()),
            None,
            Duration::from_millis(100),
        )
        .unwrap();

        assert!(oracle.btc_usd().await.is_err());
    }
}
