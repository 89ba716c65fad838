//! Lightning backend adapter for sats-arena.
//!
//! Wraps an LNbits-compatible REST backend: invoice creation, payment
//! status polling, and LNURL-pay payouts to Lightning addresses. Also
//! hosts the webhook signature verifier (the inbound half of the payment
//! pipeline) and the BTC/USD price oracle. Every outbound call carries a
//! deadline; the backend being down degrades to `Transient` errors, never
//! hangs a request handler.

pub mod client;
pub mod error;
pub mod lnurl;
pub mod price;
pub mod webhook;

pub use client::{Invoice, LnbitsClient, LnbitsConfig, PaymentStatus, PayoutReceipt};
pub use error::{LightningError, Result};
pub use price::{CachedPriceOracle, FixedPrice, PriceQuote, PriceSource};

use async_trait::async_trait;

/// Seam between the engine and the Lightning backend.
///
/// The production implementation is [`LnbitsClient`]; tests plug in
/// scripted fakes.
#[async_trait]
pub trait LightningBackend: Send + Sync {
    /// Create a bolt11 invoice for `amount_sats`.
    async fn create_invoice(&self, amount_sats: i64, memo: &str) -> Result<Invoice>;

    /// Current status of a payment by (normalized) payment hash.
    async fn payment_status(&self, payment_hash: &str) -> Result<PaymentStatus>;

    /// Resolve a Lightning address via LNURL-pay and push `amount_sats`
    /// to it.
    async fn pay_to_address(
        &self,
        address: &str,
        amount_sats: i64,
        memo: &str,
    ) -> Result<PayoutReceipt>;
}

/// Convert a USD amount to sats at the given USD-per-BTC rate.
pub fn usd_to_sats(usd: f64, usd_per_btc: f64) -> i64 {
    if usd_per_btc <= 0.0 {
        return 0;
    }
    ((usd / usd_per_btc) * 100_000_000.0).round() as i64
}

/// Convert sats to USD at the given USD-per-BTC rate.
pub fn sats_to_usd(sats: i64, usd_per_btc: f64) -> f64 {
    (sats as f64 / 100_000_000.0) * usd_per_btc
}
