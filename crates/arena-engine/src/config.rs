//! Engine tuning knobs.

use std::time::Duration;

/// Parameters of the daily competition.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Paid attempts per user per tournament.
    pub max_attempts: i64,
    /// USD price of one attempt, converted to sats via the oracle.
    pub attempt_cost_usd: f64,
    /// Sats price of the legacy one-shot buy-in invoice.
    pub buy_in_sats: i64,
    /// House fee retained from the prize pool at close.
    pub house_fee: f64,
    /// Winner shares of the distributable pool, 1st through 3rd.
    pub payout_shares: [f64; 3],
    /// Pending payouts older than this are retried.
    pub payout_retry_after: Duration,
    /// Consecutive failures per payout before a PAYOUT-ALERT record.
    pub payout_alert_threshold: i64,
    /// Reject score submissions without an attempt handle.
    pub require_attempt_handle: bool,
    /// Deposit bounds, inclusive.
    pub deposit_min_sats: i64,
    pub deposit_max_sats: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_cost_usd: 5.0,
            buy_in_sats: 1_000,
            house_fee: 0.02,
            payout_shares: [0.50, 0.30, 0.20],
            payout_retry_after: Duration::from_secs(5 * 60),
            payout_alert_threshold: 5,
            require_attempt_handle: true,
            deposit_min_sats: 10,
            deposit_max_sats: 10_000_000,
        }
    }
}
