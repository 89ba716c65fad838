//! Lightning adapter error kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LightningError {
    /// Backend unreachable or timed out; retry may succeed.
    #[error("lightning backend unavailable: {0}")]
    Transient(String),

    /// The LNURL-pay destination is malformed or refused the amount.
    #[error("invalid lightning address: {0}")]
    InvalidAddress(String),

    /// The backend accepted the request but the payment did not settle.
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// No admin key configured; outbound payouts are disabled.
    #[error("payouts are not configured")]
    PayoutsNotConfigured,

    /// The backend returned something we could not interpret.
    #[error("unexpected backend response: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, LightningError>;

impl LightningError {
    /// Stable machine-readable failure code for payout classification.
    pub fn code(&self) -> &'static str {
        match self {
            LightningError::Transient(_) => "PAYMENT_FAILED",
            LightningError::InvalidAddress(_) => "INVALID_ADDRESS",
            LightningError::PaymentFailed(_) => "PAYMENT_FAILED",
            LightningError::PayoutsNotConfigured => "PAYOUTS_NOT_CONFIGURED",
            LightningError::Protocol(_) => "PAYMENT_FAILED",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, LightningError::Transient(_))
    }
}
