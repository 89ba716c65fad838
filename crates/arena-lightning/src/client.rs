//! LNbits REST client.
//!
//! Invoice creation and status polling use the invoice key; outbound
//! payments use the admin key. Every request runs under the configured
//! deadline so a wedged backend surfaces as `Transient` instead of
//! stalling handlers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use arena_common::normalize_payment_hash;

use crate::error::{LightningError, Result};
use crate::lnurl;
use crate::LightningBackend;

/// Connection settings for an LNbits-compatible backend.
#[derive(Debug, Clone)]
pub struct LnbitsConfig {
    /// Base URL, e.g. `https://lnbits.example.com`.
    pub base_url: String,
    /// Invoice key: create invoices, read payment status.
    pub api_key: String,
    /// Admin key: send outbound payments. Payouts are disabled when
    /// absent.
    pub admin_key: Option<String>,
    /// Deadline for backend calls.
    pub timeout: Duration,
    /// Deadline for LNURL-pay resolution (third-party servers).
    pub lnurl_timeout: Duration,
    /// Webhook URL handed to the backend at invoice creation.
    pub webhook_url: Option<String>,
}

impl LnbitsConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            admin_key: None,
            timeout: Duration::from_secs(10),
            lnurl_timeout: Duration::from_secs(5),
            webhook_url: None,
        }
    }
}

/// A freshly created invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub payment_hash: String,
    pub payment_request: String,
    /// Seconds until the invoice expires.
    pub expires_in: u64,
}

/// Status of an inbound payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentStatus {
    pub paid: bool,
}

/// Result of a successful outbound payment.
#[derive(Debug, Clone)]
pub struct PayoutReceipt {
    pub payment_hash: String,
}

#[derive(Serialize)]
struct CreateInvoiceRequest<'a> {
    out: bool,
    amount: i64,
    memo: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook: Option<&'a str>,
}

#[derive(Deserialize)]
struct CreateInvoiceResponse {
    payment_hash: String,
    payment_request: String,
}

#[derive(Deserialize)]
struct PaymentStatusResponse {
    paid: bool,
}

#[derive(Serialize)]
struct PayInvoiceRequest<'a> {
    out: bool,
    bolt11: &'a str,
}

#[derive(Deserialize)]
struct PayInvoiceResponse {
    payment_hash: String,
}

/// LNbits-compatible Lightning backend.
pub struct LnbitsClient {
    config: LnbitsConfig,
    http: Client,
}

impl LnbitsClient {
    pub fn new(config: LnbitsConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| LightningError::Transient(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn payouts_configured(&self) -> bool {
        self.config.admin_key.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Pay a bolt11 invoice with the admin key.
    pub(crate) async fn pay_invoice(&self, bolt11: &str) -> Result<PayoutReceipt> {
        let admin_key = self
            .config
            .admin_key
            .as_deref()
            .ok_or(LightningError::PayoutsNotConfigured)?;

        let response = self
            .http
            .post(self.url("/api/v1/payments"))
            .header("X-Api-Key", admin_key)
            .json(&PayInvoiceRequest { out: true, bolt11 })
            .send()
            .await
            .map_err(classify_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LightningError::PaymentFailed(format!(
                "backend returned {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let body: PayInvoiceResponse = response
            .json()
            .await
            .map_err(|e| LightningError::Protocol(e.to_string()))?;
        let payment_hash = normalize_payment_hash(&body.payment_hash)
            .map_err(|e| LightningError::Protocol(e.to_string()))?;
        Ok(PayoutReceipt { payment_hash })
    }

    pub(crate) fn lnurl_timeout(&self) -> Duration {
        self.config.lnurl_timeout
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }
}

#[async_trait]
impl LightningBackend for LnbitsClient {
    async fn create_invoice(&self, amount_sats: i64, memo: &str) -> Result<Invoice> {
        let request = CreateInvoiceRequest {
            out: false,
            amount: amount_sats,
            memo,
            webhook: self.config.webhook_url.as_deref(),
        };

        let response = self
            .http
            .post(self.url("/api/v1/payments"))
            .header("X-Api-Key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest)?;

        if !response.status().is_success() {
            return Err(LightningError::Transient(format!(
                "invoice creation returned {}",
                response.status()
            )));
        }

        let body: CreateInvoiceResponse = response
            .json()
            .await
            .map_err(|e| LightningError::Protocol(e.to_string()))?;

        let payment_hash = normalize_payment_hash(&body.payment_hash)
            .map_err(|e| LightningError::Protocol(e.to_string()))?;

        Ok(Invoice {
            payment_hash,
            payment_request: body.payment_request,
            expires_in: 600,
        })
    }

    async fn payment_status(&self, payment_hash: &str) -> Result<PaymentStatus> {
        let response = self
            .http
            .get(self.url(&format!("/api/v1/payments/{}", payment_hash)))
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await
            .map_err(classify_reqwest)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // Unknown to the backend yet; treat as unpaid until expiry.
            return Ok(PaymentStatus { paid: false });
        }
        if !response.status().is_success() {
            return Err(LightningError::Transient(format!(
                "payment status returned {}",
                response.status()
            )));
        }

        let body: PaymentStatusResponse = response
            .json()
            .await
            .map_err(|e| LightningError::Protocol(e.to_string()))?;
        Ok(PaymentStatus { paid: body.paid })
    }

    async fn pay_to_address(
        &self,
        address: &str,
        amount_sats: i64,
        memo: &str,
    ) -> Result<PayoutReceipt> {
        if !self.payouts_configured() {
            return Err(LightningError::PayoutsNotConfigured);
        }
        let bolt11 = lnurl::fetch_invoice_for_address(self, address, amount_sats, memo).await?;
        self.pay_invoice(&bolt11).await
    }
}

fn classify_reqwest(e: reqwest::Error) -> LightningError {
    if e.is_timeout() || e.is_connect() {
        LightningError::Transient(e.to_string())
    } else {
        LightningError::Protocol(e.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let client = LnbitsClient::new(LnbitsConfig::new("https://ln.example.com/", "key")).unwrap();
        assert_eq!(
            client.url("/api/v1/payments"),
            "https://ln.example.com/api/v1/payments"
        );
    }

    #[test]
    fn payouts_require_admin_key() {
        let client = LnbitsClient::new(LnbitsConfig::new("https://ln.example.com", "key")).unwrap();
        assert!(!client.payouts_configured());

        let mut config = LnbitsConfig::new("https://ln.example.com", "key");
        config.admin_key = Some("admin".to_string());
        let client = LnbitsClient::new(config).unwrap();
        assert!(client.payouts_configured());
    }
}
