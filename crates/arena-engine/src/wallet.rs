//! Wallet ledger operations.
//!
//! Deposits flow through Lightning invoices tracked as cache intents;
//! whichever observer (status poll or webhook) wins the cache-delete
//! claim credits the wallet, so a payment hash credits at most once no
//! matter how many observers fire.

use std::sync::Arc;

use serde::Serialize;

use arena_cache::records::{IntentKind, InvoiceIntent};
use arena_cache::{keys, Cache};
use arena_common::{normalize_payment_hash, unix_now};
use arena_db::{Database, LedgerTransaction, TxKind, WalletQueries};
use arena_lightning::{sats_to_usd, LightningBackend, PriceSource};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub balance_sats: i64,
    pub balance_usd: f64,
    pub btc_usd_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    pub payment_request: String,
    pub payment_hash: String,
    /// Seconds until the invoice expires.
    pub expires_in: u64,
    pub amount_sats: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositStatusView {
    pub paid: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_sats: Option<i64>,
}

pub struct WalletService {
    db: Database,
    cache: Arc<dyn Cache>,
    lightning: Arc<dyn LightningBackend>,
    price: Arc<dyn PriceSource>,
    config: EngineConfig,
}

impl WalletService {
    pub fn new(
        db: Database,
        cache: Arc<dyn Cache>,
        lightning: Arc<dyn LightningBackend>,
        price: Arc<dyn PriceSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            cache,
            lightning,
            price,
            config,
        }
    }

    /// Current BTC/USD quote (for callers that need pricing without a
    /// wallet read).
    pub async fn quote(&self) -> Result<arena_lightning::PriceQuote> {
        Ok(self.price.btc_usd().await?)
    }

    pub async fn balance(&self, user_id: &str) -> Result<BalanceView> {
        let wallet = self
            .db
            .with_conn(|conn| conn.get_wallet(user_id))?
            .ok_or(EngineError::NotFound)?;
        let quote = self.price.btc_usd().await?;
        Ok(BalanceView {
            balance_sats: wallet.balance_sats,
            balance_usd: sats_to_usd(wallet.balance_sats, quote.usd_per_btc),
            btc_usd_rate: quote.usd_per_btc,
        })
    }

    /// Create (or reuse) a deposit invoice for the caller.
    pub async fn deposit(&self, user_id: &str, amount_sats: i64) -> Result<InvoiceView> {
        if amount_sats < self.config.deposit_min_sats || amount_sats > self.config.deposit_max_sats
        {
            return Err(EngineError::Validation(format!(
                "Deposit must be between {} and {} sats",
                self.config.deposit_min_sats, self.config.deposit_max_sats
            )));
        }

        // Reuse an unexpired in-flight deposit rather than minting a new
        // invoice for an impatient client.
        let index_key = keys::deposit_index(user_id);
        if let Some(existing_hash) = self.cache.get(&index_key)? {
            let hash = String::from_utf8_lossy(&existing_hash).to_string();
            let intent_key = keys::deposit_intent(&hash);
            if let Some(intent) =
                arena_cache::decode::<InvoiceIntent>(self.cache.get(&intent_key)?)?
            {
                let remaining = self
                    .cache
                    .ttl_remaining(&intent_key)?
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                if remaining > 0 {
                    return Ok(InvoiceView {
                        payment_request: intent.payment_request,
                        payment_hash: intent.payment_hash,
                        expires_in: remaining,
                        amount_sats: intent.amount_sats,
                    });
                }
            }
        }

        let invoice = self
            .lightning
            .create_invoice(amount_sats, "Wallet deposit")
            .await?;

        let intent = InvoiceIntent {
            kind: IntentKind::Deposit,
            user_id: user_id.to_string(),
            tournament_id: None,
            amount_sats,
            payment_request: invoice.payment_request.clone(),
            payment_hash: invoice.payment_hash.clone(),
            created_at: unix_now(),
        };
        self.cache.set(
            &keys::deposit_intent(&invoice.payment_hash),
            &arena_cache::encode(&intent)?,
            keys::ttl::INVOICE_INTENT,
        )?;
        self.cache.set(
            &index_key,
            invoice.payment_hash.as_bytes(),
            keys::ttl::INVOICE_INTENT,
        )?;

        Ok(InvoiceView {
            payment_request: invoice.payment_request,
            payment_hash: invoice.payment_hash,
            expires_in: keys::ttl::INVOICE_INTENT.as_secs(),
            amount_sats,
        })
    }

    /// Poll a deposit. When the backend reports it paid, claim the
    /// intent and credit the wallet (unless the webhook got there
    /// first).
    pub async fn deposit_status(&self, user_id: &str, raw_hash: &str) -> Result<DepositStatusView> {
        let hash = normalize_payment_hash(raw_hash)
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let intent_key = keys::deposit_intent(&hash);
        let Some(intent) = arena_cache::decode::<InvoiceIntent>(self.cache.get(&intent_key)?)?
        else {
            // No live intent: either it was settled, or it expired.
            let settled = self
                .db
                .with_conn(|conn| conn.find_transaction_by_reference(user_id, &hash))?;
            return Ok(match settled {
                Some(tx) => DepositStatusView {
                    paid: true,
                    expired: false,
                    already_processed: true,
                    amount_sats: Some(tx.amount_sats),
                },
                None => DepositStatusView {
                    paid: false,
                    expired: true,
                    already_processed: false,
                    amount_sats: None,
                },
            });
        };

        if intent.user_id != user_id {
            return Err(EngineError::Forbidden);
        }

        let status = self.lightning.payment_status(&hash).await?;
        if !status.paid {
            return Ok(DepositStatusView {
                paid: false,
                expired: false,
                already_processed: false,
                amount_sats: Some(intent.amount_sats),
            });
        }

        let credited = self.claim_and_credit(&intent)?;
        Ok(DepositStatusView {
            paid: true,
            expired: false,
            already_processed: !credited,
            amount_sats: Some(intent.amount_sats),
        })
    }

    /// Claim the deposit intent and credit the wallet. Returns false
    /// when another observer already claimed it.
    pub fn claim_and_credit(&self, intent: &InvoiceIntent) -> Result<bool> {
        if intent.kind != IntentKind::Deposit {
            return Err(EngineError::Internal(
                "claim_and_credit called with a non-deposit intent".into(),
            ));
        }

        // The delete is the race-winner primitive between webhook and
        // poll: exactly one caller sees `true`.
        if !self.cache.del(&keys::deposit_intent(&intent.payment_hash))? {
            return Ok(false);
        }

        let credited = self.db.transaction(|conn| {
            conn.credit_wallet(
                &intent.user_id,
                intent.amount_sats,
                TxKind::Deposit,
                "Lightning deposit",
                Some(&intent.payment_hash),
                unix_now(),
            )
        });
        if let Err(e) = credited {
            // Put the intent back so a retry can settle it.
            self.cache.set(
                &keys::deposit_intent(&intent.payment_hash),
                &arena_cache::encode(intent)?,
                keys::ttl::INVOICE_INTENT,
            )?;
            return Err(e.into());
        }
        let _ = self.cache.del(&keys::deposit_index(&intent.user_id));

        tracing::info!(
            amount_sats = intent.amount_sats,
            payment_hash = %&intent.payment_hash[..12],
            "Deposit credited"
        );
        Ok(true)
    }

    pub fn transactions(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);
        Ok(self
            .db
            .with_conn(|conn| conn.list_transactions(user_id, limit, offset))?)
    }
}
