//! Buy-in invoices and the payment/webhook pipeline.
//!
//! Two producers of "payment observed" events — the client status poll
//! and the backend webhook — converge on one settle action per payment
//! hash. Buy-ins serialize through a store transaction whose entry-exists
//! check makes the second settler a no-op; deposits serialize through the
//! cache-delete claim in the wallet service. Webhook deliveries are
//! deduplicated with a set-if-absent marker, with a probe that lets a
//! crashed handler's retry through.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use arena_cache::records::{IntentKind, InvoiceIntent};
use arena_cache::{keys, Cache};
use arena_common::{entity_id, normalize_payment_hash, unix_now};
use arena_db::{Database, EntryQueries, Tournament, TournamentQueries};
use arena_lightning::{webhook, LightningBackend};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::wallet::{InvoiceView, WalletService};

/// Inbound webhook body. Extra fields are ignored.
#[derive(Debug, Deserialize)]
struct WebhookBody {
    payment_hash: String,
    #[serde(default)]
    paid: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyInStatusView {
    pub paid: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_processed: bool,
}

pub struct PaymentService {
    db: Database,
    cache: Arc<dyn Cache>,
    lightning: Arc<dyn LightningBackend>,
    wallet: Arc<WalletService>,
    config: EngineConfig,
}

impl PaymentService {
    pub fn new(
        db: Database,
        cache: Arc<dyn Cache>,
        lightning: Arc<dyn LightningBackend>,
        wallet: Arc<WalletService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            cache,
            lightning,
            wallet,
            config,
        }
    }

    /// Create (or reuse) a buy-in invoice for the current tournament.
    pub async fn create_buy_in(&self, user_id: &str, tournament: &Tournament) -> Result<InvoiceView> {
        if self
            .db
            .with_conn(|conn| conn.get_entry(&tournament.id, user_id))?
            .is_some()
        {
            return Err(EngineError::DuplicateEntry);
        }

        let index_key = keys::buy_in_index(user_id, &tournament.id);
        if let Some(existing_hash) = self.cache.get(&index_key)? {
            let hash = String::from_utf8_lossy(&existing_hash).to_string();
            let intent_key = keys::buy_in_intent(&hash);
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

        let memo = format!("Daily Tournament {} buy-in", tournament.date);
        let invoice = self
            .lightning
            .create_invoice(tournament.buy_in_sats, &memo)
            .await?;

        let intent = InvoiceIntent {
            kind: IntentKind::BuyIn,
            user_id: user_id.to_string(),
            tournament_id: Some(tournament.id.clone()),
            amount_sats: tournament.buy_in_sats,
            payment_request: invoice.payment_request.clone(),
            payment_hash: invoice.payment_hash.clone(),
            created_at: unix_now(),
        };
        self.cache.set(
            &keys::buy_in_intent(&invoice.payment_hash),
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
            amount_sats: tournament.buy_in_sats,
        })
    }

    /// Poll a buy-in payment; settles it on confirmation.
    pub async fn buy_in_status(&self, user_id: &str, raw_hash: &str) -> Result<BuyInStatusView> {
        let hash = normalize_payment_hash(raw_hash)
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let intent_key = keys::buy_in_intent(&hash);
        let Some(intent) = arena_cache::decode::<InvoiceIntent>(self.cache.get(&intent_key)?)?
        else {
            // Settled intents leave a marker behind; anything else is an
            // expired invoice.
            let settled = self.cache.get(&keys::webhook_marker(&hash))?.is_some();
            return Ok(BuyInStatusView {
                paid: settled,
                expired: !settled,
                already_processed: settled,
            });
        };

        if intent.user_id != user_id {
            return Err(EngineError::Forbidden);
        }

        let status = self.lightning.payment_status(&hash).await?;
        if !status.paid {
            return Ok(BuyInStatusView {
                paid: false,
                expired: false,
                already_processed: false,
            });
        }

        // Mark the payment observed so later polls (after the intent is
        // gone) still report success.
        let _ = self.cache.set_if_not_exists(
            &keys::webhook_marker(&hash),
            b"1",
            keys::ttl::WEBHOOK_MARKER,
        )?;

        let created = self.settle_buy_in(&intent)?;
        Ok(BuyInStatusView {
            paid: true,
            expired: false,
            already_processed: !created,
        })
    }

    /// Create the entry and credit the prize pool, exactly once per
    /// payment hash. Returns false when the entry already existed.
    fn settle_buy_in(&self, intent: &InvoiceIntent) -> Result<bool> {
        let tournament_id = intent
            .tournament_id
            .as_deref()
            .ok_or_else(|| EngineError::Internal("buy-in intent without tournament".into()))?;

        let created = self.db.transaction(|conn| {
            if conn.get_entry(tournament_id, &intent.user_id)?.is_some() {
                return Ok(false);
            }
            conn.get_or_create_entry(
                &entity_id(),
                tournament_id,
                &intent.user_id,
                self.config.max_attempts,
                unix_now(),
            )?;
            conn.update_prize_pool(tournament_id, intent.amount_sats)?;
            Ok(true)
        })?;

        // Only after commit; a failed transaction keeps the intent so a
        // retry can settle it.
        let _ = self.cache.del(&keys::buy_in_intent(&intent.payment_hash))?;
        let _ = self
            .cache
            .del(&keys::buy_in_index(&intent.user_id, tournament_id))?;

        if created {
            tracing::info!(
                tournament = %tournament_id,
                amount_sats = intent.amount_sats,
                payment_hash = %&intent.payment_hash[..12],
                "Buy-in settled"
            );
        }
        Ok(created)
    }

    /// Handle a webhook delivery: verify the HMAC over the raw body,
    /// deduplicate, and settle whichever intent the hash belongs to.
    pub fn process_webhook(
        &self,
        secret: Option<&str>,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck> {
        // No secret, no webhook. Production startup refuses to run
        // without one; this guards dev setups.
        let secret = secret.ok_or(EngineError::InvalidSignature)?;
        let signature = signature.ok_or(EngineError::InvalidSignature)?;
        if !webhook::verify_signature(secret, raw_body, signature) {
            return Err(EngineError::InvalidSignature);
        }

        let body: WebhookBody = serde_json::from_slice(raw_body)
            .map_err(|_| EngineError::Validation("Malformed webhook body".into()))?;
        if !body.paid {
            return Ok(WebhookAck {
                received: true,
                duplicate: false,
            });
        }

        let hash = normalize_payment_hash(&body.payment_hash)
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let first_delivery = self.cache.set_if_not_exists(
            &keys::webhook_marker(&hash),
            b"1",
            keys::ttl::WEBHOOK_MARKER,
        )?;
        let buy_in_key = keys::buy_in_intent(&hash);
        let deposit_key = keys::deposit_intent(&hash);
        if !first_delivery {
            let intent_alive = self.cache.get(&buy_in_key)?.is_some()
                || self.cache.get(&deposit_key)?.is_some();
            if !intent_alive {
                // The previous handler finished; nothing left to do.
                return Ok(WebhookAck {
                    received: true,
                    duplicate: true,
                });
            }
            // A prior handler crashed mid-processing; let this retry run.
            tracing::warn!(payment_hash = %&hash[..12], "Webhook retry with live intent");
        }

        if let Some(intent) = arena_cache::decode::<InvoiceIntent>(self.cache.get(&buy_in_key)?)? {
            self.settle_buy_in(&intent)?;
            return Ok(WebhookAck {
                received: true,
                duplicate: false,
            });
        }
        if let Some(intent) = arena_cache::decode::<InvoiceIntent>(self.cache.get(&deposit_key)?)? {
            self.wallet.claim_and_credit(&intent)?;
            return Ok(WebhookAck {
                received: true,
                duplicate: false,
            });
        }

        // Paid invoice we have no intent for (expired or foreign).
        tracing::warn!(payment_hash = %&hash[..12], "Webhook for unknown payment");
        Ok(WebhookAck {
            received: true,
            duplicate: false,
        })
    }
}
