//! Payout delivery.
//!
//! Each payout is pushed over LNURL-pay to the winner's Lightning
//! address. Delivery failures are classified and non-fatal: the row
//! stays pending and the retry tick re-attempts it. A payout that keeps
//! failing past the alert threshold emits a PAYOUT-ALERT record for the
//! operator.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use arena_db::{Database, EntryQueries, Payout, PayoutQueries, PayoutStatus};
use arena_lightning::{LightningBackend, LightningError};

use crate::config::EngineConfig;
use crate::error::Result;

pub struct PayoutDriver {
    db: Database,
    lightning: Arc<dyn LightningBackend>,
    config: EngineConfig,
}

impl PayoutDriver {
    pub fn new(db: Database, lightning: Arc<dyn LightningBackend>, config: EngineConfig) -> Self {
        Self {
            db,
            lightning,
            config,
        }
    }

    /// Attempt delivery of one payout. Ok means the row is now paid.
    pub async fn process_payout(&self, payout: &Payout, at: DateTime<Utc>) -> Result<()> {
        if payout.status == PayoutStatus::Paid {
            return Ok(());
        }

        let best_score = self
            .db
            .with_conn(|conn| conn.get_entry(&payout.tournament_id, &payout.user_id))?
            .map(|entry| entry.best_score)
            .unwrap_or(0);

        tracing::info!(
            payout = %payout.id,
            user = %user_prefix(&payout.user_id),
            place = payout.place,
            amount_sats = payout.amount_sats,
            destination = %payout.destination,
            score = best_score,
            "Processing payout"
        );

        let now = at.timestamp().max(0) as u64;
        let attempts = self
            .db
            .with_conn(|conn| conn.record_payout_attempt(&payout.id, now))?;

        let outcome = if payout.destination.is_empty() {
            Err(LightningError::InvalidAddress(
                "winner has no lightning address".into(),
            ))
        } else {
            let memo = format!("Daily Tournament Place {} Prize", payout.place);
            self.lightning
                .pay_to_address(&payout.destination, payout.amount_sats, &memo)
                .await
        };

        match outcome {
            Ok(receipt) => {
                self.db.with_conn(|conn| {
                    conn.mark_payout_paid(&payout.id, &receipt.payment_hash, now)
                })?;
                tracing::info!(
                    payout = %payout.id,
                    payment_hash = %&receipt.payment_hash[..12.min(receipt.payment_hash.len())],
                    "Payout SUCCESS"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    payout = %payout.id,
                    code = e.code(),
                    error = %e,
                    attempts,
                    "Payout FAILED"
                );
                if attempts >= self.config.payout_alert_threshold {
                    tracing::error!(
                        payout = %payout.id,
                        attempts,
                        amount_sats = payout.amount_sats,
                        "PAYOUT-ALERT: repeated delivery failures"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Re-attempt every pending payout older than the retry window.
    /// Returns how many were paid this pass.
    pub async fn retry_pending(&self, at: DateTime<Utc>) -> Result<usize> {
        let cutoff = (at.timestamp().max(0) as u64)
            .saturating_sub(self.config.payout_retry_after.as_secs());
        let pending = self
            .db
            .with_conn(|conn| conn.pending_payouts_older_than(cutoff))?;
        if pending.is_empty() {
            return Ok(0);
        }

        tracing::info!(count = pending.len(), "Retrying pending payouts");
        let mut paid = 0;
        for payout in &pending {
            match self.process_payout(payout, at).await {
                Ok(()) => paid += 1,
                Err(_) => {
                    // Already logged; keep going with the rest.
                }
            }
        }
        Ok(paid)
    }
}

fn user_prefix(user_id: &str) -> &str {
    &user_id[..user_id.len().min(6)]
}
