//! Attempt and score state machine.
//!
//! `start_attempt` debits the wallet, claims an attempt slot through the
//! guarded counter, and mints a single-use handle. The guarded increment
//! is authoritative: when it reports the cap despite the precheck (two
//! racing starts), the debit is compensated with a refund. `submit_score`
//! consumes the handle, runs the anti-cheat gate, and records the score
//! against the claimed attempt column.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use arena_cache::records::ActiveAttempt;
use arena_cache::{keys, Cache};
use arena_common::{attempt_id, entity_id, submission_correlator, unix_now};
use arena_db::{
    Database, DbError, Entry, EntryQueries, GameSession, TournamentQueries, TxKind, WalletQueries,
};
use arena_lightning::{sats_to_usd, usd_to_sats, PriceSource};

use crate::anticheat::{self, AntiCheatConfig, Submission};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::tournament::TournamentService;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScoreRequest {
    #[serde(default)]
    pub attempt_id: Option<String>,
    pub score: i64,
    pub level: i64,
    pub duration_ms: i64,
    #[serde(default)]
    pub frame_count: Option<i64>,
    #[serde(default)]
    pub input_log: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptCost {
    pub cost_sats: i64,
    pub cost_usd: f64,
    pub btc_usd_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptsView {
    pub attempts_used: i64,
    pub max_attempts: i64,
    pub attempts_remaining: i64,
    pub best_score: i64,
    pub scores: [Option<i64>; 3],
    pub cost: AttemptCost,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptView {
    pub attempt_id: String,
    pub attempt_number: i64,
    pub attempts_remaining: i64,
    pub cost_sats: i64,
    pub cost_usd: f64,
    pub new_balance_sats: i64,
    pub current_jackpot_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScoreView {
    pub best_score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_number: Option<i64>,
    pub is_new_best: bool,
    pub scores: [Option<i64>; 3],
}

pub struct AttemptService {
    db: Database,
    cache: Arc<dyn Cache>,
    price: Arc<dyn PriceSource>,
    tournaments: Arc<TournamentService>,
    config: EngineConfig,
    anticheat: AntiCheatConfig,
}

impl AttemptService {
    pub fn new(
        db: Database,
        cache: Arc<dyn Cache>,
        price: Arc<dyn PriceSource>,
        tournaments: Arc<TournamentService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            cache,
            price,
            tournaments,
            config,
            anticheat: AntiCheatConfig::default(),
        }
    }

    async fn quote_cost(&self) -> Result<AttemptCost> {
        let quote = self.price.btc_usd().await?;
        let cost_sats = usd_to_sats(self.config.attempt_cost_usd, quote.usd_per_btc).max(1);
        Ok(AttemptCost {
            cost_sats,
            cost_usd: self.config.attempt_cost_usd,
            btc_usd_rate: quote.usd_per_btc,
        })
    }

    /// Snapshot for the attempts endpoint.
    pub async fn attempts(&self, user_id: &str, at: DateTime<Utc>) -> Result<AttemptsView> {
        let cost = self.quote_cost().await?;
        let tournament = self.tournaments.current_open(at)?;
        let entry = match &tournament {
            Some(t) => self.db.with_conn(|conn| conn.get_entry(&t.id, user_id))?,
            None => None,
        };

        Ok(match entry {
            Some(entry) => AttemptsView {
                attempts_used: entry.attempts_used,
                max_attempts: entry.max_attempts,
                attempts_remaining: entry.attempts_remaining(),
                best_score: entry.best_score,
                scores: [
                    entry.attempt1_score,
                    entry.attempt2_score,
                    entry.attempt3_score,
                ],
                cost,
            },
            None => AttemptsView {
                attempts_used: 0,
                max_attempts: self.config.max_attempts,
                attempts_remaining: self.config.max_attempts,
                best_score: 0,
                scores: [None, None, None],
                cost,
            },
        })
    }

    /// Debit, claim an attempt slot, mint the handle.
    pub async fn start_attempt(&self, user_id: &str, at: DateTime<Utc>) -> Result<StartAttemptView> {
        let tournament = self
            .tournaments
            .current_open(at)?
            .ok_or(EngineError::NoTournament)?;

        let entry = self.db.with_conn(|conn| {
            conn.get_or_create_entry(
                &entity_id(),
                &tournament.id,
                user_id,
                self.config.max_attempts,
                unix_now(),
            )
        })?;

        if entry.attempts_used >= entry.max_attempts {
            return Err(EngineError::MaxAttempts);
        }

        let cost = self.quote_cost().await?;
        let description = format!("Game attempt {}", entry.attempts_used + 1);

        let wallet = self
            .db
            .transaction(|conn| {
                conn.debit_wallet(
                    user_id,
                    cost.cost_sats,
                    TxKind::BuyIn,
                    &description,
                    None,
                    unix_now(),
                )
            })
            .map_err(|e| match e {
                DbError::InsufficientFunds => {
                    let balance = self
                        .db
                        .with_conn(|conn| conn.get_wallet(user_id))
                        .ok()
                        .flatten()
                        .map(|w| w.balance_sats)
                        .unwrap_or(0);
                    EngineError::InsufficientBalance {
                        balance_sats: balance,
                        required_sats: cost.cost_sats,
                    }
                }
                other => other.into(),
            })?;

        // The guarded increment is the real gate; the precheck above
        // only avoids pointless debits. Losing the race here means the
        // debit must be compensated.
        let Some(entry) = self.db.with_conn(|conn| conn.increment_attempt(&entry.id))? else {
            self.db.transaction(|conn| {
                conn.credit_wallet(
                    user_id,
                    cost.cost_sats,
                    TxKind::Refund,
                    "Refund: attempt cap reached",
                    None,
                    unix_now(),
                )
            })?;
            return Err(EngineError::MaxAttempts);
        };

        self.db
            .with_conn(|conn| conn.update_prize_pool(&tournament.id, cost.cost_sats))?;

        let handle = attempt_id();
        let record = ActiveAttempt {
            user_id: user_id.to_string(),
            entry_id: entry.id.clone(),
            attempt_number: entry.attempts_used as u8,
            started_at: unix_now(),
        };
        self.cache.set(
            &keys::attempt(&handle),
            &arena_cache::encode(&record)?,
            keys::ttl::ACTIVE_ATTEMPT,
        )?;

        let jackpot_sats = tournament.prize_pool_sats + cost.cost_sats;
        Ok(StartAttemptView {
            attempt_id: handle,
            attempt_number: entry.attempts_used,
            attempts_remaining: entry.attempts_remaining(),
            cost_sats: cost.cost_sats,
            cost_usd: cost.cost_usd,
            new_balance_sats: wallet.balance_sats,
            current_jackpot_usd: sats_to_usd(jackpot_sats, cost.btc_usd_rate),
        })
    }

    /// Validate, consume the attempt handle, gate, and record.
    pub async fn submit_score(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        request: &SubmitScoreRequest,
    ) -> Result<SubmitScoreView> {
        validate_submission(request)?;

        let tournament = self
            .tournaments
            .current_open(at)?
            .ok_or(EngineError::NoTournament)?;
        let entry = self
            .db
            .with_conn(|conn| conn.get_entry(&tournament.id, user_id))?
            .ok_or(EngineError::NoEntry)?;

        let attempt_number = match &request.attempt_id {
            Some(handle) => Some(self.consume_attempt_handle(handle, user_id, &entry)?),
            None if self.config.require_attempt_handle => {
                return Err(EngineError::InvalidAttempt);
            }
            None => None,
        };

        let verdict = anticheat::evaluate(
            &self.anticheat,
            &Submission {
                score: request.score,
                level: request.level,
                duration_ms: request.duration_ms,
                frame_count: request.frame_count,
                input_log: request.input_log.as_deref(),
            },
        );
        if !verdict.valid {
            // Redacted diagnostics: opaque correlator, never the user id.
            tracing::warn!(
                correlator = %submission_correlator(user_id, unix_now()),
                errors = ?verdict.errors,
                warnings = ?verdict.warnings,
                confidence = verdict.confidence,
                "Score rejected"
            );
            return Err(EngineError::ScoreRejected {
                reasons: verdict.errors,
            });
        }

        let input_hash = request.input_log.as_ref().map(|log| hash_input_log(log));

        let previous_best = entry.best_score;
        let updated = self.db.transaction(|conn| {
            conn.insert_game_session(&GameSession {
                id: entity_id(),
                entry_id: entry.id.clone(),
                score: request.score,
                level: request.level,
                duration_ms: request.duration_ms,
                input_hash: input_hash.clone(),
                verified: true,
                created_at: unix_now(),
            })?;
            match attempt_number {
                Some(k) => conn.record_attempt_score(&entry.id, k, request.score),
                None => conn.record_best_score(&entry.id, request.score),
            }
        })?;

        Ok(SubmitScoreView {
            best_score: updated.best_score,
            attempt_number: attempt_number.map(|k| k as i64),
            is_new_best: updated.best_score > previous_best,
            scores: [
                updated.attempt1_score,
                updated.attempt2_score,
                updated.attempt3_score,
            ],
        })
    }

    /// Load, authorize and delete the single-use handle.
    fn consume_attempt_handle(&self, handle: &str, user_id: &str, entry: &Entry) -> Result<u8> {
        let key = keys::attempt(handle);
        let attempt: ActiveAttempt = arena_cache::decode(self.cache.get(&key)?)?
            .ok_or(EngineError::InvalidAttempt)?;

        if attempt.user_id != user_id || attempt.entry_id != entry.id {
            return Err(EngineError::InvalidAttempt);
        }
        // Delete-as-claim: a concurrent submit with the same handle
        // loses here.
        if !self.cache.del(&key)? {
            return Err(EngineError::InvalidAttempt);
        }
        Ok(attempt.attempt_number)
    }
}

fn validate_submission(request: &SubmitScoreRequest) -> Result<()> {
    if !(0..=10_000_000).contains(&request.score) {
        return Err(EngineError::Validation("Score out of range".into()));
    }
    if !(1..=10_000).contains(&request.level) {
        return Err(EngineError::Validation("Level out of range".into()));
    }
    if !(5_000..=86_400_000).contains(&request.duration_ms) {
        return Err(EngineError::Validation("Duration out of range".into()));
    }
    if let Some(frame_count) = request.frame_count {
        if frame_count < 0 {
            return Err(EngineError::Validation("Frame count out of range".into()));
        }
    }
    if let Some(input_log) = &request.input_log {
        if input_log.len() > 50_000 {
            return Err(EngineError::Validation("Input log too large".into()));
        }
    }
    Ok(())
}

/// SHA-256 over the canonical (JSON array) form of the input log.
fn hash_input_log(log: &[i64]) -> String {
    let canonical = serde_json::to_vec(log).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    hex::encode(digest)
}
