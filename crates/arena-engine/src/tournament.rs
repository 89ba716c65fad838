//! Tournament lifecycle.
//!
//! One tournament per UTC date, created lazily or by the midnight tick
//! and closed exactly once by the end-of-day tick. Closing computes the
//! distributable pool (after the house fee), writes payout rows for the
//! top three scores and drives them through the payout pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use arena_common::timeutil::{day_bounds, day_key};
use arena_common::entity_id;
use arena_db::{
    Database, Entry, EntryQueries, LeaderboardRow, Payout, PayoutQueries, Tournament,
    TournamentQueries, TournamentStatus,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::payouts::PayoutDriver;

/// Summary of a completed close.
#[derive(Debug)]
pub struct CloseSummary {
    pub tournament_id: String,
    pub prize_pool_sats: i64,
    pub distributable_sats: i64,
    pub payouts: Vec<Payout>,
}

pub struct TournamentService {
    db: Database,
    config: EngineConfig,
    /// Serializes close runs within this process.
    closing: Arc<AtomicBool>,
}

impl TournamentService {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Self {
            db,
            config,
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Idempotent daily create for the date holding `at`.
    pub fn ensure_tournament(&self, at: DateTime<Utc>) -> Result<Tournament> {
        let date = day_key(at);
        let (start, end) = day_bounds(at);
        let id = entity_id();

        let created = self.db.with_conn(|conn| {
            conn.create_tournament(&id, date.as_str(), self.config.buy_in_sats, start, end)
        })?;
        match created {
            Some(tournament) => {
                tracing::info!(date = %date, id = %tournament.id, "Created daily tournament");
                Ok(tournament)
            }
            None => self
                .db
                .with_conn(|conn| conn.get_tournament_by_date(date.as_str()))?
                .ok_or(EngineError::NoTournament),
        }
    }

    /// Today's tournament, if open.
    pub fn current_open(&self, at: DateTime<Utc>) -> Result<Option<Tournament>> {
        let date = day_key(at);
        let tournament = self
            .db
            .with_conn(|conn| conn.get_tournament_by_date(date.as_str()))?;
        Ok(tournament.filter(|t| t.status == TournamentStatus::Open))
    }

    /// Today's tournament regardless of state, creating it when absent.
    pub fn current_or_create(&self, at: DateTime<Utc>) -> Result<Tournament> {
        let date = day_key(at);
        if let Some(tournament) = self
            .db
            .with_conn(|conn| conn.get_tournament_by_date(date.as_str()))?
        {
            return Ok(tournament);
        }
        self.ensure_tournament(at)
    }

    pub fn leaderboard(&self, tournament_id: &str, limit: i64) -> Result<Vec<LeaderboardRow>> {
        Ok(self
            .db
            .with_conn(|conn| conn.leaderboard(tournament_id, limit))?)
    }

    pub fn entry_for(&self, tournament_id: &str, user_id: &str) -> Result<Option<Entry>> {
        Ok(self
            .db
            .with_conn(|conn| conn.get_entry(tournament_id, user_id))?)
    }

    /// Close the tournament for the date holding `at`.
    ///
    /// Returns `None` when there is nothing to close (no tournament,
    /// already completed, or another close is in flight in this
    /// process).
    pub async fn close_tournament(
        &self,
        at: DateTime<Utc>,
        payouts: &PayoutDriver,
    ) -> Result<Option<CloseSummary>> {
        let Some(tournament) = self.current_open(at)? else {
            return Ok(None);
        };

        if self.closing.swap(true, Ordering::SeqCst) {
            tracing::warn!(id = %tournament.id, "Close already in progress; skipping");
            return Ok(None);
        }
        let result = self.close_inner(&tournament, at, payouts).await;
        self.closing.store(false, Ordering::SeqCst);
        result
    }

    async fn close_inner(
        &self,
        tournament: &Tournament,
        at: DateTime<Utc>,
        payouts: &PayoutDriver,
    ) -> Result<Option<CloseSummary>> {
        let winners = self
            .db
            .with_conn(|conn| conn.top_winners(&tournament.id, 3))?;

        let distributable =
            ((tournament.prize_pool_sats as f64) * (1.0 - self.config.house_fee)).floor() as i64;

        tracing::info!(
            id = %tournament.id,
            date = %tournament.date,
            prize_pool = tournament.prize_pool_sats,
            distributable,
            winners = winners.len(),
            "Closing tournament"
        );

        let now = at.timestamp().max(0) as u64;
        let mut created = Vec::new();
        for (index, winner) in winners.iter().take(3).enumerate() {
            let place = (index + 1) as i64;
            let amount = ((distributable as f64) * self.config.payout_shares[index]).floor() as i64;
            if amount <= 0 {
                continue;
            }
            let destination = winner.lightning_address.clone().unwrap_or_default();
            let payout = self.db.with_conn(|conn| {
                conn.create_payout(
                    &entity_id(),
                    &tournament.id,
                    &winner.user_id,
                    place,
                    amount,
                    &destination,
                    now,
                )
            })?;
            created.push(payout);
        }

        for payout in &created {
            // Failures stay pending; the retry tick picks them up.
            if let Err(e) = payouts.process_payout(payout, at).await {
                tracing::warn!(payout = %payout.id, error = %e, "Payout deferred to retry");
            }
        }

        if !self
            .db
            .with_conn(|conn| conn.mark_tournament_completed(&tournament.id))?
        {
            return Err(EngineError::Internal(format!(
                "tournament {} was completed concurrently",
                tournament.id
            )));
        }

        // Refresh payout rows so the summary reflects paid states.
        let final_payouts = self
            .db
            .with_conn(|conn| conn.list_payouts_for_tournament(&tournament.id))?;

        // Line up tomorrow immediately; the midnight tick create is
        // idempotent against this.
        self.ensure_tournament(at + chrono::Duration::days(1))?;

        Ok(Some(CloseSummary {
            tournament_id: tournament.id.clone(),
            prize_pool_sats: tournament.prize_pool_sats,
            distributable_sats: distributable,
            payouts: final_payouts,
        }))
    }
}
