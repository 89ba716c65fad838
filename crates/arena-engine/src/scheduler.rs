//! Tournament lifecycle scheduler.
//!
//! One tick loop drives the three recurring jobs (all UTC): the daily
//! create at midnight, the close at 23:59, and the payout retry sweep
//! every 30 minutes. The loop re-derives everything from wall-clock time
//! on each tick, so a restarted process catches up on the next tick
//! (including closing yesterday's tournament if the process slept
//! through 23:59). The task stops on the shutdown channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::payouts::PayoutDriver;
use crate::tournament::TournamentService;

/// How often the loop wakes to check the clock.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Payout retry cadence.
const RETRY_INTERVAL: Duration = Duration::from_secs(30 * 60);

pub fn spawn_scheduler(
    tournaments: Arc<TournamentService>,
    payouts: Arc<PayoutDriver>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_retry = tokio::time::Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_tick(&tournaments, &payouts, &mut last_retry).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Scheduler stopping");
                    break;
                }
            }
        }
    })
}

async fn run_tick(
    tournaments: &TournamentService,
    payouts: &PayoutDriver,
    last_retry: &mut tokio::time::Instant,
) {
    let now = Utc::now();

    // Daily create; idempotent, so running it every tick is fine.
    if let Err(e) = tournaments.ensure_tournament(now) {
        tracing::error!(error = %e, "Daily tournament create failed");
    }

    // Close yesterday's tournament if the process slept through 23:59.
    let yesterday = now - ChronoDuration::days(1);
    match tournaments.close_tournament(yesterday, payouts).await {
        Ok(Some(summary)) => {
            tracing::warn!(
                tournament = %summary.tournament_id,
                "Closed overdue tournament from previous day"
            );
        }
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "Overdue tournament close failed"),
    }

    // Close today's tournament from 23:59.
    if now.hour() == 23 && now.minute() >= 59 {
        match tournaments.close_tournament(now, payouts).await {
            Ok(Some(summary)) => {
                tracing::info!(
                    tournament = %summary.tournament_id,
                    distributable_sats = summary.distributable_sats,
                    payouts = summary.payouts.len(),
                    "Tournament closed"
                );
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Tournament close failed"),
        }
    }

    // Payout retry sweep.
    if last_retry.elapsed() >= RETRY_INTERVAL {
        *last_retry = tokio::time::Instant::now();
        match payouts.retry_pending(now).await {
            Ok(0) => {}
            Ok(paid) => tracing::info!(paid, "Payout retry sweep completed"),
            Err(e) => tracing::error!(error = %e, "Payout retry sweep failed"),
        }
    }
}
