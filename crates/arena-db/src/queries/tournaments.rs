//! Tournament queries.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{DbError, Result};
use crate::models::{LeaderboardRow, Tournament, TournamentStatus, WinnerRow};

pub trait TournamentQueries {
    /// Idempotent create: returns `None` when a tournament already exists
    /// for the date.
    fn create_tournament(
        &self,
        id: &str,
        date: &str,
        buy_in_sats: i64,
        start_time: u64,
        end_time: u64,
    ) -> Result<Option<Tournament>>;

    fn get_tournament(&self, id: &str) -> Result<Option<Tournament>>;

    fn get_tournament_by_date(&self, date: &str) -> Result<Option<Tournament>>;

    /// Atomic `prize_pool_sats += delta`.
    fn update_prize_pool(&self, id: &str, delta_sats: i64) -> Result<()>;

    /// Transition open → completed. Returns `false` when the tournament
    /// was already completed (close must happen exactly once).
    fn mark_tournament_completed(&self, id: &str) -> Result<bool>;

    /// Top `limit` entries by best score with display names.
    fn leaderboard(&self, tournament_id: &str, limit: i64) -> Result<Vec<LeaderboardRow>>;

    /// Top 3 entries with payout destinations, for the close path.
    fn top_winners(&self, tournament_id: &str, limit: i64) -> Result<Vec<WinnerRow>>;

    /// Number of entries in a tournament.
    fn entry_count(&self, tournament_id: &str) -> Result<i64>;
}

fn row_to_tournament(row: &Row<'_>) -> rusqlite::Result<Tournament> {
    let status_str: String = row.get(4)?;
    Ok(Tournament {
        id: row.get(0)?,
        date: row.get(1)?,
        buy_in_sats: row.get(2)?,
        prize_pool_sats: row.get(3)?,
        status: TournamentStatus::parse(&status_str).map_err(|_| rusqlite::Error::InvalidQuery)?,
        start_time: row.get::<_, i64>(5)? as u64,
        end_time: row.get::<_, i64>(6)? as u64,
    })
}

const TOURNAMENT_COLUMNS: &str =
    "id, date, buy_in_sats, prize_pool_sats, status, start_time, end_time";

impl TournamentQueries for Connection {
    fn create_tournament(
        &self,
        id: &str,
        date: &str,
        buy_in_sats: i64,
        start_time: u64,
        end_time: u64,
    ) -> Result<Option<Tournament>> {
        let inserted = self.execute(
            r#"
            INSERT OR IGNORE INTO tournaments (id, date, buy_in_sats, status, start_time, end_time)
            VALUES (?1, ?2, ?3, 'open', ?4, ?5)
            "#,
            params![id, date, buy_in_sats, start_time as i64, end_time as i64],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(self.get_tournament(id)?)
    }

    fn get_tournament(&self, id: &str) -> Result<Option<Tournament>> {
        Ok(self
            .query_row(
                &format!("SELECT {} FROM tournaments WHERE id = ?1", TOURNAMENT_COLUMNS),
                params![id],
                row_to_tournament,
            )
            .optional()?)
    }

    fn get_tournament_by_date(&self, date: &str) -> Result<Option<Tournament>> {
        Ok(self
            .query_row(
                &format!(
                    "SELECT {} FROM tournaments WHERE date = ?1",
                    TOURNAMENT_COLUMNS
                ),
                params![date],
                row_to_tournament,
            )
            .optional()?)
    }

    fn update_prize_pool(&self, id: &str, delta_sats: i64) -> Result<()> {
        let updated = self.execute(
            "UPDATE tournaments SET prize_pool_sats = prize_pool_sats + ?2 WHERE id = ?1",
            params![id, delta_sats],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    fn mark_tournament_completed(&self, id: &str) -> Result<bool> {
        let updated = self.execute(
            "UPDATE tournaments SET status = 'completed' WHERE id = ?1 AND status = 'open'",
            params![id],
        )?;
        Ok(updated == 1)
    }

    fn leaderboard(&self, tournament_id: &str, limit: i64) -> Result<Vec<LeaderboardRow>> {
        let mut stmt = self.prepare(
            r#"
            SELECT e.user_id, u.display_name, e.best_score
            FROM entries e
            JOIN users u ON u.id = e.user_id
            WHERE e.tournament_id = ?1
            ORDER BY e.best_score DESC, e.created_at ASC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![tournament_id, limit], |row| {
            Ok(LeaderboardRow {
                user_id: row.get(0)?,
                display_name: row.get(1)?,
                best_score: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn top_winners(&self, tournament_id: &str, limit: i64) -> Result<Vec<WinnerRow>> {
        let mut stmt = self.prepare(
            r#"
            SELECT e.user_id, u.display_name, e.best_score, u.lightning_address
            FROM entries e
            JOIN users u ON u.id = e.user_id
            WHERE e.tournament_id = ?1 AND e.best_score > 0
            ORDER BY e.best_score DESC, e.created_at ASC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![tournament_id, limit], |row| {
            Ok(WinnerRow {
                user_id: row.get(0)?,
                display_name: row.get(1)?,
                best_score: row.get(2)?,
                lightning_address: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn entry_count(&self, tournament_id: &str) -> Result<i64> {
        Ok(self.query_row(
            "SELECT COUNT(*) FROM entries WHERE tournament_id = ?1",
            params![tournament_id],
            |row| row.get(0),
        )?)
    }
}
