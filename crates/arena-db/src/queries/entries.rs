//! Entry and game-session queries.
//!
//! `increment_attempt` is the single serialization point for the attempt
//! cap: the guarded UPDATE either claims one attempt slot or reports the
//! cap atomically. Attempt score columns are selected from a fixed
//! allowlist; the attempt number is never spliced into SQL.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{DbError, Result};
use crate::models::{Entry, GameSession};

pub trait EntryQueries {
    /// Atomic upsert returning the row; safe under concurrent callers.
    fn get_or_create_entry(
        &self,
        id: &str,
        tournament_id: &str,
        user_id: &str,
        max_attempts: i64,
        now: u64,
    ) -> Result<Entry>;

    fn get_entry(&self, tournament_id: &str, user_id: &str) -> Result<Option<Entry>>;

    fn get_entry_by_id(&self, id: &str) -> Result<Option<Entry>>;

    /// Guarded `attempts_used += 1`; returns `None` when the cap is hit.
    fn increment_attempt(&self, entry_id: &str) -> Result<Option<Entry>>;

    /// Write the k-th attempt score (k in 1..=3), update `best_score`,
    /// and bump the scored-attempts counter.
    fn record_attempt_score(&self, entry_id: &str, k: u8, score: i64) -> Result<Entry>;

    /// Update `best_score` only; the legacy submission path without an
    /// attempt handle.
    fn record_best_score(&self, entry_id: &str, score: i64) -> Result<Entry>;

    fn insert_game_session(&self, session: &GameSession) -> Result<()>;
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        tournament_id: row.get(1)?,
        user_id: row.get(2)?,
        attempts_used: row.get(3)?,
        max_attempts: row.get(4)?,
        attempts_scored: row.get(5)?,
        attempt1_score: row.get(6)?,
        attempt2_score: row.get(7)?,
        attempt3_score: row.get(8)?,
        best_score: row.get(9)?,
        created_at: row.get::<_, i64>(10)? as u64,
    })
}

const ENTRY_COLUMNS: &str = "id, tournament_id, user_id, attempts_used, max_attempts, \
                             attempts_scored, attempt1_score, attempt2_score, attempt3_score, \
                             best_score, created_at";

/// Map a validated attempt number to its column name.
fn attempt_column(k: u8) -> Result<&'static str> {
    match k {
        1 => Ok("attempt1_score"),
        2 => Ok("attempt2_score"),
        3 => Ok("attempt3_score"),
        _ => Err(DbError::InvalidArgument(format!(
            "attempt number out of range: {}",
            k
        ))),
    }
}

impl EntryQueries for Connection {
    fn get_or_create_entry(
        &self,
        id: &str,
        tournament_id: &str,
        user_id: &str,
        max_attempts: i64,
        now: u64,
    ) -> Result<Entry> {
        self.execute(
            r#"
            INSERT OR IGNORE INTO entries (id, tournament_id, user_id, max_attempts, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![id, tournament_id, user_id, max_attempts, now as i64],
        )?;
        self.get_entry(tournament_id, user_id)?.ok_or(DbError::NotFound)
    }

    fn get_entry(&self, tournament_id: &str, user_id: &str) -> Result<Option<Entry>> {
        Ok(self
            .query_row(
                &format!(
                    "SELECT {} FROM entries WHERE tournament_id = ?1 AND user_id = ?2",
                    ENTRY_COLUMNS
                ),
                params![tournament_id, user_id],
                row_to_entry,
            )
            .optional()?)
    }

    fn get_entry_by_id(&self, id: &str) -> Result<Option<Entry>> {
        Ok(self
            .query_row(
                &format!("SELECT {} FROM entries WHERE id = ?1", ENTRY_COLUMNS),
                params![id],
                row_to_entry,
            )
            .optional()?)
    }

    fn increment_attempt(&self, entry_id: &str) -> Result<Option<Entry>> {
        let updated = self.execute(
            r#"
            UPDATE entries SET attempts_used = attempts_used + 1
            WHERE id = ?1 AND attempts_used < max_attempts
            "#,
            params![entry_id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        Ok(Some(
            self.get_entry_by_id(entry_id)?.ok_or(DbError::NotFound)?,
        ))
    }

    fn record_attempt_score(&self, entry_id: &str, k: u8, score: i64) -> Result<Entry> {
        let column = attempt_column(k)?;
        let sql = format!(
            r#"
            UPDATE entries
            SET {column} = ?2,
                best_score = MAX(best_score, ?2),
                attempts_scored = attempts_scored + 1
            WHERE id = ?1
            "#,
        );
        let updated = self.execute(&sql, params![entry_id, score])?;
        if updated == 0 {
            return Err(DbError::NotFound);
        }
        self.get_entry_by_id(entry_id)?.ok_or(DbError::NotFound)
    }

    fn record_best_score(&self, entry_id: &str, score: i64) -> Result<Entry> {
        let updated = self.execute(
            "UPDATE entries SET best_score = MAX(best_score, ?2) WHERE id = ?1",
            params![entry_id, score],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound);
        }
        self.get_entry_by_id(entry_id)?.ok_or(DbError::NotFound)
    }

    fn insert_game_session(&self, session: &GameSession) -> Result<()> {
        self.execute(
            r#"
            INSERT INTO game_sessions
                (id, entry_id, score, level, duration_ms, input_hash, verified, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                session.id,
                session.entry_id,
                session.score,
                session.level,
                session.duration_ms,
                session.input_hash,
                session.verified as i64,
                session.created_at as i64,
            ],
        )?;
        Ok(())
    }
}
