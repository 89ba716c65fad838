//! Payout queries.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{DbError, Result};
use crate::models::{Payout, PayoutStatus};

pub trait PayoutQueries {
    fn create_payout(
        &self,
        id: &str,
        tournament_id: &str,
        user_id: &str,
        place: i64,
        amount_sats: i64,
        destination: &str,
        now: u64,
    ) -> Result<Payout>;

    fn get_payout(&self, id: &str) -> Result<Option<Payout>>;

    fn list_payouts_for_tournament(&self, tournament_id: &str) -> Result<Vec<Payout>>;

    /// Pending payouts whose last attempt (or creation) is older than
    /// `cutoff`, oldest first. Feeds the retry tick.
    fn pending_payouts_older_than(&self, cutoff: u64) -> Result<Vec<Payout>>;

    /// Record a delivery attempt; returns the new attempt count.
    fn record_payout_attempt(&self, id: &str, now: u64) -> Result<i64>;

    /// Transition pending → paid. Returns `false` when already paid.
    fn mark_payout_paid(&self, id: &str, payment_hash: &str, now: u64) -> Result<bool>;
}

fn row_to_payout(row: &Row<'_>) -> rusqlite::Result<Payout> {
    let status_str: String = row.get(6)?;
    Ok(Payout {
        id: row.get(0)?,
        tournament_id: row.get(1)?,
        user_id: row.get(2)?,
        place: row.get(3)?,
        amount_sats: row.get(4)?,
        destination: row.get(5)?,
        status: PayoutStatus::parse(&status_str).map_err(|_| rusqlite::Error::InvalidQuery)?,
        payment_hash: row.get(7)?,
        paid_at: row.get::<_, Option<i64>>(8)?.map(|v| v as u64),
        attempt_count: row.get(9)?,
        last_attempt_at: row.get::<_, Option<i64>>(10)?.map(|v| v as u64),
        created_at: row.get::<_, i64>(11)? as u64,
    })
}

const PAYOUT_COLUMNS: &str = "id, tournament_id, user_id, place, amount_sats, destination, \
                              status, payment_hash, paid_at, attempt_count, last_attempt_at, \
                              created_at";

impl PayoutQueries for Connection {
    fn create_payout(
        &self,
        id: &str,
        tournament_id: &str,
        user_id: &str,
        place: i64,
        amount_sats: i64,
        destination: &str,
        now: u64,
    ) -> Result<Payout> {
        let inserted = self.execute(
            r#"
            INSERT OR IGNORE INTO payouts
                (id, tournament_id, user_id, place, amount_sats, destination, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)
            "#,
            params![
                id,
                tournament_id,
                user_id,
                place,
                amount_sats,
                destination,
                now as i64
            ],
        )?;
        if inserted == 0 {
            return Err(DbError::Conflict(
                "payout already exists for this tournament and user".into(),
            ));
        }
        self.get_payout(id)?.ok_or(DbError::NotFound)
    }

    fn get_payout(&self, id: &str) -> Result<Option<Payout>> {
        Ok(self
            .query_row(
                &format!("SELECT {} FROM payouts WHERE id = ?1", PAYOUT_COLUMNS),
                params![id],
                row_to_payout,
            )
            .optional()?)
    }

    fn list_payouts_for_tournament(&self, tournament_id: &str) -> Result<Vec<Payout>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {} FROM payouts WHERE tournament_id = ?1 ORDER BY place ASC",
            PAYOUT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![tournament_id], row_to_payout)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn pending_payouts_older_than(&self, cutoff: u64) -> Result<Vec<Payout>> {
        let mut stmt = self.prepare(&format!(
            r#"
            SELECT {} FROM payouts
            WHERE status = 'pending' AND COALESCE(last_attempt_at, created_at) < ?1
            ORDER BY created_at ASC
            "#,
            PAYOUT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![cutoff as i64], row_to_payout)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn record_payout_attempt(&self, id: &str, now: u64) -> Result<i64> {
        let updated = self.execute(
            "UPDATE payouts SET attempt_count = attempt_count + 1, last_attempt_at = ?2 WHERE id = ?1",
            params![id, now as i64],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(self.query_row(
            "SELECT attempt_count FROM payouts WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?)
    }

    fn mark_payout_paid(&self, id: &str, payment_hash: &str, now: u64) -> Result<bool> {
        let updated = self.execute(
            r#"
            UPDATE payouts SET status = 'paid', payment_hash = ?2, paid_at = ?3
            WHERE id = ?1 AND status = 'pending'
            "#,
            params![id, payment_hash, now as i64],
        )?;
        Ok(updated == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::tournaments::TournamentQueries;
    use crate::queries::users::{NewUser, UserQueries};
    use crate::Database;

    const NOW: u64 = 1_700_000_000;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.create_user(&NewUser {
                id: "u1".to_string(),
                username: Some("alice".to_string()),
                password_hash: Some("$2b$12$test".to_string()),
                linking_key: None,
                display_name: "alice".to_string(),
                created_at: NOW,
            })?;
            conn.create_tournament("t1", "2024-03-09", 1000, NOW, NOW + 86_399)?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn create_and_mark_paid_once() {
        let db = setup();
        db.with_conn(|conn| {
            let payout =
                conn.create_payout("p1", "t1", "u1", 1, 4900, "alice@ln.example", NOW)?;
            assert_eq!(payout.status, PayoutStatus::Pending);

            assert!(conn.mark_payout_paid("p1", &"ab".repeat(32), NOW + 10)?);
            assert!(!conn.mark_payout_paid("p1", &"cd".repeat(32), NOW + 20)?);

            let payout = conn.get_payout("p1")?.unwrap();
            assert_eq!(payout.status, PayoutStatus::Paid);
            assert_eq!(payout.payment_hash.as_deref(), Some("ab".repeat(32).as_str()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn duplicate_winner_is_conflict() {
        let db = setup();
        db.with_conn(|conn| {
            conn.create_payout("p1", "t1", "u1", 1, 4900, "alice@ln.example", NOW)?;
            let err = conn
                .create_payout("p2", "t1", "u1", 2, 2940, "alice@ln.example", NOW)
                .unwrap_err();
            assert!(matches!(err, DbError::Conflict(_)));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn retry_scan_respects_cutoff_and_attempts() {
        let db = setup();
        db.with_conn(|conn| {
            conn.create_payout("p1", "t1", "u1", 1, 4900, "alice@ln.example", NOW)?;

            // Young payout not picked up yet.
            assert!(conn.pending_payouts_older_than(NOW)?.is_empty());
            assert_eq!(conn.pending_payouts_older_than(NOW + 400)?.len(), 1);

            // A recent attempt pushes it out of the scan window again.
            let attempts = conn.record_payout_attempt("p1", NOW + 500)?;
            assert_eq!(attempts, 1);
            assert!(conn.pending_payouts_older_than(NOW + 400)?.is_empty());

            // Paid payouts never appear.
            conn.mark_payout_paid("p1", &"ab".repeat(32), NOW + 600)?;
            assert!(conn.pending_payouts_older_than(NOW + 10_000)?.is_empty());
            Ok(())
        })
        .unwrap();
    }
}
