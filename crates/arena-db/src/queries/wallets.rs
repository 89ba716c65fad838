//! Wallet and transaction-journal queries.
//!
//! Every balance change appends exactly one journal row whose signed
//! amount equals the balance delta, in the same transaction. The debit
//! guard (`balance_sats >= amount`) is the serialization point that makes
//! wallet underflow impossible regardless of handler interleaving.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{DbError, Result};
use crate::models::{LedgerTransaction, TxKind, Wallet};

pub trait WalletQueries {
    fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>>;

    /// Append a journal row and add `amount_sats` to the balance.
    /// `amount_sats` must be positive.
    fn credit_wallet(
        &self,
        user_id: &str,
        amount_sats: i64,
        kind: TxKind,
        description: &str,
        reference: Option<&str>,
        now: u64,
    ) -> Result<Wallet>;

    /// Append a journal row and subtract `amount_sats` from the balance,
    /// guarded by `balance_sats >= amount_sats`.
    fn debit_wallet(
        &self,
        user_id: &str,
        amount_sats: i64,
        kind: TxKind,
        description: &str,
        reference: Option<&str>,
        now: u64,
    ) -> Result<Wallet>;

    /// User-scoped journal page, newest first.
    fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>>;

    /// Journal row carrying the given reference (payment hash), if any.
    fn find_transaction_by_reference(
        &self,
        user_id: &str,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>>;

    /// Sum of all journal amounts for a user. Must equal the wallet
    /// balance at all times; exposed for invariant checks.
    fn journal_sum(&self, user_id: &str) -> Result<i64>;
}

fn row_to_tx(row: &Row<'_>) -> rusqlite::Result<LedgerTransaction> {
    let kind_str: String = row.get(2)?;
    Ok(LedgerTransaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: TxKind::parse(&kind_str).map_err(|_| rusqlite::Error::InvalidQuery)?,
        amount_sats: row.get(3)?,
        description: row.get(4)?,
        reference: row.get(5)?,
        created_at: row.get::<_, i64>(6)? as u64,
    })
}

fn append_journal(
    conn: &Connection,
    user_id: &str,
    kind: TxKind,
    amount_sats: i64,
    description: &str,
    reference: Option<&str>,
    now: u64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO transactions (user_id, kind, amount_sats, description, reference, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            user_id,
            kind.as_str(),
            amount_sats,
            description,
            reference,
            now as i64
        ],
    )?;
    Ok(())
}

impl WalletQueries for Connection {
    fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>> {
        Ok(self
            .query_row(
                "SELECT user_id, balance_sats, updated_at FROM wallets WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Wallet {
                        user_id: row.get(0)?,
                        balance_sats: row.get(1)?,
                        updated_at: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .optional()?)
    }

    fn credit_wallet(
        &self,
        user_id: &str,
        amount_sats: i64,
        kind: TxKind,
        description: &str,
        reference: Option<&str>,
        now: u64,
    ) -> Result<Wallet> {
        if amount_sats <= 0 {
            return Err(DbError::InvalidArgument("credit amount must be positive".into()));
        }

        let updated = self.execute(
            "UPDATE wallets SET balance_sats = balance_sats + ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, amount_sats, now as i64],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound);
        }

        append_journal(self, user_id, kind, amount_sats, description, reference, now)?;
        self.get_wallet(user_id)?.ok_or(DbError::NotFound)
    }

    fn debit_wallet(
        &self,
        user_id: &str,
        amount_sats: i64,
        kind: TxKind,
        description: &str,
        reference: Option<&str>,
        now: u64,
    ) -> Result<Wallet> {
        if amount_sats <= 0 {
            return Err(DbError::InvalidArgument("debit amount must be positive".into()));
        }

        let updated = self.execute(
            r#"
            UPDATE wallets SET balance_sats = balance_sats - ?2, updated_at = ?3
            WHERE user_id = ?1 AND balance_sats >= ?2
            "#,
            params![user_id, amount_sats, now as i64],
        )?;
        if updated == 0 {
            return match self.get_wallet(user_id)? {
                Some(_) => Err(DbError::InsufficientFunds),
                None => Err(DbError::NotFound),
            };
        }

        append_journal(self, user_id, kind, -amount_sats, description, reference, now)?;
        self.get_wallet(user_id)?.ok_or(DbError::NotFound)
    }

    fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>> {
        let mut stmt = self.prepare(
            r#"
            SELECT id, user_id, kind, amount_sats, description, reference, created_at
            FROM transactions
            WHERE user_id = ?1
            ORDER BY id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let rows = stmt.query_map(params![user_id, limit, offset], row_to_tx)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn find_transaction_by_reference(
        &self,
        user_id: &str,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>> {
        Ok(self
            .query_row(
                r#"
                SELECT id, user_id, kind, amount_sats, description, reference, created_at
                FROM transactions
                WHERE user_id = ?1 AND reference = ?2
                ORDER BY id ASC
                LIMIT 1
                "#,
                params![user_id, reference],
                row_to_tx,
            )
            .optional()?)
    }

    fn journal_sum(&self, user_id: &str) -> Result<i64> {
        Ok(self.query_row(
            "SELECT COALESCE(SUM(amount_sats), 0) FROM transactions WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
            })
        })
        .unwrap();
        db
    }

    #[test]
    fn credit_then_debit_keeps_journal_consistent() {
        let db = setup();
        db.with_conn(|conn| {
            let wallet = conn.credit_wallet("u1", 1000, TxKind::Deposit, "Deposit", Some("h1"), NOW)?;
            assert_eq!(wallet.balance_sats, 1000);

            let wallet = conn.debit_wallet("u1", 400, TxKind::BuyIn, "Game attempt 1", None, NOW)?;
            assert_eq!(wallet.balance_sats, 600);

            assert_eq!(conn.journal_sum("u1")?, 600);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn debit_underflow_is_rejected_without_journal_row() {
        let db = setup();
        db.with_conn(|conn| {
            conn.credit_wallet("u1", 100, TxKind::Deposit, "Deposit", None, NOW)?;
            let err = conn
                .debit_wallet("u1", 101, TxKind::BuyIn, "Game attempt 1", None, NOW)
                .unwrap_err();
            assert!(matches!(err, DbError::InsufficientFunds));

            assert_eq!(conn.journal_sum("u1")?, 100);
            assert_eq!(conn.get_wallet("u1")?.unwrap().balance_sats, 100);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn zero_and_negative_amounts_are_invalid() {
        let db = setup();
        db.with_conn(|conn| {
            assert!(matches!(
                conn.credit_wallet("u1", 0, TxKind::Deposit, "x", None, NOW),
                Err(DbError::InvalidArgument(_))
            ));
            assert!(matches!(
                conn.debit_wallet("u1", -5, TxKind::BuyIn, "x", None, NOW),
                Err(DbError::InvalidArgument(_))
            ));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn transactions_page_newest_first() {
        let db = setup();
        db.with_conn(|conn| {
            for i in 1..=5 {
                conn.credit_wallet("u1", i * 10, TxKind::Deposit, "Deposit", None, NOW + i as u64)?;
            }
            let page = conn.list_transactions("u1", 2, 0)?;
            assert_eq!(page.len(), 2);
            assert_eq!(page[0].amount_sats, 50);
            assert_eq!(page[1].amount_sats, 40);

            let page = conn.list_transactions("u1", 2, 4)?;
            assert_eq!(page.len(), 1);
            assert_eq!(page[0].amount_sats, 10);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn missing_wallet_is_not_found() {
        let db = setup();
        db.with_conn(|conn| {
            assert!(matches!(
                conn.credit_wallet("ghost", 10, TxKind::Deposit, "x", None, NOW),
                Err(DbError::NotFound)
            ));
            Ok(())
        })
        .unwrap();
    }
}
