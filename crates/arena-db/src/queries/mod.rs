//! Per-entity query traits implemented on [`rusqlite::Connection`].

pub mod entries;
pub mod payouts;
pub mod tournaments;
pub mod users;
pub mod wallets;
pub mod whitelist;
