//! Database schema definitions.

/// SQL to create the database schema.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking (single row)
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    version INTEGER NOT NULL
);

-- Players
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT UNIQUE,
    password_hash TEXT,
    linking_key TEXT UNIQUE,
    display_name TEXT NOT NULL,
    lightning_address TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- One wallet per user; balance may never go negative
CREATE TABLE IF NOT EXISTS wallets (
    user_id TEXT PRIMARY KEY REFERENCES users(id),
    balance_sats INTEGER NOT NULL DEFAULT 0 CHECK (balance_sats >= 0),
    updated_at INTEGER NOT NULL
);

-- Append-only transaction journal
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES users(id),
    kind TEXT NOT NULL CHECK (kind IN ('deposit', 'buy_in', 'payout', 'refund')),
    amount_sats INTEGER NOT NULL,
    description TEXT NOT NULL,
    reference TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS transactions_user ON transactions(user_id, id);
CREATE INDEX IF NOT EXISTS transactions_reference ON transactions(reference);

-- One tournament per UTC date
CREATE TABLE IF NOT EXISTS tournaments (
    id TEXT PRIMARY KEY,
    date TEXT UNIQUE NOT NULL,
    buy_in_sats INTEGER NOT NULL,
    prize_pool_sats INTEGER NOT NULL DEFAULT 0 CHECK (prize_pool_sats >= 0),
    status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'completed')),
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL
);

-- Per-(tournament, user) aggregate
CREATE TABLE IF NOT EXISTS entries (
    id TEXT PRIMARY KEY,
    tournament_id TEXT NOT NULL REFERENCES tournaments(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    attempts_used INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    attempts_scored INTEGER NOT NULL DEFAULT 0,
    attempt1_score INTEGER,
    attempt2_score INTEGER,
    attempt3_score INTEGER,
    best_score INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    UNIQUE (tournament_id, user_id)
);
CREATE INDEX IF NOT EXISTS entries_leaderboard ON entries(tournament_id, best_score DESC);

-- Immutable audit row per accepted score submission
CREATE TABLE IF NOT EXISTS game_sessions (
    id TEXT PRIMARY KEY,
    entry_id TEXT NOT NULL REFERENCES entries(id),
    score INTEGER NOT NULL,
    level INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    input_hash TEXT,
    verified INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS game_sessions_entry ON game_sessions(entry_id);

-- Prize distribution records
CREATE TABLE IF NOT EXISTS payouts (
    id TEXT PRIMARY KEY,
    tournament_id TEXT NOT NULL REFERENCES tournaments(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    place INTEGER NOT NULL CHECK (place BETWEEN 1 AND 3),
    amount_sats INTEGER NOT NULL,
    destination TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid')),
    payment_hash TEXT,
    paid_at INTEGER,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_attempt_at INTEGER,
    created_at INTEGER NOT NULL,
    UNIQUE (tournament_id, user_id)
);
CREATE INDEX IF NOT EXISTS payouts_status ON payouts(status, created_at);

-- LNURL-auth whitelist
CREATE TABLE IF NOT EXISTS whitelist (
    linking_key TEXT PRIMARY KEY,
    display_name TEXT,
    is_admin INTEGER NOT NULL DEFAULT 0,
    approved_by TEXT NOT NULL,
    approved_at INTEGER NOT NULL
);
"#;
