//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `users` (accounts, roles, moderation flags)
//! and `messages` (append-only chat log).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    username     TEXT UNIQUE NOT NULL,
    password     TEXT NOT NULL,               -- salt$digest, opaque to SQL
    display_name TEXT,
    role         INTEGER NOT NULL DEFAULT 0,  -- 0 = member, 1 = admin
    is_banned    INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    is_muted     INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    created_at   TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

-- ----------------------------------------------------------------
-- Messages (append-only audit log)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    sender    TEXT NOT NULL,
    receiver  TEXT,                           -- NULL for global messages
    content   TEXT NOT NULL,
    kind      TEXT NOT NULL,                  -- "global" | "private"
    timestamp TEXT NOT NULL                   -- ISO-8601
);

CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
