//! Database schema and migrations.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded. The `schema_version` table tracks which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Accounts
    r#"
-- Registered accounts. The email is the mailbox owner key.
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    email       TEXT NOT NULL UNIQUE,
    password    TEXT NOT NULL            -- Argon2 hash
);
"#,
    // v2: Inbound mail, one row per (delivery, recipient)
    r#"
-- No foreign key to users: sender/recipient are free-form addresses.
CREATE TABLE IF NOT EXISTS inbox (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    sender        TEXT NOT NULL,
    recipient     TEXT NOT NULL,
    subject       TEXT NOT NULL DEFAULT '',
    body          TEXT NOT NULL DEFAULT '',
    is_important  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_inbox_recipient ON inbox(recipient);
"#,
    // v3: Outbound copies
    r#"
CREATE TABLE IF NOT EXISTS sent (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    sender    TEXT NOT NULL,
    receiver  TEXT NOT NULL,
    subject   TEXT NOT NULL DEFAULT '',
    body      TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_sent_sender ON sent(sender);
"#,
];
