//! SQL schema for the mailtrack SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per logical send. Never deleted.
CREATE TABLE IF NOT EXISTS send_logs (
    record_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_key   TEXT NOT NULL UNIQUE,   -- sha256 hex of the normalised identity tuple
    sender         TEXT NOT NULL,
    receiver       TEXT NOT NULL,
    campaign_type  TEXT NOT NULL,          -- 'outreach' | 'follow_up' | 'reminder'
    sent_at        TEXT NOT NULL,          -- 'YYYY-MM-DD HH:MM:SS', naive
    first_name     TEXT,
    company        TEXT,
    status         TEXT,
    status_message TEXT,
    response       TEXT,
    subject        TEXT,
    body           TEXT,
    response_kind  TEXT NOT NULL DEFAULT 'no_response',
    created_at     TEXT NOT NULL,          -- RFC 3339 UTC
    updated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscription_preferences (
    sender        TEXT NOT NULL,
    receiver      TEXT NOT NULL,
    is_subscribed INTEGER NOT NULL,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (sender, receiver)
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS open_events (
    event_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    sender     TEXT NOT NULL,
    receiver   TEXT NOT NULL,
    send_key   TEXT NOT NULL,
    sent_epoch INTEGER NOT NULL,
    opened_at  TEXT NOT NULL,
    client_ip  TEXT,
    user_agent TEXT
);

CREATE INDEX IF NOT EXISTS send_logs_pair_idx    ON send_logs(sender, receiver);
CREATE INDEX IF NOT EXISTS send_logs_sent_at_idx ON send_logs(sent_at);
CREATE INDEX IF NOT EXISTS send_logs_kind_idx    ON send_logs(response_kind);
CREATE INDEX IF NOT EXISTS open_events_pair_idx  ON open_events(sender, receiver);
CREATE INDEX IF NOT EXISTS open_events_key_idx   ON open_events(send_key);

PRAGMA user_version = 1;
";
