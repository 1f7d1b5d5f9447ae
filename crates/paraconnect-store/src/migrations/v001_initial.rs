//! v001 -- Initial schema creation.
//!
//! Creates the `pending_attachments` table: the per-case staging queue for
//! files attached to a message that has not been sent yet.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Pending attachments
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS pending_attachments (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    case_id       TEXT NOT NULL,
    file_name     TEXT NOT NULL,
    file_size     INTEGER NOT NULL,
    last_modified TEXT,                        -- RFC-3339, nullable
    mime_type     TEXT,
    data          BLOB NOT NULL,               -- file contents
    status        TEXT NOT NULL DEFAULT 'pending',
    error         TEXT,
    created_at    TEXT NOT NULL                -- RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_pending_attachments_case
    ON pending_attachments(case_id, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
