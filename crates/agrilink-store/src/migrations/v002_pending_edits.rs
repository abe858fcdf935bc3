use rusqlite::Connection;

// One row per user: a second edit for the same user replaces the payload
// in place, so rowid order is first-queued order.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS pending_profile_edits (
    user_id   TEXT PRIMARY KEY NOT NULL,    -- backend auth uid
    payload   TEXT NOT NULL,                -- JSON ProfileUpdate
    revision  INTEGER NOT NULL DEFAULT 1,   -- bumped on every replace
    queued_at TEXT NOT NULL                 -- ISO-8601, last replace
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
