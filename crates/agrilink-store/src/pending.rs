//! Pending profile edit queue.
//!
//! The queue is a table keyed by user id, so it can never hold two edits
//! for the same user. Enqueuing for a user that already has an entry
//! replaces the payload in place (keeping its position) and bumps the
//! revision. Settling a replay deletes an entry only when its revision is
//! the one that was replayed, so an edit queued while a replay was in
//! flight is kept.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use agrilink_shared::profile::ProfileUpdate;
use agrilink_shared::types::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::PendingProfileEdit;

impl Database {
    // ------------------------------------------------------------------
    // Enqueue
    // ------------------------------------------------------------------

    /// Queue `update` for `user_id`, replacing any earlier pending edit.
    pub fn enqueue_edit(&self, user_id: &UserId, update: &ProfileUpdate) -> Result<PendingProfileEdit> {
        let payload = serde_json::to_string(update)?;
        let now = Utc::now();

        let revision: i64 = self.conn().query_row(
            "INSERT INTO pending_profile_edits (user_id, payload, revision, queued_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 payload   = excluded.payload,
                 revision  = pending_profile_edits.revision + 1,
                 queued_at = excluded.queued_at
             RETURNING revision",
            params![user_id.as_str(), payload, now.to_rfc3339()],
            |row| row.get(0),
        )?;

        tracing::debug!(user = %user_id, revision, "queued profile edit");

        Ok(PendingProfileEdit {
            user_id: user_id.clone(),
            update: update.clone(),
            revision,
            queued_at: now,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// All pending edits in first-queued order.
    pub fn pending_edits(&self) -> Result<Vec<PendingProfileEdit>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, payload, revision, queued_at
             FROM pending_profile_edits
             ORDER BY rowid ASC",
        )?;

        let rows = stmt.query_map([], row_to_raw)?;

        let mut edits = Vec::new();
        for row in rows {
            edits.push(raw_to_edit(row?)?);
        }
        Ok(edits)
    }

    pub fn pending_edit(&self, user_id: &UserId) -> Result<Option<PendingProfileEdit>> {
        let raw = self
            .conn()
            .query_row(
                "SELECT user_id, payload, revision, queued_at
                 FROM pending_profile_edits
                 WHERE user_id = ?1",
                params![user_id.as_str()],
                row_to_raw,
            )
            .optional()?;
        raw.map(raw_to_edit).transpose()
    }

    pub fn pending_count(&self) -> Result<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM pending_profile_edits", [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Drop the pending edit for `user_id`.  Returns `true` if one existed.
    pub fn remove_edit(&self, user_id: &UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM pending_profile_edits WHERE user_id = ?1",
            params![user_id.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Remove every replayed edit that succeeded, in one transaction.
    ///
    /// Each key is `(user, revision replayed)`; rows whose revision moved on
    /// since the replay started are left alone.  Returns the number of rows
    /// removed.
    pub fn settle_replay(&mut self, succeeded: &[(UserId, i64)]) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare(
                "DELETE FROM pending_profile_edits WHERE user_id = ?1 AND revision = ?2",
            )?;
            for (user_id, revision) in succeeded {
                removed += stmt.execute(params![user_id.as_str(), revision])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type RawEdit = (String, String, i64, String);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEdit> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn raw_to_edit((user_id, payload, revision, queued_str): RawEdit) -> Result<PendingProfileEdit> {
    let update: ProfileUpdate = serde_json::from_str(&payload).map_err(StoreError::from)?;
    let queued_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&queued_str)?.with_timezone(&Utc);

    Ok(PendingProfileEdit {
        user_id: UserId(user_id),
        update,
        revision,
        queued_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bio(text: &str) -> ProfileUpdate {
        ProfileUpdate {
            bio: Some(text.into()),
            ..ProfileUpdate::default()
        }
    }

    #[test]
    fn one_entry_per_user() {
        let db = Database::open_in_memory().unwrap();
        let u = UserId::new("u1");

        let first = db.enqueue_edit(&u, &bio("first")).unwrap();
        assert_eq!(first.revision, 1);
        assert_eq!(db.pending_count().unwrap(), 1);

        let second = db.enqueue_edit(&u, &bio("second")).unwrap();
        assert_eq!(second.revision, 2);
        assert_eq!(db.pending_count().unwrap(), 1);

        let stored = db.pending_edit(&u).unwrap().unwrap();
        assert_eq!(stored.update, bio("second"));
        assert_eq!(stored.revision, 2);
    }

    #[test]
    fn replace_keeps_queue_position() {
        let db = Database::open_in_memory().unwrap();
        for id in ["u1", "u2", "u3"] {
            db.enqueue_edit(&UserId::new(id), &bio(id)).unwrap();
        }
        db.enqueue_edit(&UserId::new("u1"), &bio("newer")).unwrap();

        let order: Vec<_> = db
            .pending_edits()
            .unwrap()
            .into_iter()
            .map(|e| e.user_id.0)
            .collect();
        assert_eq!(order, vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn settle_skips_entries_replaced_since_replay() {
        let mut db = Database::open_in_memory().unwrap();
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        let e1 = db.enqueue_edit(&u1, &bio("a")).unwrap();
        let e2 = db.enqueue_edit(&u2, &bio("b")).unwrap();

        // u1 edited again while the replay was in flight
        db.enqueue_edit(&u1, &bio("a2")).unwrap();

        let removed = db.settle_replay(&[e1.replay_key(), e2.replay_key()]).unwrap();
        assert_eq!(removed, 1);

        let left = db.pending_edits().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].user_id, u1);
        assert_eq!(left[0].update, bio("a2"));
    }

    #[test]
    fn remove_edit_reports_presence() {
        let db = Database::open_in_memory().unwrap();
        let u = UserId::new("u1");
        assert!(!db.remove_edit(&u).unwrap());
        db.enqueue_edit(&u, &bio("x")).unwrap();
        assert!(db.remove_edit(&u).unwrap());
        assert!(db.pending_edits().unwrap().is_empty());
    }

    #[test]
    fn queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.enqueue_edit(&UserId::new("u1"), &bio("offline")).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        let edits = db.pending_edits().unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].update, bio("offline"));
    }
}
