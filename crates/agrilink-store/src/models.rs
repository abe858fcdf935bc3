//! Domain model structs persisted in the local SQLite database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agrilink_shared::profile::ProfileUpdate;
use agrilink_shared::types::UserId;

// ---------------------------------------------------------------------------
// Pending profile edit
// ---------------------------------------------------------------------------

/// A profile update that has not been confirmed by the remote store yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingProfileEdit {
    /// Owner of the profile; at most one pending edit per user.
    pub user_id: UserId,
    /// The partial profile payload to replay.
    pub update: ProfileUpdate,
    /// Bumped each time a newer edit replaces this one.
    pub revision: i64,
    /// When the current payload was queued.
    pub queued_at: DateTime<Utc>,
}

impl PendingProfileEdit {
    /// Key used to settle a replay: the entry is removed only if it still
    /// carries this revision.
    pub fn replay_key(&self) -> (UserId, i64) {
        (self.user_id.clone(), self.revision)
    }
}
