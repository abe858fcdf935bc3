use serde::Serialize;
use tokio::sync::broadcast;

use agrilink_shared::types::UserId;

const EVENT_CAPACITY: usize = 64;

pub const MSG_OFFLINE: &str = "You are offline. Changes will be saved locally.";
pub const MSG_BACK_ONLINE: &str = "Back online. Your profile will be synced.";
pub const MSG_SYNC_RETRY: &str =
    "Failed to sync some profiles. Will retry when connection improves.";

/// Notifications surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    ProfileSaved {
        user_id: UserId,
    },
    ProfileQueued {
        user_id: UserId,
        reason: String,
    },
    SyncCompleted {
        succeeded: usize,
        failed: usize,
    },
    ConnectivityChanged {
        online: bool,
    },
    AuthChanged {
        user_id: Option<UserId>,
    },
}

impl ClientEvent {
    /// The snackbar text shown for this event, if any.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::ConnectivityChanged { online: false } => Some(MSG_OFFLINE.into()),
            Self::ConnectivityChanged { online: true } => Some(MSG_BACK_ONLINE.into()),
            Self::ProfileSaved { .. } => Some("Profile saved".into()),
            Self::ProfileQueued { .. } => {
                Some("Profile saved offline. Will sync when online.".into())
            }
            Self::SyncCompleted { succeeded, failed: 0 } if *succeeded > 0 => {
                Some("All pending profiles synced successfully".into())
            }
            Self::SyncCompleted { succeeded, failed } if *failed > 0 && *succeeded > 0 => {
                Some(format!("{succeeded} profiles synced, {failed} failed"))
            }
            Self::SyncCompleted { failed, .. } if *failed > 0 => Some(MSG_SYNC_RETRY.into()),
            _ => None,
        }
    }
}

/// Fan-out channel for [`ClientEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        tracing::debug!(?event, "Emitting client event");
        if self.tx.send(event).is_err() {
            tracing::trace!("No event listeners");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(ClientEvent::ConnectivityChanged { online: false });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.message().as_deref(), Some(MSG_OFFLINE));
    }

    #[test]
    fn test_emit_without_listeners_is_harmless() {
        EventBus::new().emit(ClientEvent::SyncCompleted {
            succeeded: 1,
            failed: 0,
        });
    }

    #[test]
    fn test_sync_messages() {
        let partial = ClientEvent::SyncCompleted {
            succeeded: 2,
            failed: 1,
        };
        assert_eq!(partial.message().unwrap(), "2 profiles synced, 1 failed");

        let none = ClientEvent::SyncCompleted {
            succeeded: 0,
            failed: 0,
        };
        assert!(none.message().is_none());
    }

    #[test]
    fn test_serializes_with_tag() {
        let json = serde_json::to_value(ClientEvent::ProfileSaved {
            user_id: UserId::new("u1"),
        })
        .unwrap();
        assert_eq!(json["type"], "profile-saved");
        assert_eq!(json["user_id"], "u1");
    }
}
