//! Connectivity tracking.
//!
//! Holds the last known reachability of the network and broadcasts
//! transitions to any number of listeners over a `watch` channel.

use tokio::sync::watch;
use tracing::{debug, info};

use agrilink_shared::types::Reachability;

/// Tracks whether the device can currently reach the backend.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<Reachability>,
}

impl ConnectivityMonitor {
    /// Create a monitor with an initial reachability.
    pub fn new(initial: Reachability) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> Reachability {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Record a new platform report. Returns `true` on a transition.
    ///
    /// Repeated reports of the same state do not wake listeners.
    pub fn set_reachable(&self, reachable: bool) -> bool {
        let next = Reachability::from(reachable);
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        if changed {
            info!(state = ?next, "Connectivity changed");
        } else {
            debug!(state = ?next, "Connectivity report unchanged");
        }
        changed
    }

    /// Listen for transitions. The receiver starts with the current value
    /// marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<Reachability> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Reachability::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_reported_once() {
        let monitor = ConnectivityMonitor::new(Reachability::Online);
        assert!(monitor.is_online());

        assert!(!monitor.set_reachable(true));
        assert!(monitor.set_reachable(false));
        assert!(!monitor.set_reachable(false));
        assert_eq!(monitor.current(), Reachability::Offline);
    }

    #[tokio::test]
    async fn test_subscriber_wakes_on_change() {
        let monitor = ConnectivityMonitor::new(Reachability::Offline);
        let mut rx = monitor.subscribe();

        monitor.set_reachable(false);
        assert!(!rx.has_changed().unwrap());

        monitor.set_reachable(true);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Reachability::Online);
    }

    #[test]
    fn test_clones_share_state() {
        let monitor = ConnectivityMonitor::default();
        let other = monitor.clone();
        other.set_reachable(false);
        assert!(!monitor.is_online());
    }
}
