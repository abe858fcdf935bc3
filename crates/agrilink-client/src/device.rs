//! Device capabilities the client depends on.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use agrilink_shared::error::{AgrilinkError, Result};
use agrilink_shared::types::GeoPoint;

/// Platform location service.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Ask for foreground location access. Returns whether it was granted.
    async fn request_permission(&self) -> bool;

    /// Current position; `PermissionDenied` when access was refused.
    async fn current_position(&self) -> Result<GeoPoint>;

    /// Position updates for the map view.
    fn watch_position(&self) -> watch::Receiver<GeoPoint>;
}

/// A location source pinned to a configured point.
///
/// Used by the CLI (position given on the command line) and by tests.
#[derive(Debug)]
pub struct FixedLocation {
    granted: AtomicBool,
    position: watch::Sender<GeoPoint>,
}

impl FixedLocation {
    pub fn new(position: GeoPoint) -> Self {
        let (position, _rx) = watch::channel(position);
        Self {
            granted: AtomicBool::new(true),
            position,
        }
    }

    /// A provider whose permission prompt is always refused.
    pub fn denied(position: GeoPoint) -> Self {
        let provider = Self::new(position);
        provider.granted.store(false, Ordering::SeqCst);
        provider
    }

    pub fn move_to(&self, position: GeoPoint) {
        self.position.send_replace(position);
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn request_permission(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    async fn current_position(&self) -> Result<GeoPoint> {
        if !self.granted.load(Ordering::SeqCst) {
            return Err(AgrilinkError::PermissionDenied(
                "Location permission denied".into(),
            ));
        }
        Ok(*self.position.borrow())
    }

    fn watch_position(&self) -> watch::Receiver<GeoPoint> {
        self.position.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_location_follows_moves() {
        let start = GeoPoint::new(5.6, -0.19).unwrap();
        let provider = FixedLocation::new(start);
        let mut rx = provider.watch_position();

        assert!(provider.request_permission().await);
        assert_eq!(provider.current_position().await.unwrap(), start);

        let next = GeoPoint::new(5.7, -0.2).unwrap();
        provider.move_to(next);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), next);
    }

    #[tokio::test]
    async fn test_denied_provider() {
        let provider = FixedLocation::denied(GeoPoint::new(0.0, 0.0).unwrap());
        assert!(!provider.request_permission().await);
        assert!(matches!(
            provider.current_position().await,
            Err(AgrilinkError::PermissionDenied(_))
        ));
    }
}
