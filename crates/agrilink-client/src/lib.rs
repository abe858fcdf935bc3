pub mod commands;
pub mod config;
pub mod device;
pub mod events;
pub mod state;
pub mod sync;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use device::{FixedLocation, LocationProvider};
pub use events::{ClientEvent, EventBus};
pub use state::{AppContext, Backends};
pub use sync::{ProfileSync, SaveOutcome, SyncReport, SyncState};

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("agrilink_client=debug,agrilink_net=debug,agrilink_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
