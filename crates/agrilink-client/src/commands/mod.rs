//! Command handlers invoked by the UI layer and the CLI.
//!
//! Each sub-module groups related commands by domain. Every command takes
//! the shared [`crate::state::AppContext`] and returns a domain `Result`.

pub mod chat;
pub mod discovery;
pub mod plants;
pub mod profile;

use tracing::debug;

use agrilink_net::Document;
use serde::de::DeserializeOwned;

/// Decode every document that matches `T`, skipping malformed ones.
pub(crate) fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(id = %doc.id, error = %e, "Skipping malformed document");
                None
            }
        })
        .collect()
}
