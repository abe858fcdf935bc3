//! # agrilink-store
//!
//! Durable local storage for the AgriLink client, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides a string key/value area (cached
//! profile, form draft, signed-in user) plus the pending profile edit
//! queue used by the offline sync protocol.

pub mod database;
pub mod kv;
pub mod migrations;
pub mod models;
pub mod pending;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
