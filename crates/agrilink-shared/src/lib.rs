//! # agrilink-shared
//!
//! Domain types shared by every AgriLink crate: identifiers and
//! coordinates, backend document models, the farmer profile model, the
//! proximity/affinity rankers and the common error type.

pub mod constants;
pub mod error;
pub mod models;
pub mod profile;
pub mod ranking;
pub mod types;

pub use error::{AgrilinkError, CoordinateError};
pub use profile::{FarmerProfile, MissingField, ProfileDraft, ProfileUpdate};
pub use ranking::{Candidate, MatchOptions, RankedResult};
pub use types::{GeoPoint, Reachability, UserId};
