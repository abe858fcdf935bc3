use thiserror::Error;

use crate::profile::MissingField;

#[derive(Error, Debug)]
pub enum AgrilinkError {
    /// Location or camera access refused by the user.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Network unavailable")]
    NetworkUnavailable,

    /// The backend refused the write (validation or transport failure).
    #[error("Remote rejected the request: {0}")]
    RemoteRejected(String),

    /// A required external API key or endpoint is missing.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Remote operation timed out")]
    Timeout,

    #[error("Coordinate error: {0}")]
    InvalidCoordinate(#[from] CoordinateError),

    #[error("Profile is incomplete: missing {}", format_missing(.0))]
    Validation(Vec<MissingField>),

    #[error("Record not found")]
    NotFound,

    #[error("No signed-in user")]
    NotSignedIn,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The on-device store failed.
    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("latitude {0} outside -90..=90")]
    Latitude(f64),

    #[error("longitude {0} outside -180..=180")]
    Longitude(f64),
}

fn format_missing(fields: &[MissingField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias for fallible domain operations.
pub type Result<T> = std::result::Result<T, AgrilinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_fields() {
        let err = AgrilinkError::Validation(vec![MissingField::FarmName, MissingField::Location]);
        assert_eq!(
            err.to_string(),
            "Profile is incomplete: missing farmName, location"
        );
    }
}
