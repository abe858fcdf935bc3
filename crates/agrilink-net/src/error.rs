use thiserror::Error;

use agrilink_shared::AgrilinkError;

/// Errors produced by backend adapters and HTTP clients.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with a non-success status.
    #[error("Request failed: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("{0} is not configured")]
    NotConfigured(String),

    /// The backend cannot be reached (device offline or backend down).
    #[error("Backend unavailable")]
    Unavailable,

    /// The backend refused the operation.
    #[error("Backend rejected the write: {0}")]
    Rejected(String),

    #[error("Document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;

impl From<NetError> for AgrilinkError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Http(e) if e.is_timeout() => AgrilinkError::Timeout,
            NetError::Http(e) if e.is_connect() => AgrilinkError::NetworkUnavailable,
            NetError::Unavailable => AgrilinkError::NetworkUnavailable,
            NetError::NotConfigured(what) => AgrilinkError::NotConfigured(what),
            NetError::NotFound { .. } => AgrilinkError::NotFound,
            NetError::Serialization(e) => AgrilinkError::Serialization(e),
            other => AgrilinkError::RemoteRejected(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_onto_domain_errors() {
        assert!(matches!(
            AgrilinkError::from(NetError::Unavailable),
            AgrilinkError::NetworkUnavailable
        ));
        assert!(matches!(
            AgrilinkError::from(NetError::NotConfigured("Plant.id API key".into())),
            AgrilinkError::NotConfigured(_)
        ));
        let rejected = AgrilinkError::from(NetError::Status {
            status: 400,
            body: "bad image".into(),
        });
        assert_eq!(
            rejected.to_string(),
            "Remote rejected the request: Request failed: 400 - bad image"
        );
    }
}
