//! Error types for task store and task service operations.

use thiserror::Error;

/// Errors surfaced by the repositories and the remote gateway.
///
/// None of these are fatal: local state is left as it was before the failing call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A client-side precondition failed; nothing was sent to the service.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The service rejected the credential (or there is none).
    #[error("not authenticated: {0}")]
    Auth(String),

    /// The service answered 404, or the id is unknown locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success status, or a body that could not be decoded.
    #[error("service error ({status}): {message}")]
    Remote {
        /// HTTP status code, `0` when the failure was in decoding a success response.
        status: u16,
        message: String,
    },

    /// Transport failure or timeout.
    #[error("network error: {0}")]
    Network(String),
}

impl StoreError {
    pub fn is_auth(&self) -> bool {
        matches!(self, StoreError::Auth(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            StoreError::Remote {
                status: error.status().map_or(0, |s| s.as_u16()),
                message: format!("malformed response: {error}"),
            }
        } else {
            StoreError::Network(error.to_string())
        }
    }
}

/// Errors persisting or removing the stored credential.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("credential store error: {0}")]
    Store(String),

    #[error("credential file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
