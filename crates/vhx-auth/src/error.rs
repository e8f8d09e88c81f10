//! Error types for credential and token refresh operations

use transport::TransportError;

/// Errors from the refresh-token grant.
///
/// `Clone` so one refresh outcome can be handed to every request that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Refresh attempted without the material it needs (refresh token,
    /// client id/secret) or on a credential that cannot be refreshed.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("refresh token rejected ({status}): {body}")]
    RefreshRejected { status: u16, body: String },

    #[error("token refresh request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
