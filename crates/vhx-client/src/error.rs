//! Error types for client operations

use transport::TransportError;

/// Errors returned to callers of the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable credential, invalid options, or refresh impossible by
    /// construction. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed: {0}")]
    Authentication(#[source] AuthFailure),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-2xx response other than an authentication rejection
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(String),

    /// Reading or parsing the config file failed
    #[error("failed to load configuration: {0}")]
    Load(common::Error),
}

impl From<common::Error> for Error {
    fn from(e: common::Error) -> Self {
        match e {
            common::Error::Config(msg) => Error::Configuration(msg),
            other => Error::Load(other),
        }
    }
}

impl Error {
    /// HTTP status the API answered with, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Authentication(AuthFailure::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Refresh preconditions that can never be met surface as `Configuration`,
/// whichever path attempted the refresh.
impl From<AuthFailure> for Error {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::Refresh(vhx_auth::Error::Configuration(msg)) => Error::Configuration(msg),
            other => Error::Authentication(other),
        }
    }
}

/// Why a request could not be authenticated.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthFailure {
    /// The refresh-token grant failed (rejected, unreachable, unusable)
    #[error("token refresh failed: {0}")]
    Refresh(#[source] vhx_auth::Error),

    /// The API answered 401 and no further refresh is attempted
    #[error("credentials rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The refresh task ended without producing an outcome (runtime shutdown)
    #[error("token refresh was aborted")]
    RefreshAborted,
}

impl AuthFailure {
    /// Status returned by the token endpoint, if it rejected the grant.
    pub fn refresh_rejection_status(&self) -> Option<u16> {
        match self {
            AuthFailure::Refresh(vhx_auth::Error::RefreshRejected { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
