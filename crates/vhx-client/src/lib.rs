//! Authenticated client for the VHX API
//!
//! Owns the active credential (static API key or OAuth token) and sends every
//! request through an ordered pipeline of decorators: request logging, error
//! translation and, unless disabled, the auth middleware that attaches the
//! credential, refreshes expired tokens and retries a rejected request once.
//!
//! Request lifecycle:
//! 1. `Client` applies default headers (including the current Authorization)
//! 2. `LogRequests` opens a span with a request id
//! 3. `TranslateErrors` turns the final non-2xx response into an `Error`
//! 4. `AuthMiddleware` refreshes an expired token before sending, and on a
//!    401 refreshes once and retries once
//! 5. Refreshes are single-flight: concurrent callers share one token call

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod state;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use config::{ClientConfig, InitialToken};
pub use error::{AuthFailure, Error, Result};
pub use middleware::AuthMiddleware;
pub use pipeline::{DefaultHeaders, LogRequests, Middleware, Next, Pipeline, TranslateErrors};
pub use state::{CredentialState, Snapshot};
pub use transport::{ApiRequest, ApiResponse, Method, Transport};
pub use vhx_auth::{Credential, OAuthToken};
