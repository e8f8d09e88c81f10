//! VHX API credentials and OAuth token refresh
//!
//! Provides the credential model (static API key or OAuth bearer token),
//! expiry detection, header construction, and the refresh-token grant
//! against the VHX token endpoint. The crate knows nothing about request
//! pipelines; `vhx-client` decides when to refresh.
//!
//! Credential flow:
//! 1. Client builds a `Credential` from configuration (`StaticKey` wins)
//! 2. Each request asks the credential for its `authorization_header()`
//! 3. An expired or rejected `OAuthToken` is passed to `TokenRefresher::refresh()`
//! 4. The returned token (`refreshed = true`) replaces the old one wholesale

pub mod constants;
pub mod credential;
pub mod error;
pub mod token;

pub use constants::*;
pub use credential::{Credential, OAuthToken, StaticKey, now_secs};
pub use error::{Error, Result};
pub use token::{TokenRefresher, TokenResponse};
