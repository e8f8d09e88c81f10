//! OAuth refresh-token grant
//!
//! POSTs `grant_type=refresh_token` to the token endpoint and turns the
//! response into a new `OAuthToken`. The request goes over the bare
//! transport: it never carries the Authorization header of the token being
//! replaced. Failures are returned as-is; retry policy belongs to the caller.

use std::sync::Arc;

use common::Secret;
use serde::Deserialize;
use tracing::{debug, info, warn};
use transport::{ApiRequest, HeaderValue, Transport, header};

use crate::constants::{DEFAULT_TOKEN_TYPE, REFRESH_GRANT_TYPE, TOKEN_PATH};
use crate::credential::{OAuthToken, now_secs};
use crate::error::{Error, Result};

/// Response body from the token endpoint.
///
/// Expiry arrives either as `expires_in` (seconds from now) or `expires_at`
/// (absolute unix seconds); `expires_at` wins when both are present.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub expires_at: Option<u64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Build the replacement token.
    ///
    /// A response without a refresh token keeps `previous_refresh`, so a
    /// server that does not rotate refresh tokens still allows the next
    /// refresh.
    pub fn into_token(self, previous_refresh: &str, now: u64) -> OAuthToken {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now.saturating_add(secs)));
        let refresh_token = match self.refresh_token {
            Some(rt) if !rt.is_empty() => rt,
            _ => previous_refresh.to_string(),
        };
        OAuthToken {
            access_token: self.access_token,
            refresh_token,
            token_type: self
                .token_type
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            expires_at,
            scope: self.scope,
            refreshed: true,
        }
    }
}

/// Executes the refresh-token grant for one OAuth client.
pub struct TokenRefresher {
    transport: Arc<dyn Transport>,
    token_path: String,
    client_id: Option<String>,
    client_secret: Option<Secret<String>>,
}

impl TokenRefresher {
    /// `transport` must be the bare transport, outside any request
    /// decorators that attach credentials.
    pub fn new(
        transport: Arc<dyn Transport>,
        client_id: Option<String>,
        client_secret: Option<Secret<String>>,
    ) -> Self {
        Self {
            transport,
            token_path: TOKEN_PATH.to_string(),
            client_id,
            client_secret,
        }
    }

    /// Override the token endpoint (path or absolute URL).
    pub fn with_token_path(mut self, token_path: impl Into<String>) -> Self {
        self.token_path = token_path.into();
        self
    }

    /// Exchange `current.refresh_token` for a new token.
    ///
    /// Errors:
    /// - `Configuration` if the token has no refresh token or the client
    ///   id/secret are missing (no request is sent)
    /// - `RefreshRejected` for any non-2xx response
    /// - `Transport` if the exchange could not complete (including timeouts)
    /// - `InvalidResponse` if a 2xx body is not a usable token
    pub async fn refresh(&self, current: &OAuthToken) -> Result<OAuthToken> {
        if !current.has_refresh_token() {
            return Err(Error::Configuration(
                "no refresh token available to renew the access token".into(),
            ));
        }
        let client_id = self.client_id.as_deref().ok_or_else(|| {
            Error::Configuration("client_id is required to refresh the access token".into())
        })?;
        let client_secret = self.client_secret.as_ref().ok_or_else(|| {
            Error::Configuration("client_secret is required to refresh the access token".into())
        })?;

        debug!(token_path = %self.token_path, "requesting token refresh");

        let request = ApiRequest::post(self.token_path.as_str())
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .form([
                ("grant_type", REFRESH_GRANT_TYPE),
                ("refresh_token", current.refresh_token.as_str()),
                ("client_id", client_id),
                ("client_secret", client_secret.expose().as_str()),
            ]);

        let response = self.transport.send(request).await?;

        if !response.is_success() {
            warn!(status = response.status, "token endpoint rejected refresh");
            return Err(Error::RefreshRejected {
                status: response.status,
                body: response.body,
            });
        }

        let parsed: TokenResponse = response
            .json()
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        if parsed.access_token.is_empty() {
            return Err(Error::InvalidResponse(
                "token response has an empty access_token".into(),
            ));
        }

        let token = parsed.into_token(&current.refresh_token, now_secs());
        info!(expires_at = ?token.expires_at, "access token refreshed");
        Ok(token)
    }
}
