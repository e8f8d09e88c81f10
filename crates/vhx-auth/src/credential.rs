//! Credential model
//!
//! A client authenticates with exactly one of two credentials: a static API
//! key (sent as HTTP Basic with the key as username and an empty password)
//! or an OAuth bearer token that may expire. Credentials are immutable; a
//! refresh produces a new `OAuthToken` that replaces the old one.
//!
//! `expires_at` is a unix timestamp in seconds (absolute, not a delta).
//! A token without `expires_at` never expires locally; server-side
//! revocation only shows up as a 401.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use std::fmt;

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The active credential of a client.
#[derive(Debug, Clone)]
pub enum Credential {
    StaticKey(StaticKey),
    OAuth(OAuthToken),
}

impl Credential {
    /// Static keys never expire.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        match self {
            Credential::StaticKey(_) => false,
            Credential::OAuth(token) => token.is_expired_at(now),
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        match self {
            Credential::StaticKey(key) => key.authorization_header(),
            Credential::OAuth(token) => token.authorization_header(),
        }
    }

    /// Token fields for introspection; `None` for a static key.
    pub fn to_map(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.as_oauth().map(OAuthToken::to_map)
    }

    pub fn as_oauth(&self) -> Option<&OAuthToken> {
        match self {
            Credential::OAuth(token) => Some(token),
            Credential::StaticKey(_) => None,
        }
    }

    /// Mode label for logging.
    pub fn mode(&self) -> &'static str {
        match self {
            Credential::StaticKey(_) => "static_key",
            Credential::OAuth(_) => "oauth",
        }
    }
}

/// A long-lived API key.
#[derive(Debug, Clone)]
pub struct StaticKey {
    key: Secret<String>,
}

impl StaticKey {
    pub fn new(key: Secret<String>) -> Self {
        Self { key }
    }

    /// `Basic base64(<key>:)`
    pub fn authorization_header(&self) -> String {
        let userpass = format!("{}:", self.key.expose());
        format!("Basic {}", STANDARD.encode(userpass))
    }
}

/// An OAuth access token plus the refresh token used to renew it.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    /// Empty when the initial material carried none; refresh is then impossible
    pub refresh_token: String,
    pub token_type: String,
    /// Expiration as unix timestamp in seconds
    pub expires_at: Option<u64>,
    pub scope: Option<String>,
    /// Obtained through the refresh grant rather than supplied at construction
    pub refreshed: bool,
}

impl OAuthToken {
    pub fn has_expiry(&self) -> bool {
        self.expires_at.is_some()
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }

    /// `expires_at < now`; never true without an expiry.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_within(0, now)
    }

    /// Whether the token expires before `now + leeway` seconds.
    ///
    /// The client refreshes this early so a token does not lapse while a
    /// request is in flight.
    pub fn expires_within(&self, leeway: u64, now: u64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < now.saturating_add(leeway),
            None => false,
        }
    }

    /// `Bearer <access_token>`
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("access_token".into(), self.access_token.clone().into());
        map.insert("refresh_token".into(), self.refresh_token.clone().into());
        map.insert("token_type".into(), self.token_type.clone().into());
        map.insert("expires".into(), self.has_expiry().into());
        map.insert("expires_at".into(), self.expires_at.into());
        map.insert("scope".into(), self.scope.clone().into());
        map.insert("refreshed".into(), self.refreshed.into());
        map
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("refreshed", &self.refreshed)
            .finish()
    }
}
