//! Client configuration
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The API key and client secret never live in the TOML: they come from
//! `VHX_API_KEY` / `VHX_CLIENT_SECRET` or from the files named by
//! `api_key_file` / `client_secret_file`.
//!
//! ```toml
//! api_base_url = "https://api.vhx.tv"
//! client_id = "abc123"
//! client_secret_file = "/run/secrets/vhx_client_secret"
//! refresh_leeway_secs = 30
//!
//! [token]
//! access_token = "..."
//! refresh_token = "..."
//! expires_in = 7200
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use vhx_auth::{Credential, DEFAULT_API_BASE_URL, DEFAULT_TOKEN_TYPE, OAuthToken, StaticKey};

pub const ENV_CONFIG_PATH: &str = "VHX_CONFIG";
pub const ENV_API_KEY: &str = "VHX_API_KEY";
pub const ENV_CLIENT_SECRET: &str = "VHX_CLIENT_SECRET";
pub const ENV_ACCESS_TOKEN: &str = "VHX_ACCESS_TOKEN";
pub const ENV_REFRESH_TOKEN: &str = "VHX_REFRESH_TOKEN";

const DEFAULT_CONFIG_FILE: &str = "vhx.toml";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to VHX_CLIENT_SECRET)
    pub client_secret_file: Option<PathBuf>,
    /// Forces static-key mode when present
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,
    /// Path to a file containing the API key (alternative to VHX_API_KEY)
    pub api_key_file: Option<PathBuf>,
    pub token: Option<InitialToken>,
    /// Send the configured token as-is; no proactive refresh, no 401 retry
    pub skip_auto_refresh: bool,
    pub timeout_secs: u64,
    /// Treat tokens as expired this many seconds early
    pub refresh_leeway_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            client_id: None,
            client_secret: None,
            client_secret_file: None,
            api_key: None,
            api_key_file: None,
            token: None,
            skip_auto_refresh: false,
            timeout_secs: 60,
            refresh_leeway_secs: 0,
        }
    }
}

/// OAuth token material supplied at construction (`[token]` table).
///
/// Any field may be missing; a refresh token alone is enough to start.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct InitialToken {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Absolute expiry, unix seconds. Wins over `expires_in`.
    pub expires_at: Option<u64>,
    /// Seconds from construction
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl fmt::Debug for InitialToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("InitialToken")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order (API key and client secret alike):
    /// 1. env var (`VHX_API_KEY`, `VHX_CLIENT_SECRET`)
    /// 2. `*_file` path from config
    ///
    /// `VHX_ACCESS_TOKEN` and `VHX_REFRESH_TOKEN` override the `[token]` table.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&contents)?;
        config.validate()?;

        config.api_key =
            resolve_secret(ENV_API_KEY, config.api_key_file.as_deref(), "api_key_file")?;
        config.client_secret = resolve_secret(
            ENV_CLIENT_SECRET,
            config.client_secret_file.as_deref(),
            "client_secret_file",
        )?;

        if let Some(access) = env_value(ENV_ACCESS_TOKEN) {
            config.token.get_or_insert_with(InitialToken::default).access_token = Some(access);
        }
        if let Some(refresh) = env_value(ENV_REFRESH_TOKEN) {
            config.token.get_or_insert_with(InitialToken::default).refresh_token = Some(refresh);
        }

        Ok(config)
    }

    /// Check option values. Called by `load`; `Client::new` calls it for
    /// configs built in code.
    pub fn validate(&self) -> common::Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "api_base_url must start with http:// or https://, got: {}",
                self.api_base_url
            )));
        }

        if self.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or VHX_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Use a static API key. Blank keys are ignored.
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Secret::from_trimmed(key);
        self
    }

    pub fn with_client_credentials(mut self, client_id: impl Into<String>, secret: &str) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Secret::from_trimmed(secret);
        self
    }

    pub fn with_token(mut self, token: InitialToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Build the starting credential.
    ///
    /// An API key forces static-key mode; otherwise the `[token]` material
    /// becomes an OAuth token; with neither, there is nothing to
    /// authenticate with.
    pub fn initial_credential(&self) -> common::Result<Credential> {
        self.initial_credential_at(vhx_auth::now_secs())
    }

    pub fn initial_credential_at(&self, now: u64) -> common::Result<Credential> {
        if let Some(key) = &self.api_key {
            return Ok(Credential::StaticKey(StaticKey::new(key.clone())));
        }

        let Some(token) = &self.token else {
            return Err(common::Error::Config(format!(
                "no credentials configured: set {ENV_API_KEY} (or api_key_file) or a [token] table"
            )));
        };

        let access_token = non_blank(token.access_token.as_deref());
        let refresh_token = non_blank(token.refresh_token.as_deref());
        let expires_at = match (&access_token, &refresh_token) {
            (None, None) => {
                return Err(common::Error::Config(
                    "[token] needs an access_token or a refresh_token".into(),
                ));
            }
            // Refresh token only: expired from the start so the first
            // request obtains an access token.
            (None, Some(_)) => Some(0),
            (Some(_), _) => token
                .expires_at
                .or_else(|| token.expires_in.map(|secs| now.saturating_add(secs))),
        };

        Ok(Credential::OAuth(OAuthToken {
            access_token: access_token.unwrap_or_default(),
            refresh_token: refresh_token.unwrap_or_default(),
            token_type: token
                .token_type
                .clone()
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            expires_at,
            scope: token.scope.clone(),
            refreshed: false,
        }))
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().as_deref().and_then(|v| non_blank(Some(v)))
}

/// Env var takes precedence over the file; blank values count as absent.
fn resolve_secret(
    env_var: &str,
    file: Option<&Path>,
    field: &str,
) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var)
        && let Some(secret) = Secret::from_trimmed(&value)
    {
        return Ok(Some(secret));
    }
    let Some(file) = file else {
        return Ok(None);
    };
    let contents = std::fs::read_to_string(file).map_err(|e| {
        common::Error::Config(format!("failed to read {field} {}: {e}", file.display()))
    })?;
    Ok(Secret::from_trimmed(&contents))
}
