//! VHX API and OAuth endpoint constants

/// Default API base URL. The token endpoint lives on the same host.
pub const DEFAULT_API_BASE_URL: &str = "https://api.vhx.tv";

/// Token endpoint path for the refresh-token grant
pub const TOKEN_PATH: &str = "/oauth/token";

/// `grant_type` value for token renewal
pub const REFRESH_GRANT_TYPE: &str = "refresh_token";

/// Token type assumed when the server omits `token_type`
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";
