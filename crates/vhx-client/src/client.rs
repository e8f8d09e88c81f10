//! Authenticated API client
//!
//! `Client` is cheap to clone; clones share the credential state, so a
//! refresh performed through one clone is seen by all of them.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use transport::{ApiRequest, ApiResponse, HeaderMap, HeaderValue, HttpTransport, Transport, header};
use vhx_auth::{Credential, TokenRefresher};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::middleware::AuthMiddleware;
use crate::pipeline::{DefaultHeaders, LogRequests, Middleware, Pipeline, TranslateErrors};
use crate::state::CredentialState;

const USER_AGENT: &str = concat!("vhx-client/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    state: Arc<CredentialState>,
    pipeline: Pipeline,
    auto_refresh: bool,
}

impl Client {
    /// Build a client that talks to `config.api_base_url` over HTTP.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config.api_base_url.clone(), config.timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client on an existing transport.
    ///
    /// The token refresher uses `transport` directly, outside the request
    /// pipeline, so refresh calls never carry the expiring token.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let credential = config.initial_credential()?;
        let mode = credential.mode();

        let mut defaults = HeaderMap::new();
        defaults.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        defaults.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        let default_headers = Arc::new(DefaultHeaders::new(defaults));

        let refresher = TokenRefresher::new(
            Arc::clone(&transport),
            config.client_id.clone(),
            config.client_secret.clone(),
        );
        let state = Arc::new(CredentialState::new(
            credential,
            refresher,
            Arc::clone(&default_headers),
        )?);

        let auto_refresh = !config.skip_auto_refresh;
        let mut middleware: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(LogRequests), Arc::new(TranslateErrors)];
        if auto_refresh {
            middleware.push(Arc::new(AuthMiddleware::new(
                Arc::clone(&state),
                config.refresh_leeway_secs,
            )));
        }
        let pipeline = Pipeline::new(transport, middleware, default_headers);

        info!(
            mode,
            base_url = %config.api_base_url,
            auto_refresh,
            "VHX client ready"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                state,
                pipeline,
                auto_refresh,
            }),
        })
    }

    /// The active credential.
    pub fn credential(&self) -> Arc<Credential> {
        self.inner.state.current()
    }

    /// Current OAuth access token; `None` in static-key mode.
    pub fn access_token(&self) -> Option<String> {
        self.credential()
            .as_oauth()
            .map(|token| token.access_token.clone())
    }

    pub fn is_expired(&self) -> bool {
        self.credential().is_expired()
    }

    /// Token fields of the active credential; `None` in static-key mode.
    pub fn credentials(&self) -> Option<serde_json::Map<String, Value>> {
        self.credential().to_map()
    }

    /// Whether the auth middleware is installed.
    pub fn auto_refresh(&self) -> bool {
        self.inner.auto_refresh
    }

    /// Decorators, outermost first.
    pub fn middleware_names(&self) -> Vec<&str> {
        self.inner.pipeline.middleware_names()
    }

    /// Exchange the refresh token for a new credential now.
    ///
    /// Works with or without auto-refresh. On success the new credential is
    /// installed and the default Authorization header updated; on failure the
    /// previous credential stays. Missing refresh material is reported as
    /// `Error::Configuration`.
    pub async fn refresh(&self) -> Result<Credential> {
        let observed = self.inner.state.snapshot();
        let snapshot = self.inner.state.refresh_from(&observed).await?;
        Ok(snapshot.credential().clone())
    }

    /// Send a request through the pipeline and return the raw response.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.inner.pipeline.execute(request).await
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.json(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.json(ApiRequest::post(path).json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
        self.json(ApiRequest::put(path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.json(ApiRequest::delete(path)).await
    }

    async fn json(&self, request: ApiRequest) -> Result<Value> {
        self.execute(request)
            .await?
            .json_value()
            .map_err(|e| Error::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InitialToken;
    use crate::error::AuthFailure;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LONG_AGO: u64 = 1_000_000_000;

    fn oauth_config(server: &MockServer, expires_at: Option<u64>) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(server.uri())
            .with_client_credentials("client-1", "s3cret")
            .with_token(InitialToken {
                access_token: Some("A1".into()),
                refresh_token: Some("R1".into()),
                expires_at,
                ..Default::default()
            })
    }

    fn token_response(access: &str, refresh: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": 3600
        }))
    }

    #[test]
    fn new_without_credentials_is_configuration_error() {
        let err = Client::new(ClientConfig::default()).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)), "got: {err:?}");
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        let config = ClientConfig::default()
            .with_base_url("ftp://api.vhx.tv")
            .with_api_key("sk_live_123");
        let err = Client::new(config).err().unwrap();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("api_base_url")));
    }

    #[tokio::test]
    async fn pipeline_composition_follows_skip_auto_refresh() {
        let server = MockServer::start().await;
        let client = Client::new(oauth_config(&server, None)).unwrap();
        assert!(client.auto_refresh());
        assert_eq!(client.middleware_names(), vec!["log", "translate_errors", "auth"]);

        let mut config = oauth_config(&server, None);
        config.skip_auto_refresh = true;
        let client = Client::new(config).unwrap();
        assert!(!client.auto_refresh());
        assert_eq!(client.middleware_names(), vec!["log", "translate_errors"]);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_before_first_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header_eq("authorization", "Bearer A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(oauth_config(&server, Some(LONG_AGO))).unwrap();
        assert!(client.is_expired());

        let me = client.get("/me").await.unwrap();
        assert_eq!(me["id"], 7);
        assert_eq!(client.access_token().as_deref(), Some("A2"));
        assert!(!client.is_expired());
        let credentials = client.credentials().unwrap();
        assert_eq!(credentials["refreshed"], true);
        assert_eq!(credentials["refresh_token"], "R2");
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2").set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header_eq("authorization", "Bearer A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})))
            .expect(10)
            .mount(&server)
            .await;

        let client = Client::new(oauth_config(&server, Some(LONG_AGO))).unwrap();
        let mut handles = Vec::new();
        for _ in 0..10 {
            let client = client.clone();
            handles.push(tokio::spawn(async move { client.get("/me").await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap()["id"], 7);
        }
        assert_eq!(client.access_token().as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_and_request_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header_eq("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header_eq("authorization", "Bearer A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(oauth_config(&server, None)).unwrap();
        assert_eq!(client.get("/me").await.unwrap()["id"], 7);
    }

    #[tokio::test]
    async fn static_key_rejection_is_immediate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2"))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header_eq("authorization", "Basic c2tfbGl2ZV8xMjM6"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let config = ClientConfig::default()
            .with_base_url(server.uri())
            .with_api_key("sk_live_123");
        let client = Client::new(config).unwrap();
        assert!(client.access_token().is_none());
        assert!(client.credentials().is_none());
        assert!(!client.is_expired());

        let err = client.get("/me").await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::Authentication(AuthFailure::Rejected { status: 401, .. })
            ),
            "got: {err:?}"
        );

        let err = client.refresh().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn skip_auto_refresh_sends_expired_token_and_explicit_refresh_updates_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header_eq("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header_eq("authorization", "Bearer A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = oauth_config(&server, Some(LONG_AGO));
        config.skip_auto_refresh = true;
        let client = Client::new(config).unwrap();

        let err = client.get("/me").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)), "got: {err:?}");

        let refreshed = client.refresh().await.unwrap();
        assert_eq!(refreshed.as_oauth().unwrap().access_token, "A2");
        assert_eq!(client.get("/me").await.unwrap()["id"], 7);
    }

    #[tokio::test]
    async fn refresh_without_client_secret_is_configuration_error() {
        let server = MockServer::start().await;
        let config = ClientConfig::default()
            .with_base_url(server.uri())
            .with_token(InitialToken {
                access_token: Some("A1".into()),
                refresh_token: Some("R1".into()),
                ..Default::default()
            });
        let client = Client::new(config).unwrap();

        let err = client.refresh().await.unwrap_err();
        assert!(
            matches!(err, Error::Configuration(ref m) if m.contains("client_id")),
            "got: {err:?}"
        );
        assert_eq!(client.access_token().as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(oauth_config(&server, Some(LONG_AGO))).unwrap();
        let err = client.refresh().await.unwrap_err();
        let Error::Authentication(failure) = &err else {
            panic!("expected authentication error, got: {err:?}");
        };
        assert_eq!(failure.refresh_rejection_status(), Some(400));
        assert_eq!(client.access_token().as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn verb_helpers_send_json_and_parse_responses() {
        let server = MockServer::start().await;
        let payload = serde_json::json!({"title": "Episode 1"});
        Mock::given(method("POST"))
            .and(path("/videos"))
            .and(body_json(&payload))
            .and(header_eq("accept", "application/json"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 42})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/videos/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 42})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/videos/42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/videos/43"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(oauth_config(&server, None)).unwrap();
        assert_eq!(client.post("/videos", payload.clone()).await.unwrap()["id"], 42);
        assert_eq!(client.put("/videos/42", payload).await.unwrap()["id"], 42);
        assert_eq!(client.delete("/videos/42").await.unwrap(), Value::Null);

        let err = client.get("/videos/43").await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 404, .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn non_json_success_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let client = Client::new(oauth_config(&server, None)).unwrap();
        let err = client.get("/me").await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "got: {err:?}");

        let raw = client.execute(ApiRequest::get("/me")).await.unwrap();
        assert_eq!(raw.body, "<html></html>");
    }
}
