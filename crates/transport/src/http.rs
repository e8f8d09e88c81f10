//! reqwest-backed transport.
//!
//! Joins request paths onto the configured base URL, encodes JSON and form
//! bodies, and applies the client-wide timeout. The response body is read in
//! full and returned with its status, so callers decide what a non-2xx means.

use crate::{ApiRequest, ApiResponse, BoxFuture, RequestBody, Transport, TransportError};
use std::time::Duration;
use tracing::debug;

/// HTTP transport over a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport with its own client and a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("building HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Wrap an existing client (shares its connection pool).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a request path against the base URL. Absolute URLs pass through.
    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Transport for HttpTransport {
    fn id(&self) -> &str {
        "http"
    }

    fn send(&self, request: ApiRequest) -> BoxFuture<'_, crate::Result<ApiResponse>> {
        Box::pin(async move {
            let url = self.url_for(&request.path);
            debug!(method = %request.method, url = %url, "sending request");

            let builder = self
                .client
                .request(request.method, &url)
                .headers(request.headers);
            let builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Json(value) => builder.json(&value),
                RequestBody::Form(pairs) => builder.form(&pairs),
            };

            let response = builder.send().await.map_err(map_send_error)?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::Http(format!("reading response body: {e}")))?;

            debug!(status, bytes = body.len(), "received response");
            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Http(e.to_string())
    }
}
