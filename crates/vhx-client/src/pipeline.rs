//! Request pipeline: default headers plus an ordered list of decorators
//!
//! Each `Middleware` receives the request and a `Next` handle for the rest
//! of the chain; the last link is the transport. A decorator may call
//! `next.run()` more than once (the auth middleware retries through it).
//!
//! The client composes, outermost first: `LogRequests`, `TranslateErrors`,
//! then `AuthMiddleware` unless auto-refresh is disabled.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use tracing::{Instrument, info, info_span, warn};
use transport::{
    ApiRequest, ApiResponse, BoxFuture, HeaderMap, HeaderName, HeaderValue, Transport,
};

use crate::error::{AuthFailure, Error, Result};

/// A request decorator.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Middleware>`).
pub trait Middleware: Send + Sync {
    /// Identifier for logging (e.g. "auth")
    fn name(&self) -> &str;

    fn handle<'a>(&'a self, request: ApiRequest, next: Next<'a>)
    -> BoxFuture<'a, Result<ApiResponse>>;
}

/// The remainder of the chain after the current decorator.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    transport: &'a dyn Transport,
    middleware: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub fn new(transport: &'a dyn Transport, middleware: &'a [Arc<dyn Middleware>]) -> Self {
        Self {
            transport,
            middleware,
        }
    }

    /// Pass the request to the next decorator, or send it if none remain.
    pub fn run(self, request: ApiRequest) -> BoxFuture<'a, Result<ApiResponse>> {
        match self.middleware.split_first() {
            Some((current, rest)) => current.handle(request, Next::new(self.transport, rest)),
            None => {
                let sending = self.transport.send(request);
                Box::pin(async move { sending.await.map_err(Error::from) })
            }
        }
    }
}

/// Headers applied to every request that does not set them itself.
///
/// Shared between the pipeline (reader) and the credential state, which
/// rewrites `Authorization` whenever a refresh installs a new token.
#[derive(Debug, Default)]
pub struct DefaultHeaders {
    headers: RwLock<HeaderMap>,
}

impl DefaultHeaders {
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers: RwLock::new(headers),
        }
    }

    pub fn set(&self, name: HeaderName, value: HeaderValue) {
        self.headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
    }

    pub fn get(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Copy defaults into `headers` where no value is set yet.
    fn apply(&self, headers: &mut HeaderMap) {
        let defaults = self.headers.read().unwrap_or_else(PoisonError::into_inner);
        for (name, value) in defaults.iter() {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Transport plus decorators plus default headers.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    middleware: Vec<Arc<dyn Middleware>>,
    default_headers: Arc<DefaultHeaders>,
}

impl Pipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        middleware: Vec<Arc<dyn Middleware>>,
        default_headers: Arc<DefaultHeaders>,
    ) -> Self {
        Self {
            transport,
            middleware,
            default_headers,
        }
    }

    /// Decorator names, outermost first.
    pub fn middleware_names(&self) -> Vec<&str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    pub fn default_headers(&self) -> &Arc<DefaultHeaders> {
        &self.default_headers
    }

    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        self.default_headers.apply(&mut request.headers);
        Next::new(self.transport.as_ref(), &self.middleware)
            .run(request)
            .await
    }
}

/// Opens a span per request and records its outcome.
///
/// Sits outside `TranslateErrors`, so error statuses arrive as `Err` and
/// are counted from `Error::status`.
pub struct LogRequests;

impl Middleware for LogRequests {
    fn name(&self) -> &str {
        "log"
    }

    fn handle<'a>(
        &'a self,
        request: ApiRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<ApiResponse>> {
        let request_id = uuid::Uuid::new_v4();
        let method = request.method.to_string();
        let span = info_span!(
            "api_request",
            request_id = %request_id,
            method = %method,
            path = %request.path
        );
        Box::pin(
            async move {
                let started = Instant::now();
                let result = next.run(request).await;
                let elapsed = started.elapsed();
                match &result {
                    Ok(response) => {
                        crate::metrics::record_request(
                            response.status,
                            &method,
                            elapsed.as_secs_f64(),
                        );
                        info!(
                            status = response.status,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "request completed"
                        );
                    }
                    Err(e) => {
                        let duration = elapsed.as_secs_f64();
                        match e.status() {
                            Some(status) => {
                                crate::metrics::record_request(status, &method, duration)
                            }
                            None => crate::metrics::record_failed_request(&method, duration),
                        }
                        warn!(
                            status = e.status(),
                            error = %e,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "request failed"
                        );
                    }
                }
                result
            }
            .instrument(span),
        )
    }
}

/// Turns non-2xx responses into errors: 401 into `Authentication`,
/// anything else into `Api`.
pub struct TranslateErrors;

impl Middleware for TranslateErrors {
    fn name(&self) -> &str {
        "translate_errors"
    }

    fn handle<'a>(
        &'a self,
        request: ApiRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<ApiResponse>> {
        Box::pin(async move {
            let response = next.run(request).await?;
            if response.is_success() {
                Ok(response)
            } else if response.is_unauthorized() {
                Err(Error::Authentication(AuthFailure::Rejected {
                    status: response.status,
                    body: response.body,
                }))
            } else {
                Err(Error::Api {
                    status: response.status,
                    body: response.body,
                })
            }
        })
    }
}
