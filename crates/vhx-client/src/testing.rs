//! Scripted transport and metrics recorder for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::Secret;
use ::metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use transport::{ApiRequest, ApiResponse, BoxFuture, Transport, header};
use vhx_auth::{Credential, OAuthToken, StaticKey, TOKEN_PATH, TokenRefresher};

/// Answers token-endpoint calls and API calls from separate queues.
///
/// The last response in a queue repeats forever; an empty queue answers 500.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    token_responses: Mutex<VecDeque<ApiResponse>>,
    api_responses: Mutex<VecDeque<ApiResponse>>,
    token_delay: Duration,
    token_calls: AtomicUsize,
    api_requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn token(self, status: u16, body: serde_json::Value) -> Self {
        self.token_responses
            .lock()
            .unwrap()
            .push_back(ApiResponse::new(status, body.to_string()));
        self
    }

    pub(crate) fn api(self, status: u16, body: &str) -> Self {
        self.api_responses
            .lock()
            .unwrap()
            .push_back(ApiResponse::new(status, body));
        self
    }

    pub(crate) fn token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    pub(crate) fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn api_calls(&self) -> usize {
        self.api_requests.lock().unwrap().len()
    }

    /// Authorization header of every API request, in order.
    pub(crate) fn api_authorizations(&self) -> Vec<String> {
        self.api_requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                r.headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string()
            })
            .collect()
    }

    fn next(queue: &Mutex<VecDeque<ApiResponse>>) -> ApiResponse {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| ApiResponse::new(500, "unscripted"))
        }
    }
}

impl Transport for ScriptedTransport {
    fn id(&self) -> &str {
        "scripted"
    }

    fn send(&self, request: ApiRequest) -> BoxFuture<'_, transport::Result<ApiResponse>> {
        if request.path == TOKEN_PATH {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            let response = Self::next(&self.token_responses);
            let delay = self.token_delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(response)
            })
        } else {
            let response = Self::next(&self.api_responses);
            self.api_requests.lock().unwrap().push(request);
            Box::pin(async move { Ok(response) })
        }
    }
}

pub(crate) fn refresher(transport: Arc<ScriptedTransport>) -> TokenRefresher {
    TokenRefresher::new(
        transport,
        Some("client-1".into()),
        Some(Secret::new("s3cret".into())),
    )
}

pub(crate) fn oauth(access: &str, refresh: &str, expires_at: Option<u64>) -> Credential {
    Credential::OAuth(OAuthToken {
        access_token: access.into(),
        refresh_token: refresh.into(),
        token_type: "Bearer".into(),
        expires_at,
        scope: None,
        refreshed: false,
    })
}

pub(crate) fn static_key(key: &str) -> Credential {
    Credential::StaticKey(StaticKey::new(Secret::new(key.into())))
}

/// Token-endpoint body for a fresh token.
pub(crate) fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 3600
    })
}

/// An expiry far in the past.
pub(crate) const LONG_AGO: u64 = 1_000_000_000;

/// Keeps every counter and histogram registered while it is the local
/// recorder. Counters keep their increments; histogram values are dropped.
#[derive(Default)]
pub(crate) struct CapturingRecorder {
    counters: Mutex<Vec<(Key, Arc<AtomicU64>)>>,
    histograms: Mutex<Vec<Key>>,
}

impl CapturingRecorder {
    /// Sum of every increment recorded under `name` with exactly `labels`.
    pub(crate) fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key_matches(key, name, labels))
            .map(|(_, value)| value.load(Ordering::SeqCst))
            .sum()
    }

    pub(crate) fn has_histogram(&self, name: &str, labels: &[(&str, &str)]) -> bool {
        self.histograms
            .lock()
            .unwrap()
            .iter()
            .any(|key| key_matches(key, name, labels))
    }
}

fn key_matches(key: &Key, name: &str, labels: &[(&str, &str)]) -> bool {
    key.name() == name
        && key
            .labels()
            .map(|label| (label.key(), label.value()))
            .eq(labels.iter().copied())
}

impl Recorder for CapturingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let value = Arc::new(AtomicU64::new(0));
        self.counters
            .lock()
            .unwrap()
            .push((key.clone(), value.clone()));
        Counter::from_arc(value)
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        self.histograms.lock().unwrap().push(key.clone());
        Histogram::noop()
    }
}
