//! Request and refresh counters
//!
//! Emitted through the `metrics` facade; they are no-ops until the embedding
//! application installs a recorder.
//!
//! - `vhx_requests_total` (counter): labels `status`, `method`
//! - `vhx_request_duration_seconds` (histogram): label `status`
//! - `vhx_token_refresh_total` (counter): label `outcome`

/// Outcome label for a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This caller performed the token call and it succeeded
    Success,
    /// This caller performed the token call and it failed
    Failure,
    /// Another caller's refresh finished first; its outcome was reused
    Shared,
}

impl RefreshOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Success => "success",
            RefreshOutcome::Failure => "failure",
            RefreshOutcome::Shared => "shared",
        }
    }
}

/// `status` label for requests that ended without an HTTP status
/// (transport failure, refresh failure).
pub const NO_STATUS: &str = "none";

/// Record an API request that produced a response, successful or not.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    record(status.to_string(), method, duration_secs);
}

/// Record an API request that failed before a response arrived.
pub fn record_failed_request(method: &str, duration_secs: f64) {
    record(NO_STATUS.to_string(), method, duration_secs);
}

fn record(status: String, method: &str, duration_secs: f64) {
    ::metrics::counter!("vhx_requests_total", "status" => status.clone(), "method" => method.to_string())
        .increment(1);
    ::metrics::histogram!("vhx_request_duration_seconds", "status" => status)
        .record(duration_secs);
}

/// Record a refresh attempt.
pub fn record_refresh(outcome: RefreshOutcome) {
    ::metrics::counter!("vhx_token_refresh_total", "outcome" => outcome.label()).increment(1);
}
