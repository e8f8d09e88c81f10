//! Auth middleware
//!
//! Per request:
//! 1. Stale OAuth token: refresh before sending; a failed refresh fails the
//!    request without sending it
//! 2. Send with the snapshot's Authorization header
//! 3. 401: static keys fail immediately; OAuth refreshes once and resends
//!    once, and a second 401 is final
//!
//! Responses other than 401 pass through untouched for `TranslateErrors`.

use std::sync::Arc;

use tracing::{debug, warn};
use transport::{ApiRequest, ApiResponse, BoxFuture, header};
use vhx_auth::{Credential, now_secs};

use crate::error::{AuthFailure, Result};
use crate::pipeline::{Middleware, Next};
use crate::state::{CredentialState, Snapshot};

pub struct AuthMiddleware {
    state: Arc<CredentialState>,
    leeway_secs: u64,
}

impl AuthMiddleware {
    /// `leeway_secs`: refresh tokens this many seconds before they expire.
    pub fn new(state: Arc<CredentialState>, leeway_secs: u64) -> Self {
        Self { state, leeway_secs }
    }
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &str {
        "auth"
    }

    fn handle<'a>(
        &'a self,
        request: ApiRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<ApiResponse>> {
        Box::pin(async move {
            let mut snapshot = self.state.snapshot();
            if snapshot.is_stale(self.leeway_secs, now_secs()) {
                debug!("access token expired; refreshing before send");
                snapshot = self.state.refresh_from(&snapshot).await?;
            }

            let retry = request.clone();
            let response = next.run(authorize(request, &snapshot)).await?;
            if !response.is_unauthorized() {
                return Ok(response);
            }

            if let Credential::StaticKey(_) = snapshot.credential() {
                warn!(status = response.status, "API key rejected");
                return Err(rejected(response).into());
            }

            warn!(
                status = response.status,
                "access token rejected; refreshing and retrying once"
            );
            let refreshed = self.state.refresh_from(&snapshot).await?;
            let response = next.run(authorize(retry, &refreshed)).await?;
            if response.is_unauthorized() {
                warn!(status = response.status, "refreshed access token rejected");
                return Err(rejected(response).into());
            }
            Ok(response)
        })
    }
}

fn authorize(mut request: ApiRequest, snapshot: &Snapshot) -> ApiRequest {
    request
        .headers
        .insert(header::AUTHORIZATION, snapshot.authorization().clone());
    request
}

fn rejected(response: ApiResponse) -> AuthFailure {
    AuthFailure::Rejected {
        status: response.status,
        body: response.body,
    }
}
