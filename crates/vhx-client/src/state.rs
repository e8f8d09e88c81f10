//! Active credential and single-flight refresh
//!
//! `CredentialState` holds the one credential a client authenticates with.
//! Readers take a `Snapshot` (credential, prepared header, attempt epoch)
//! under a short std mutex that is never held across an await. Refreshes go
//! through an async flight gate:
//!
//! 1. A caller that saw a stale credential asks for a refresh, passing the
//!    snapshot it observed
//! 2. The first caller through the gate performs the token call; every
//!    attempt, successful or not, bumps the epoch
//! 3. Callers queued behind it see a newer epoch than the one they observed
//!    and reuse the recorded outcome (new credential or failure) instead of
//!    calling the token endpoint again
//!
//! The token call runs on a spawned task, so a caller that is cancelled
//! while waiting does not abort it; the outcome is still installed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use transport::{HeaderValue, header};
use vhx_auth::{Credential, TokenRefresher};

use crate::error::{AuthFailure, Error};
use crate::metrics::{RefreshOutcome, record_refresh};
use crate::pipeline::DefaultHeaders;

/// Point-in-time view of the active credential.
#[derive(Debug, Clone)]
pub struct Snapshot {
    credential: Arc<Credential>,
    authorization: HeaderValue,
    epoch: u64,
}

impl Snapshot {
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Prepared `Authorization` header value (marked sensitive).
    pub fn authorization(&self) -> &HeaderValue {
        &self.authorization
    }

    /// Refresh attempts completed before this snapshot was taken.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the credential should be refreshed before use.
    pub fn is_stale(&self, leeway_secs: u64, now: u64) -> bool {
        match self.credential.as_ref() {
            Credential::StaticKey(_) => false,
            Credential::OAuth(token) => token.expires_within(leeway_secs, now),
        }
    }
}

struct Slot {
    credential: Arc<Credential>,
    authorization: HeaderValue,
    epoch: u64,
    /// Outcome of the latest attempt when it failed
    last_failure: Option<vhx_auth::Error>,
}

impl Slot {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            credential: Arc::clone(&self.credential),
            authorization: self.authorization.clone(),
            epoch: self.epoch,
        }
    }
}

pub struct CredentialState {
    slot: Mutex<Slot>,
    flight: tokio::sync::Mutex<()>,
    refresher: TokenRefresher,
    default_headers: Arc<DefaultHeaders>,
}

impl CredentialState {
    /// Install `initial` and publish its Authorization header as a default.
    pub fn new(
        initial: Credential,
        refresher: TokenRefresher,
        default_headers: Arc<DefaultHeaders>,
    ) -> crate::Result<Self> {
        let authorization = authorization_value(&initial).ok_or_else(|| {
            Error::Configuration(
                "credential contains characters not allowed in an HTTP header".into(),
            )
        })?;
        default_headers.set(header::AUTHORIZATION, authorization.clone());
        Ok(Self {
            slot: Mutex::new(Slot {
                credential: Arc::new(initial),
                authorization,
                epoch: 0,
                last_failure: None,
            }),
            flight: tokio::sync::Mutex::new(()),
            refresher,
            default_headers,
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock_slot().snapshot()
    }

    pub fn current(&self) -> Arc<Credential> {
        Arc::clone(&self.lock_slot().credential)
    }

    /// Refresh the credential `observed` was taken from.
    ///
    /// If another refresh completed since `observed`, its outcome is returned
    /// without a new token call. On failure the previous credential stays
    /// installed.
    pub async fn refresh_from(
        self: &Arc<Self>,
        observed: &Snapshot,
    ) -> Result<Snapshot, AuthFailure> {
        let state = Arc::clone(self);
        let observed_epoch = observed.epoch;
        let task = tokio::spawn(async move { state.run_refresh(observed_epoch).await });
        match task.await {
            Ok(outcome) => outcome.map_err(AuthFailure::Refresh),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(AuthFailure::RefreshAborted),
        }
    }

    async fn run_refresh(&self, observed_epoch: u64) -> vhx_auth::Result<Snapshot> {
        let _gate = self.flight.lock().await;

        let token = {
            let slot = self.lock_slot();
            if slot.epoch != observed_epoch {
                debug!(epoch = slot.epoch, "reusing outcome of concurrent refresh");
                record_refresh(RefreshOutcome::Shared);
                return match &slot.last_failure {
                    Some(e) => Err(e.clone()),
                    None => Ok(slot.snapshot()),
                };
            }
            match slot.credential.as_ref() {
                Credential::OAuth(token) => token.clone(),
                Credential::StaticKey(_) => {
                    return Err(vhx_auth::Error::Configuration(
                        "static API keys cannot be refreshed".into(),
                    ));
                }
            }
        };

        debug!("refreshing access token");
        let outcome = self.refresher.refresh(&token).await.and_then(|token| {
            let credential = Credential::OAuth(token);
            let authorization = authorization_value(&credential).ok_or_else(|| {
                vhx_auth::Error::InvalidResponse(
                    "access_token contains characters not allowed in an HTTP header".into(),
                )
            })?;
            Ok((credential, authorization))
        });

        let mut slot = self.lock_slot();
        slot.epoch += 1;
        match outcome {
            Ok((credential, authorization)) => {
                slot.credential = Arc::new(credential);
                slot.authorization = authorization.clone();
                slot.last_failure = None;
                let snapshot = slot.snapshot();
                drop(slot);

                self.default_headers.set(header::AUTHORIZATION, authorization);
                record_refresh(RefreshOutcome::Success);
                info!(epoch = snapshot.epoch, "installed refreshed credential");
                Ok(snapshot)
            }
            Err(e) => {
                slot.last_failure = Some(e.clone());
                drop(slot);

                record_refresh(RefreshOutcome::Failure);
                warn!(error = %e, "token refresh failed; keeping previous credential");
                Err(e)
            }
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn authorization_value(credential: &Credential) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&credential.authorization_header()).ok()?;
    value.set_sensitive(true);
    Some(value)
}
