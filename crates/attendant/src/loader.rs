//! Retrying loader with an observable state.
//!
//! ```text
//! Idle ──► Loading ──► Ok(T)
//!             │
//!             ├──► Retrying(1) ──► ... ──► Retrying(n) ──► Failed(error)
//!             │        (transient errors, fixed delay)
//!             └──► Failed(error)   (permanent error)
//! ```
//!
//! The caller decides what a failure looks like to the user; the HTTP layer
//! answers `503` with the error so the page can offer a reload.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::health::HealthService;
use crate::rest::RestError;

/// Whether a failed load is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadErrorKind {
    Transient,
    Permanent,
}

/// A failed load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LoadError {
    kind: LoadErrorKind,
    message: String,
}

impl LoadError {
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: LoadErrorKind::Transient,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: LoadErrorKind::Permanent,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> LoadErrorKind {
        self.kind
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, LoadErrorKind::Transient)
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<RestError> for LoadError {
    fn from(err: RestError) -> Self {
        if err.is_transient() {
            Self::transient(err.to_string())
        } else {
            Self::permanent(err.to_string())
        }
    }
}

/// How many times to retry transient failures, and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Where a load is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    Idle,
    Loading,
    Retrying { attempt: u32, last_error: LoadError },
    Ok(T),
    Failed(LoadError),
}

impl<T> LoadState<T> {
    /// The state without its data, for status reports.
    #[must_use]
    pub fn phase(&self) -> LoadPhase {
        match self {
            Self::Idle => LoadPhase::Idle,
            Self::Loading => LoadPhase::Loading,
            Self::Retrying { attempt, .. } => LoadPhase::Retrying { attempt: *attempt },
            Self::Ok(_) => LoadPhase::Ok,
            Self::Failed(err) => LoadPhase::Failed {
                kind: err.kind(),
                error: err.message().to_string(),
            },
        }
    }
}

/// Serializable summary of a [`LoadState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LoadPhase {
    Idle,
    Loading,
    Retrying { attempt: u32 },
    Ok,
    Failed { kind: LoadErrorKind, error: String },
}

/// Runs a load operation under a [`RetryPolicy`] and publishes its state.
///
/// Successes and failures are reported to the [`HealthService`] under the
/// loader's name.
#[derive(Debug)]
pub struct Loader<T> {
    name: &'static str,
    policy: RetryPolicy,
    health: HealthService,
    state: watch::Sender<LoadState<T>>,
}

impl<T: Clone + Send + Sync + 'static> Loader<T> {
    #[must_use]
    pub fn new(name: &'static str, policy: RetryPolicy, health: HealthService) -> Self {
        let (state, _) = watch::channel(LoadState::Idle);
        Self {
            name,
            policy,
            health,
            state,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LoadState<T> {
        self.state.borrow().clone()
    }

    /// Observe state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LoadState<T>> {
        self.state.subscribe()
    }

    /// Run `op` until it succeeds, fails permanently, or the retries run out.
    ///
    /// # Errors
    ///
    /// Returns the last [`LoadError`] when the load ends in `Failed`.
    pub async fn load<F, Fut>(&self, mut op: F) -> Result<T, LoadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LoadError>>,
    {
        self.state.send_replace(LoadState::Loading);
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => {
                    self.health.record_success(self.name);
                    self.state.send_replace(LoadState::Ok(value.clone()));
                    debug!(loader = self.name, attempt, "load succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    self.health.record_error(self.name, &err);
                    if err.is_transient() && attempt < self.policy.max_retries {
                        attempt += 1;
                        warn!(
                            loader = self.name,
                            attempt,
                            error = %err,
                            "load failed, retrying"
                        );
                        self.state.send_replace(LoadState::Retrying {
                            attempt,
                            last_error: err,
                        });
                        tokio::time::sleep(self.policy.delay).await;
                    } else {
                        self.state.send_replace(LoadState::Failed(err.clone()));
                        return Err(err);
                    }
                }
            }
        }
    }
}
