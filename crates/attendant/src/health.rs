//! Component health tracking.
//!
//! A single [`HealthService`] is created at start-up and cloned into every
//! component that talks to the outside world. Components report successes
//! and failures under their own name; the readiness endpoint reports the
//! worst status across all of them.
//!
//! ```text
//!             error              3rd consecutive error
//! Healthy ──────────► Degraded ─────────────────────────► Unhealthy
//!    ▲                   │                                    │
//!    └───────────────────┴──────────── success ───────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

/// Consecutive errors after which a component is unhealthy.
pub const UNHEALTHY_AFTER: u32 = 3;

/// Health of one component, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is known about one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            consecutive_errors: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Point-in-time view of every component.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Worst status across components (healthy when nothing has reported).
    pub status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthSnapshot {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }
}

/// Shared, cheaply cloneable health registry.
#[derive(Debug, Clone, Default)]
pub struct HealthService {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
}

impl HealthService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful operation; the component becomes healthy again.
    pub fn record_success(&self, component: &str) {
        let recovered = self.update(component, |health| {
            let recovered = health.status != HealthStatus::Healthy;
            health.status = HealthStatus::Healthy;
            health.consecutive_errors = 0;
            health.last_error = None;
            recovered
        });
        if recovered {
            info!(component, "component recovered");
        }
    }

    /// Record a failed operation. The error is logged and sent to Sentry.
    pub fn record_error<E>(&self, component: &str, err: &E)
    where
        E: std::error::Error + ?Sized,
    {
        let event_id = sentry::capture_error(err);
        let message = err.to_string();

        let mut status = HealthStatus::Degraded;
        let mut consecutive = 0;
        self.update(component, |health| {
            health.consecutive_errors = health.consecutive_errors.saturating_add(1);
            health.status = if health.consecutive_errors >= UNHEALTHY_AFTER {
                HealthStatus::Unhealthy
            } else {
                HealthStatus::Degraded
            };
            health.last_error = Some(message.clone());
            status = health.status;
            consecutive = health.consecutive_errors;
            true
        });

        if status == HealthStatus::Unhealthy {
            error!(
                component,
                error = %message,
                consecutive,
                sentry_event_id = %event_id,
                "component unhealthy"
            );
        } else {
            warn!(
                component,
                error = %message,
                consecutive,
                sentry_event_id = %event_id,
                "component error"
            );
        }
    }

    /// Force a status without counting an error, for components that report
    /// their own state (e.g. a reconnecting subscription).
    pub fn set_status(&self, component: &str, status: HealthStatus, reason: Option<&str>) {
        let changed = self.update(component, |health| {
            let changed = health.status != status;
            health.status = status;
            if status == HealthStatus::Healthy {
                health.consecutive_errors = 0;
                health.last_error = None;
            } else if let Some(reason) = reason {
                health.last_error = Some(reason.to_string());
            }
            changed
        });
        if changed {
            info!(component, %status, reason, "component status changed");
        }
    }

    /// Current health of one component, if it has ever reported.
    #[must_use]
    pub fn component(&self, component: &str) -> Option<ComponentHealth> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(component)
            .cloned()
    }

    /// Every component plus the overall (worst) status.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        let components: BTreeMap<String, ComponentHealth> = self
            .components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, health)| (name.clone(), health.clone()))
            .collect();
        let status = components
            .values()
            .map(|health| health.status)
            .max()
            .unwrap_or_default();
        HealthSnapshot { status, components }
    }

    fn update(&self, component: &str, apply: impl FnOnce(&mut ComponentHealth) -> bool) -> bool {
        let mut components = self
            .components
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let health = components
            .entry(component.to_string())
            .or_insert_with(ComponentHealth::new);
        let changed = apply(health);
        health.updated_at = Utc::now();
        changed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("backend timed out")]
    struct Timeout;

    #[test]
    fn test_errors_degrade_then_mark_unhealthy() {
        let health = HealthService::new();
        health.record_error("orders", &Timeout);
        assert_eq!(health.component("orders").unwrap().status, HealthStatus::Degraded);

        health.record_error("orders", &Timeout);
        health.record_error("orders", &Timeout);
        let orders = health.component("orders").unwrap();
        assert_eq!(orders.status, HealthStatus::Unhealthy);
        assert_eq!(orders.consecutive_errors, 3);
        assert_eq!(orders.last_error.as_deref(), Some("backend timed out"));
    }

    #[test]
    fn test_success_resets() {
        let health = HealthService::new();
        for _ in 0..5 {
            health.record_error("menu", &Timeout);
        }
        health.record_success("menu");
        let menu = health.component("menu").unwrap();
        assert_eq!(menu.status, HealthStatus::Healthy);
        assert_eq!(menu.consecutive_errors, 0);
        assert!(menu.last_error.is_none());
    }

    #[test]
    fn test_snapshot_reports_worst() {
        let health = HealthService::new();
        assert_eq!(health.snapshot().status, HealthStatus::Healthy);
        assert!(health.snapshot().is_ready());

        health.record_success("menu");
        health.set_status("realtime", HealthStatus::Degraded, Some("reconnecting"));
        assert_eq!(health.snapshot().status, HealthStatus::Degraded);
        assert!(health.snapshot().is_ready());

        health.set_status("realtime", HealthStatus::Unhealthy, Some("gave up"));
        let snapshot = health.snapshot();
        assert_eq!(snapshot.status, HealthStatus::Unhealthy);
        assert!(!snapshot.is_ready());
        assert_eq!(snapshot.components.len(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let health = HealthService::new();
        let clone = health.clone();
        clone.record_error("orders", &Timeout);
        assert!(health.component("orders").is_some());
    }

    #[test]
    fn test_snapshot_serializes_lowercase() {
        let health = HealthService::new();
        health.set_status("realtime", HealthStatus::Degraded, None);
        let json = serde_json::to_value(health.snapshot()).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["components"]["realtime"]["status"], "degraded");
    }
}
