//! Live order board.
//!
//! Holds the active orders, refreshes them when the realtime subscription
//! reports a change, and validates status changes before they reach the
//! backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use forno_core::{Order, OrderId, OrderStatus, StatusTransitionError};
use forno_realtime::{
    ConnectionState, RealtimeSubscription, RealtimeTransport, SubscriptionHandle,
    SubscriptionOptions, TableWatch,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::health::{HealthService, HealthStatus};
use crate::loader::{LoadError, LoadPhase, LoadState, Loader, RetryPolicy};
use crate::rest::RestError;

/// Health component name for the order list.
pub const ORDERS_COMPONENT: &str = "orders";
/// Health component name for the realtime subscription.
pub const REALTIME_COMPONENT: &str = "realtime";

/// Tables whose changes invalidate the board.
pub const WATCHED_TABLES: [&str; 2] = ["orders", "order_items"];

/// Errors from board operations.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error(transparent)]
    Transition(#[from] StatusTransitionError),

    /// Another client moved the order between our read and our write.
    #[error("order {id} is now {status}")]
    Changed { id: OrderId, status: OrderStatus },

    #[error("backend error: {0}")]
    Backend(#[source] RestError),
}

impl From<RestError> for BoardError {
    fn from(err: RestError) -> Self {
        Self::Backend(err)
    }
}

/// One status column of the board.
#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn {
    pub status: OrderStatus,
    pub label: &'static str,
    pub count: usize,
    pub orders: Vec<Order>,
}

/// What the board shows right now.
#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub load: LoadPhase,
    pub connection: &'static str,
    pub total: usize,
    /// Non-terminal statuses in workflow order, including empty ones.
    pub columns: Vec<BoardColumn>,
}

#[derive(Debug, Default)]
struct RefreshFlags {
    running: bool,
    again: bool,
}

/// Shared handle to the board. Cheap to clone.
#[derive(Clone)]
pub struct OrderBoard {
    inner: Arc<BoardInner>,
}

struct BoardInner {
    backend: Arc<dyn Backend>,
    health: HealthService,
    loader: Loader<Vec<Order>>,
    orders: RwLock<Vec<Order>>,
    loaded_once: AtomicBool,
    refresh: Mutex<RefreshFlags>,
    refreshes: watch::Sender<u64>,
    connection: OnceLock<watch::Receiver<ConnectionState>>,
}

impl OrderBoard {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, health: HealthService, policy: RetryPolicy) -> Self {
        let (refreshes, _) = watch::channel(0);
        Self {
            inner: Arc::new(BoardInner {
                backend,
                loader: Loader::new(ORDERS_COMPONENT, policy, health.clone()),
                health,
                orders: RwLock::new(Vec::new()),
                loaded_once: AtomicBool::new(false),
                refresh: Mutex::new(RefreshFlags::default()),
                refreshes,
                connection: OnceLock::new(),
            }),
        }
    }

    /// Load the active orders now, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the final [`LoadError`] if the load fails. The previous
    /// orders stay on the board.
    pub async fn refresh(&self) -> Result<usize, LoadError> {
        let backend = Arc::clone(&self.inner.backend);
        let result = self
            .inner
            .loader
            .load(|| {
                let backend = Arc::clone(&backend);
                async move { Ok(backend.active_orders().await?) }
            })
            .await;

        let outcome = result.map(|orders| {
            let count = orders.len();
            *self
                .inner
                .orders
                .write()
                .unwrap_or_else(PoisonError::into_inner) = orders;
            self.inner.loaded_once.store(true, Ordering::Release);
            count
        });
        self.inner.refreshes.send_modify(|n| *n += 1);
        outcome
    }

    /// Ask for a refresh without waiting for it.
    ///
    /// At most one refresh runs at a time. Requests that arrive while one is
    /// running collapse into a single follow-up refresh.
    pub fn request_refresh(&self) {
        {
            let mut flags = self
                .inner
                .refresh
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if flags.running {
                flags.again = true;
                return;
            }
            flags.running = true;
        }

        let board = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = board.refresh().await {
                    warn!(error = %e, "board refresh failed");
                }
                let done = {
                    let mut flags = board
                        .inner
                        .refresh
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    if flags.again {
                        flags.again = false;
                        false
                    } else {
                        flags.running = false;
                        true
                    }
                };
                if done {
                    break;
                }
            }
        });
    }

    /// Number of completed refreshes, observable for waiting on the board.
    #[must_use]
    pub fn refreshes(&self) -> watch::Receiver<u64> {
        self.inner.refreshes.subscribe()
    }

    /// Subscribe to order changes and keep the board and the health
    /// service up to date. Call once; later calls still subscribe but the
    /// board keeps reporting the first subscription's state.
    pub fn connect_realtime(
        &self,
        transport: Arc<dyn RealtimeTransport>,
        options: SubscriptionOptions,
    ) -> SubscriptionHandle {
        let options = WATCHED_TABLES
            .iter()
            .fold(options, |options, table| options.watch(TableWatch::new(*table)));

        let board = self.clone();
        let handle = RealtimeSubscription::spawn(transport, options, move |change| {
            debug!(table = %change.table, kind = %change.kind, row = ?change.row_id(), "orders changed");
            board.request_refresh();
        });

        let states = handle.watch_state();
        if self.inner.connection.set(states.clone()).is_err() {
            warn!("board already tracks a realtime subscription");
        }
        tokio::spawn(report_connection(states, self.inner.health.clone()));
        handle
    }

    /// Current realtime connection state.
    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        self.inner
            .connection
            .get()
            .map_or(ConnectionState::Disconnected, |rx| *rx.borrow())
    }

    /// Active orders grouped by status.
    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        let orders = self
            .inner
            .orders
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let columns: Vec<BoardColumn> = OrderStatus::ALL
            .into_iter()
            .filter(|status| !status.is_terminal())
            .map(|status| {
                let orders: Vec<Order> = orders
                    .iter()
                    .filter(|order| order.status == status)
                    .cloned()
                    .collect();
                BoardColumn {
                    status,
                    label: status.label(),
                    count: orders.len(),
                    orders,
                }
            })
            .collect();

        BoardSnapshot {
            load: self.inner.loader.state().phase(),
            connection: self.connection().as_str(),
            total: columns.iter().map(|c| c.count).sum(),
            columns,
        }
    }

    /// The load failure, if the board has given up loading and has never
    /// loaded successfully. After one success the board serves what it has.
    #[must_use]
    pub fn unavailable(&self) -> Option<LoadError> {
        let LoadState::Failed(err) = self.inner.loader.state() else {
            return None;
        };
        (!self.inner.loaded_once.load(Ordering::Acquire)).then_some(err)
    }

    /// Move an order to `next`, checking the workflow first.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Transition`] without touching the backend if the
    /// workflow forbids the move, [`BoardError::NotFound`] for unknown orders,
    /// [`BoardError::Changed`] if another client moved the order first and
    /// [`BoardError::Backend`] for anything else.
    pub async fn advance(&self, id: OrderId, next: OrderStatus) -> Result<Order, BoardError> {
        let current = self.current(id).await?;
        current.status.transition_to(next)?;

        let Some(updated) = self
            .inner
            .backend
            .update_status(id, current.status, next)
            .await?
        else {
            let status = self.current(id).await?.status;
            warn!(
                order_id = %id,
                expected = %current.status,
                actual = %status,
                "order moved concurrently"
            );
            self.request_refresh();
            return Err(BoardError::Changed { id, status });
        };
        info!(order_id = %id, from = %current.status, to = %next, "order status changed");
        self.request_refresh();
        Ok(updated)
    }

    async fn current(&self, id: OrderId) -> Result<Order, BoardError> {
        match self.inner.backend.order(id).await {
            Ok(order) => Ok(order),
            Err(RestError::NotFound(_)) => Err(BoardError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Mirror connection state changes into the health service.
async fn report_connection(mut states: watch::Receiver<ConnectionState>, health: HealthService) {
    loop {
        let state = *states.borrow_and_update();
        match state {
            ConnectionState::Connected => {
                health.set_status(REALTIME_COMPONENT, HealthStatus::Healthy, None);
            }
            ConnectionState::Reconnecting { .. } => {
                let reason = state.to_string();
                health.set_status(REALTIME_COMPONENT, HealthStatus::Degraded, Some(&reason));
            }
            ConnectionState::Exhausted => {
                health.set_status(
                    REALTIME_COMPONENT,
                    HealthStatus::Unhealthy,
                    Some("gave up reconnecting"),
                );
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {}
        }
        if states.changed().await.is_err() {
            break;
        }
    }
}
