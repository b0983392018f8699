//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::Backend;
use crate::board::OrderBoard;
use crate::health::HealthService;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    board: OrderBoard,
    backend: Arc<dyn Backend>,
    health: HealthService,
}

impl AppState {
    #[must_use]
    pub fn new(board: OrderBoard, backend: Arc<dyn Backend>, health: HealthService) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                board,
                backend,
                health,
            }),
        }
    }

    #[must_use]
    pub fn board(&self) -> &OrderBoard {
        &self.inner.board
    }

    /// Backend for reads that bypass the board (menu, zones).
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    #[must_use]
    pub fn health(&self) -> &HealthService {
        &self.inner.health
    }
}
