//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET   /health               - Liveness
//! GET   /health/ready         - Component health (503 when unhealthy)
//! GET   /orders               - Order board grouped by status
//! PATCH /orders/{id}/status   - Advance an order ({"status": "..."})
//! GET   /menu                 - Available products by category
//! GET   /delivery-zones       - Active delivery zones
//! ```

use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    middleware::from_fn,
    routing::{get, patch},
};
use forno_core::{DeliveryZone, Order, OrderId, OrderStatus, Product};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::board::BoardSnapshot;
use crate::error::{AppError, Result};
use crate::health::HealthSnapshot;
use crate::middleware::request_id;
use crate::state::AppState;

/// Every route, with request IDs and tracing applied.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/orders", get(orders))
        .route("/orders/{id}/status", patch(update_status))
        .route("/menu", get(menu))
        .route("/delivery-zones", get(delivery_zones))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(request_id)),
        )
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness: 200 unless some component is unhealthy.
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthSnapshot>) {
    let snapshot = state.health().snapshot();
    let status = if snapshot.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot))
}

async fn orders(State(state): State<AppState>) -> Result<Json<BoardSnapshot>> {
    if let Some(err) = state.board().unavailable() {
        return Err(AppError::Unavailable(err));
    }
    Ok(Json(state.board().snapshot()))
}

#[derive(Debug, Deserialize)]
struct StatusChange {
    status: OrderStatus,
}

async fn update_status(
    State(state): State<AppState>,
    id: std::result::Result<Path<OrderId>, PathRejection>,
    change: std::result::Result<Json<StatusChange>, JsonRejection>,
) -> Result<Json<Order>> {
    let Path(id) = id?;
    let Json(change) = change?;
    let order = state.board().advance(id, change.status).await?;
    Ok(Json(order))
}

#[derive(Debug, Serialize)]
struct MenuCategory {
    name: String,
    products: Vec<Product>,
}

async fn menu(State(state): State<AppState>) -> Result<Json<Vec<MenuCategory>>> {
    let products = state.backend().menu().await?;
    let categories = Product::by_category(&products)
        .into_iter()
        .map(|(name, items)| MenuCategory {
            name,
            products: items.into_iter().cloned().collect(),
        })
        .collect();
    Ok(Json(categories))
}

async fn delivery_zones(State(state): State<AppState>) -> Result<Json<Vec<DeliveryZone>>> {
    Ok(Json(state.backend().delivery_zones().await?))
}
