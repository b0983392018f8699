//! Attendant HTTP API, driven in-process with `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use forno_attendant::{AppState, Backend, HealthService, OrderBoard, RetryPolicy, app};
use forno_core::{Order, OrderStatus};
use forno_integration_tests::{Failure, MemoryBackend, order, product, zone};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    state: AppState,
    backend: Arc<MemoryBackend>,
}

impl TestApp {
    fn new(orders: Vec<Order>) -> Self {
        let backend = Arc::new(MemoryBackend::with_orders(orders));
        let health = HealthService::new();
        let dyn_backend: Arc<dyn Backend> = backend.clone();
        let board = OrderBoard::new(Arc::clone(&dyn_backend), health.clone(), RetryPolicy::default());
        Self {
            state: AppState::new(board, dyn_backend, health),
            backend,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        app(self.state.clone()).oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn patch_status(&self, id: &str, body: &Value) -> Response {
        let request = Request::builder()
            .method(Method::PATCH)
            .uri(format!("/orders/{id}/status"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_liveness() {
    let app = TestApp::new(Vec::new());
    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_readiness_follows_component_health() {
    let app = TestApp::new(Vec::new());

    let response = app.get("/health/ready").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");

    let err = std::io::Error::other("connection refused");
    for _ in 0..3 {
        app.state.health().record_error("orders", &err);
    }

    let response = app.get("/health/ready").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["components"]["orders"]["consecutive_errors"], 3);
    assert_eq!(
        body["components"]["orders"]["last_error"],
        "connection refused"
    );
}

#[tokio::test]
async fn test_request_id_is_echoed_or_generated() {
    let app = TestApp::new(Vec::new());

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.headers()["x-request-id"], "abc-123");

    let response = app.get("/health").await;
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}

// ============================================================================
// Orders
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_orders_board() {
    let app = TestApp::new(vec![
        order(OrderStatus::Pending, 3),
        order(OrderStatus::OutForDelivery, 30),
        order(OrderStatus::Delivered, 60),
    ]);
    app.state.board().refresh().await.unwrap();

    let response = app.get("/orders").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["load"]["state"], "ok");
    let columns = body["columns"].as_array().unwrap();
    assert_eq!(columns.len(), 5);
    assert_eq!(columns[0]["status"], "pending");
    assert_eq!(columns[0]["count"], 1);
    assert_eq!(columns[4]["status"], "out_for_delivery");
    assert_eq!(columns[4]["orders"][0]["total"], "50.90");
}

#[tokio::test(start_paused = true)]
async fn test_orders_unavailable_offers_reload() {
    let app = TestApp::new(vec![order(OrderStatus::Pending, 3)]);
    app.backend.fail_loads(Failure::Rejected, 1);
    app.state.board().refresh().await.unwrap_err();

    let response = app.get("/orders").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = json_body(response).await;
    assert_eq!(body["reload"], true);
    assert_eq!(body["kind"], "permanent");
    // Backend details stay server-side
    assert!(!body.to_string().contains("bad filter"));
}

#[tokio::test(start_paused = true)]
async fn test_patch_status() {
    let pending = order(OrderStatus::Pending, 3);
    let app = TestApp::new(vec![pending.clone()]);

    let response = app
        .patch_status(&pending.id.to_string(), &json!({ "status": "confirmed" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "confirmed");
    assert_eq!(app.backend.updates(), vec![(pending.id, OrderStatus::Confirmed)]);
}

#[tokio::test(start_paused = true)]
async fn test_patch_status_rejects_illegal_move() {
    let pending = order(OrderStatus::Pending, 3);
    let app = TestApp::new(vec![pending.clone()]);

    let response = app
        .patch_status(&pending.id.to_string(), &json!({ "status": "ready" }))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(app.backend.updates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_patch_status_lost_race_is_conflict() {
    let pending = order(OrderStatus::Pending, 3);
    let app = TestApp::new(vec![pending.clone()]);
    app.backend.move_after_read(pending.id, OrderStatus::Cancelled);

    let response = app
        .patch_status(&pending.id.to_string(), &json!({ "status": "confirmed" }))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("is now cancelled"));
    assert!(app.backend.updates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_patch_status_bad_input() {
    let app = TestApp::new(Vec::new());

    let response = app
        .patch_status(&forno_core::OrderId::random().to_string(), &json!({ "status": "confirmed" }))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .patch_status("not-a-uuid", &json!({ "status": "confirmed" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("Bad request"));

    let response = app
        .patch_status(&forno_core::OrderId::random().to_string(), &json!({ "status": "eaten" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));

    let request = Request::builder()
        .method(Method::PATCH)
        .uri(format!("/orders/{}/status", forno_core::OrderId::random()))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"status\":"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
    assert!(app.backend.updates().is_empty());
}

// ============================================================================
// Menu and zones
// ============================================================================

#[tokio::test]
async fn test_menu_groups_available_products() {
    let app = TestApp::new(Vec::new());
    let mut sold_out = product("Guaraná", Some("Bebidas"), 800);
    sold_out.available = false;
    app.backend.set_menu(vec![
        product("Margherita", Some("Pizzas"), 4590),
        product("Brownie", None, 1500),
        sold_out,
        product("Calabresa", Some("Pizzas"), 4990),
    ]);

    let response = app.get("/menu").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let categories = body.as_array().unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0]["name"], "Pizzas");
    assert_eq!(categories[0]["products"][0]["name"], "Margherita");
    assert_eq!(categories[0]["products"][1]["name"], "Calabresa");
    assert_eq!(categories[1]["name"], "Outros");
}

#[tokio::test]
async fn test_delivery_zones_lists_active_only() {
    let app = TestApp::new(Vec::new());
    app.backend.set_zones(vec![
        zone("Centro", 500, true),
        zone("Distrito Industrial", 1500, false),
    ]);

    let response = app.get("/delivery-zones").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let zones = body.as_array().unwrap();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0]["name"], "Centro");
    assert_eq!(zones[0]["fee"], "5.00");
}
