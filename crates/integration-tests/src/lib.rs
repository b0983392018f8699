//! Cross-crate tests for Forno.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p forno-integration-tests
//! ```
//!
//! Nothing here needs a network or a database. The attendant runs against
//! [`MemoryBackend`] and subscriptions against [`ScriptedTransport`].
//!
//! # Test Categories
//!
//! - `order_board` - refresh coalescing, status changes, load failures
//! - `attendant_routes` - the HTTP API through `tower::ServiceExt::oneshot`
//! - `realtime_board` - change bursts flowing from a channel to the board
//! - `domain_rules` - prices, validation, workflow and access policy

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use forno_attendant::Backend;
use forno_attendant::rest::RestError;
use forno_core::{
    DeliveryZone, DeliveryZoneId, Order, OrderId, OrderStatus, PaymentMethod, PaymentStatus,
    Price, Product, ProductId,
};
use forno_realtime::{
    ChangeKind, ChangePayload, ChannelEvent, ChannelLink, ChannelSpec, RealtimeError,
    RealtimeTransport,
};
use tokio::sync::{Semaphore, mpsc};

// ============================================================================
// Backend
// ============================================================================

/// A canned backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// 503 from the API: worth retrying.
    Unavailable,
    /// 400 from the API: retrying will not help.
    Rejected,
}

impl Failure {
    fn to_error(self) -> RestError {
        match self {
            Self::Unavailable => RestError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            },
            Self::Rejected => RestError::Status {
                status: 400,
                body: "bad filter".to_string(),
            },
        }
    }
}

#[derive(Default)]
struct Store {
    orders: Vec<Order>,
    products: Vec<Product>,
    zones: Vec<DeliveryZone>,
    failures: VecDeque<Failure>,
    order_loads: usize,
    updates: Vec<(OrderId, OrderStatus)>,
    after_read: Option<(OrderId, Option<OrderStatus>)>,
}

/// In-memory stand-in for the REST API.
#[derive(Default)]
pub struct MemoryBackend {
    store: Mutex<Store>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_orders(orders: Vec<Order>) -> Self {
        let backend = Self::new();
        backend.store().orders = orders;
        backend
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, order: Order) {
        self.store().orders.push(order);
    }

    pub fn set_menu(&self, products: Vec<Product>) {
        self.store().products = products;
    }

    pub fn set_zones(&self, zones: Vec<DeliveryZone>) {
        self.store().zones = zones;
    }

    /// Change an order behind the board's back, as another client would.
    pub fn set_status(&self, id: OrderId, status: OrderStatus) {
        if let Some(order) = self.store().orders.iter_mut().find(|o| o.id == id) {
            order.status = status;
        }
    }

    /// Right after the next single-order read, move that order to `status`
    /// as another client would. The reader sees the old status.
    pub fn move_after_read(&self, id: OrderId, status: OrderStatus) {
        self.store().after_read = Some((id, Some(status)));
    }

    /// Right after the next single-order read, delete that order.
    pub fn delete_after_read(&self, id: OrderId) {
        self.store().after_read = Some((id, None));
    }

    /// Make the next `times` order loads fail.
    pub fn fail_loads(&self, failure: Failure, times: usize) {
        self.store().failures.extend(std::iter::repeat_n(failure, times));
    }

    /// Block order loads until [`Self::release_loads`].
    pub fn hold_loads(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_loads(&self) {
        if let Some(gate) = self.gate.lock().unwrap_or_else(PoisonError::into_inner).take() {
            gate.close();
        }
    }

    /// Number of `active_orders` calls that reached the store.
    #[must_use]
    pub fn order_loads(&self) -> usize {
        self.store().order_loads
    }

    /// Every status update, in order.
    #[must_use]
    pub fn updates(&self) -> Vec<(OrderId, OrderStatus)> {
        self.store().updates.clone()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn active_orders(&self) -> Result<Vec<Order>, RestError> {
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate {
            // Closed on release; the error is the wake-up.
            let _ = gate.acquire().await;
        }

        let mut store = self.store();
        store.order_loads += 1;
        if let Some(failure) = store.failures.pop_front() {
            return Err(failure.to_error());
        }
        let mut open: Vec<Order> = store.orders.iter().filter(|o| o.is_open()).cloned().collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(open)
    }

    async fn order(&self, id: OrderId) -> Result<Order, RestError> {
        let mut store = self.store();
        let found = store
            .orders
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or_else(|| RestError::NotFound(format!("order {id}")));

        if let Some((target, change)) = store.after_read.take_if(|(target, _)| *target == id) {
            match change {
                Some(status) => {
                    if let Some(order) = store.orders.iter_mut().find(|o| o.id == target) {
                        order.status = status;
                    }
                }
                None => store.orders.retain(|o| o.id != target),
            }
        }
        found
    }

    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RestError> {
        let mut store = self.store();
        let Some(order) = store
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.status == from)
        else {
            return Ok(None);
        };
        order.status = to;
        order.updated_at = Some(Utc::now());
        let updated = order.clone();
        store.updates.push((id, to));
        Ok(Some(updated))
    }

    async fn menu(&self) -> Result<Vec<Product>, RestError> {
        Ok(self.store().products.clone())
    }

    async fn delivery_zones(&self) -> Result<Vec<DeliveryZone>, RestError> {
        Ok(self
            .store()
            .zones
            .iter()
            .filter(|z| z.active)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Realtime
// ============================================================================

#[derive(Default)]
struct Channels {
    specs: Vec<ChannelSpec>,
    live: Option<mpsc::Sender<ChannelEvent>>,
}

/// A transport whose channels are driven by the test.
///
/// Every `open` succeeds. With auto-ack the channel reports `Subscribed`
/// straight away.
pub struct ScriptedTransport {
    auto_ack: bool,
    channels: Mutex<Channels>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new(auto_ack: bool) -> Self {
        Self {
            auto_ack,
            channels: Mutex::default(),
            releases: Arc::default(),
        }
    }

    fn channels(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push an event into the most recently opened channel. Returns false
    /// if that channel has been released.
    pub async fn emit(&self, event: ChannelEvent) -> bool {
        let sender = self.channels().live.clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.channels().specs.len()
    }

    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Spec of the latest `open`.
    #[must_use]
    pub fn last_spec(&self) -> Option<ChannelSpec> {
        self.channels().specs.last().cloned()
    }
}

#[async_trait]
impl RealtimeTransport for ScriptedTransport {
    async fn open(&self, spec: &ChannelSpec) -> Result<ChannelLink, RealtimeError> {
        let (tx, rx) = mpsc::channel(64);
        if self.auto_ack {
            let _ = tx.try_send(ChannelEvent::Subscribed);
        }
        {
            let mut channels = self.channels();
            channels.specs.push(spec.clone());
            channels.live = Some(tx);
        }
        let releases = Arc::clone(&self.releases);
        Ok(ChannelLink::new(rx, move || {
            releases.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// An `UPDATE` on `table` for the row `id`.
#[must_use]
pub fn change(table: &str, id: &str) -> ChannelEvent {
    ChannelEvent::Change(ChangePayload {
        schema: "public".to_string(),
        table: table.to_string(),
        kind: ChangeKind::Update,
        commit_timestamp: Some(Utc::now()),
        record: serde_json::json!({ "id": id }),
        old_record: serde_json::Value::Null,
    })
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A cash order for R$ 50,90 placed `minutes_ago`.
#[must_use]
pub fn order(status: OrderStatus, minutes_ago: i64) -> Order {
    Order {
        id: OrderId::random(),
        user_id: None,
        status,
        payment_status: PaymentStatus::Pending,
        payment_method: PaymentMethod::Cash,
        subtotal: Price::from_centavos(4590),
        delivery_fee: Price::from_centavos(500),
        total: Price::from_centavos(5090),
        customer_name: "Maria Souza".to_string(),
        customer_phone: Some("11987654321".to_string()),
        delivery_address: Some("Rua das Flores, 120".to_string()),
        notes: None,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
        updated_at: None,
        order_items: Vec::new(),
    }
}

#[must_use]
pub fn product(name: &str, category: Option<&str>, centavos: i64) -> Product {
    Product {
        id: ProductId::random(),
        name: name.to_string(),
        description: None,
        category: category.map(str::to_string),
        price: Price::from_centavos(centavos),
        image_url: None,
        available: true,
    }
}

#[must_use]
pub fn zone(name: &str, fee_centavos: i64, active: bool) -> DeliveryZone {
    DeliveryZone {
        id: DeliveryZoneId::random(),
        name: name.to_string(),
        neighborhoods: vec![name.to_string()],
        fee: Price::from_centavos(fee_centavos),
        min_order: Price::ZERO,
        active,
    }
}
