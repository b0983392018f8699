//! Data the attendant service reads and writes.

use async_trait::async_trait;
use forno_core::{DeliveryZone, Order, OrderId, OrderStatus, Product};

use crate::rest::RestError;

/// The backend tables the attendant works with.
///
/// [`RestClient`](crate::rest::RestClient) is the production implementation.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Orders that are not delivered or cancelled, newest first, with items.
    async fn active_orders(&self) -> Result<Vec<Order>, RestError>;

    /// One order with its items.
    async fn order(&self, id: OrderId) -> Result<Order, RestError>;

    /// Move an order from `from` to `to` and return the updated row.
    ///
    /// The write only applies while the order is still in `from`. `Ok(None)`
    /// means no row matched: the order is gone or someone moved it first.
    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RestError>;

    /// Every menu product, available or not.
    async fn menu(&self) -> Result<Vec<Product>, RestError>;

    /// Active delivery zones.
    async fn delivery_zones(&self) -> Result<Vec<DeliveryZone>, RestError>;
}
