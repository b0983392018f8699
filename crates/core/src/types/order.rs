//! Orders as stored in the `orders` and `order_items` tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cart::{Cart, Customization, PizzaSize};
use super::id::{OrderId, OrderItemId, ProductId, ProfileId};
use super::price::Price;
use super::status::{OrderStatus, PaymentMethod, PaymentStatus};

/// One `order_items` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    #[serde(default)]
    pub size: Option<PizzaSize>,
    pub quantity: u32,
    pub unit_price: Price,
    #[serde(default)]
    pub customizations: Vec<Customization>,
    pub total_price: Price,
}

impl OrderItem {
    /// What `total_price` should be for this row.
    #[must_use]
    pub fn expected_total(&self) -> Price {
        let unit = self.unit_price + self.customizations.iter().map(|c| c.price).sum::<Price>();
        unit * self.quantity
    }
}

/// Monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Price,
    pub delivery_fee: Price,
    pub total: Price,
}

impl OrderTotals {
    /// Totals for a cart about to be checked out.
    #[must_use]
    pub fn for_cart(cart: &Cart, delivery_fee: Price) -> Self {
        let subtotal = cart.subtotal();
        Self {
            subtotal,
            delivery_fee,
            total: subtotal + delivery_fee,
        }
    }
}

/// One `orders` row, optionally with its embedded items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub user_id: Option<ProfileId>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub subtotal: Price,
    pub delivery_fee: Price,
    pub total: Price,
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
}

impl Order {
    /// Whether the stored totals agree with each other and with the items.
    ///
    /// `total` must equal `subtotal + delivery_fee`; when items are embedded,
    /// `subtotal` must equal the sum of their totals.
    #[must_use]
    pub fn totals_consistent(&self) -> bool {
        if self.subtotal + self.delivery_fee != self.total {
            return false;
        }
        if self.order_items.is_empty() {
            return true;
        }
        let items: Price = self.order_items.iter().map(|item| item.total_price).sum();
        items == self.subtotal
            && self
                .order_items
                .iter()
                .all(|item| item.total_price == item.expected_total())
    }

    /// Whether the order still shows on the attendant board.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Whether the attendant must collect payment at the door.
    #[must_use]
    pub const fn collect_on_delivery(&self) -> bool {
        !self.payment_method.uses_gateway() && !self.payment_status.is_settled()
    }

    /// Number of units across all embedded items.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.order_items.iter().map(|item| item.quantity).sum()
    }
}
