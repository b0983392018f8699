//! Delivery zones (`delivery_zones` table).

use serde::{Deserialize, Serialize};

use super::id::DeliveryZoneId;
use super::price::Price;

/// An area the pizzeria delivers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryZone {
    pub id: DeliveryZoneId,
    pub name: String,
    #[serde(default)]
    pub neighborhoods: Vec<String>,
    pub fee: Price,
    #[serde(default)]
    pub min_order: Price,
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl DeliveryZone {
    /// Whether the zone covers a neighborhood, ignoring case and
    /// surrounding whitespace.
    #[must_use]
    pub fn covers(&self, neighborhood: &str) -> bool {
        let wanted = neighborhood.trim().to_lowercase();
        self.active
            && self
                .neighborhoods
                .iter()
                .any(|n| n.trim().to_lowercase() == wanted)
    }

    /// Whether a cart subtotal reaches the zone's minimum order.
    #[must_use]
    pub fn accepts_subtotal(&self, subtotal: Price) -> bool {
        subtotal >= self.min_order
    }

    /// Find the active zone covering a neighborhood.
    #[must_use]
    pub fn find<'a>(zones: &'a [Self], neighborhood: &str) -> Option<&'a Self> {
        zones.iter().find(|zone| zone.covers(neighborhood))
    }
}
