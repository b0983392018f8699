//! Shopping cart with derived totals.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// Errors from cart mutations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// Items must be added with a quantity of at least one.
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    /// A single line cannot exceed [`Cart::MAX_LINE_QUANTITY`].
    #[error("quantity cannot exceed {max} per item")]
    QuantityTooLarge {
        /// Maximum allowed quantity.
        max: u32,
    },
    /// No line at the given position.
    #[error("no cart line at position {0}")]
    UnknownLine(usize),
}

/// Pizza size, when the product has sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PizzaSize {
    Small,
    Medium,
    Large,
    Family,
}

/// A price-affecting extra (stuffed crust, extra cheese...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Customization {
    /// Name shown on the ticket.
    pub name: String,
    /// Added to the unit price.
    pub price: Price,
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub size: Option<PizzaSize>,
    pub quantity: u32,
    /// Base price of one unit, before customizations.
    pub unit_price: Price,
    #[serde(default)]
    pub customizations: Vec<Customization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LineItem {
    /// Price of one unit including customizations.
    #[must_use]
    pub fn unit_total(&self) -> Price {
        self.unit_price + self.customizations.iter().map(|c| c.price).sum::<Price>()
    }

    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_total() * self.quantity
    }

    /// Two lines describe the same thing when product, size, extras and
    /// notes match, regardless of extra ordering.
    fn same_item(&self, other: &Self) -> bool {
        if self.product_id != other.product_id
            || self.size != other.size
            || self.notes != other.notes
            || self.customizations.len() != other.customizations.len()
        {
            return false;
        }
        let mut a: Vec<&Customization> = self.customizations.iter().collect();
        let mut b: Vec<&Customization> = other.customizations.iter().collect();
        a.sort();
        b.sort();
        a == b
    }
}

/// The customer's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<LineItem>,
}

impl Cart {
    /// Upper bound for a single line's quantity.
    pub const MAX_LINE_QUANTITY: u32 = 99;

    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Add an item, merging it into an identical existing line.
    ///
    /// Returns the position of the line that now holds the item.
    ///
    /// # Errors
    ///
    /// Fails if the quantity is zero or the merged quantity would exceed
    /// [`Self::MAX_LINE_QUANTITY`].
    pub fn add(&mut self, item: LineItem) -> Result<usize, CartError> {
        if item.quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }
        check_quantity(item.quantity)?;
        if let Some(position) = self.lines.iter().position(|line| line.same_item(&item)) {
            let merged = self
                .lines
                .get(position)
                .map_or(0, |line| line.quantity)
                .checked_add(item.quantity)
                .ok_or(CartError::QuantityTooLarge {
                    max: Self::MAX_LINE_QUANTITY,
                })?;
            self.set_quantity(position, merged)?;
            return Ok(position);
        }
        self.lines.push(item);
        Ok(self.lines.len() - 1)
    }

    /// Change a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Fails for an unknown position or a quantity above the limit.
    pub fn set_quantity(&mut self, position: usize, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove(position).map(|_| ());
        }
        check_quantity(quantity)?;
        let line = self
            .lines
            .get_mut(position)
            .ok_or(CartError::UnknownLine(position))?;
        line.quantity = quantity;
        Ok(())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Fails for an unknown position.
    pub fn remove(&mut self, position: usize) -> Result<LineItem, CartError> {
        if position >= self.lines.len() {
            return Err(CartError::UnknownLine(position));
        }
        Ok(self.lines.remove(position))
    }

    /// Empty the cart (after checkout).
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    #[must_use]
    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of units across all lines (the badge on the cart icon).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Sum of line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.lines.iter().map(LineItem::line_total).sum()
    }

    /// Subtotal plus the delivery fee.
    #[must_use]
    pub fn total(&self, delivery_fee: Price) -> Price {
        self.subtotal() + delivery_fee
    }
}

const fn check_quantity(quantity: u32) -> Result<(), CartError> {
    if quantity > Cart::MAX_LINE_QUANTITY {
        return Err(CartError::QuantityTooLarge {
            max: Cart::MAX_LINE_QUANTITY,
        });
    }
    Ok(())
}
