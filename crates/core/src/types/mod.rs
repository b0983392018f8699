//! Core types for Forno.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod order;
pub mod phone;
pub mod price;
pub mod product;
pub mod status;
pub mod zone;

pub use cart::{Cart, CartError, Customization, LineItem, PizzaSize};
pub use email::{Email, EmailError, validate_email};
pub use id::*;
pub use order::{Order, OrderItem, OrderTotals};
pub use phone::{Phone, PhoneError, validate_phone};
pub use price::{Price, PriceError, format_currency};
pub use product::Product;
pub use status::*;
pub use zone::DeliveryZone;
