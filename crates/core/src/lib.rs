//! Forno Core - Shared domain types.
//!
//! This crate provides the types used across all Forno components:
//! - `forno-realtime` - Change-notification client for the hosted database
//! - `forno-attendant` - Attendant order board service
//! - `forno-cli` - Operator tooling
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, prices, emails, phones, statuses,
//!   carts and orders
//! - [`access`] - Route access policy by profile role

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod access;
pub mod types;

pub use access::{Access, authorize};
pub use types::*;
