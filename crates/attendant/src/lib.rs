//! Forno Attendant - live order board for the shop floor.
//!
//! Keeps the active orders in sync with the backend through a debounced
//! realtime subscription and serves them over HTTP on port 3002.
//!
//! # Architecture
//!
//! - [`rest::RestClient`] reads and writes the backend's PostgREST API
//! - [`board::OrderBoard`] holds the active orders and refreshes them on change
//! - [`loader::Loader`] retries transient load failures with an observable state
//! - [`health::HealthService`] tracks component health for `/health/ready`

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod board;
pub mod config;
pub mod error;
pub mod health;
pub mod loader;
pub mod middleware;
pub mod rest;
pub mod routes;
pub mod state;

pub use backend::Backend;
pub use board::{BoardError, BoardSnapshot, OrderBoard};
pub use health::{HealthService, HealthStatus};
pub use loader::{LoadError, LoadState, Loader, RetryPolicy};
pub use routes::app;
pub use state::AppState;
