//! Forno Realtime - debounced, self-healing change-notification subscriptions.
//!
//! A [`RealtimeSubscription`] watches a set of backend tables on one logical
//! channel and calls back with the most recent change once a burst of
//! notifications has gone quiet. Transport failures are retried with capped
//! exponential backoff; after the retry budget is spent the subscription
//! reports [`ConnectionState::Exhausted`] and waits for a manual reconnect.
//!
//! # Architecture
//!
//! - [`transport::RealtimeTransport`] - the seam to the backend. A transport
//!   opens a [`transport::ChannelLink`] that streams [`transport::ChannelEvent`]s.
//! - [`phoenix::PhoenixTransport`] - WebSocket transport speaking the Phoenix
//!   channel protocol used by Supabase Realtime.
//! - [`subscription`] - one tokio task per subscription owns the link, the
//!   debounce timer and the backoff timer; the [`SubscriptionHandle`] talks to
//!   it over a command channel and observes state through a `watch` channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use forno_realtime::{PhoenixTransport, RealtimeSubscription, SubscriptionOptions, TableWatch};
//!
//! let transport = Arc::new(PhoenixTransport::new(&endpoint, api_key, None)?);
//! let options = SubscriptionOptions::new("attendant-orders")
//!     .watch(TableWatch::new("orders"))
//!     .watch(TableWatch::new("order_items"));
//!
//! let handle = RealtimeSubscription::spawn(transport, options, |change| {
//!     tracing::info!(table = %change.table, "orders changed");
//! });
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backoff;
pub mod channel;
pub mod error;
pub mod phoenix;
pub mod state;
pub mod subscription;
pub mod transport;

pub use backoff::{Backoff, BackoffPolicy};
pub use channel::{ChangeFilter, ChangeKind, ChangePayload, ChannelSpec, RowFilter, TableWatch};
pub use error::{FilterError, RealtimeError};
pub use phoenix::PhoenixTransport;
pub use state::ConnectionState;
pub use subscription::{RealtimeSubscription, SubscriptionHandle, SubscriptionOptions, validate};
pub use transport::{ChannelEvent, ChannelLink, RealtimeTransport};
