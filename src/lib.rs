//! # resolink
//!
//! Client library for reactive query servers: open a query over HTTP, get
//! the server-issued observer id plus an initial snapshot, then receive
//! incremental change messages over a session-scoped WebSocket broadcast
//! channel. The client maintains an ordered item cache per subscription
//! and invokes the consumer's callback with the full list on every change.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use resolink::{EventHandlers, ResolinkClient};
//!
//! # async fn example() -> resolink::Result<()> {
//! let client = ResolinkClient::builder()
//!     .base_url("http://localhost:8000")
//!     .event_handlers(EventHandlers::new().on_error(|e| {
//!         if !e.recoverable {
//!             eprintln!("live updates gone: {}", e);
//!         }
//!     }))
//!     .build()?;
//!
//! client.start_broadcast()?;
//!
//! let tasks = client
//!     .open_reactive(
//!         "/tasks/open",
//!         Arc::new(|items| println!("{} open task(s)", items.len())),
//!     )
//!     .await?;
//! println!("initial snapshot: {} item(s)", tasks.items().len());
//!
//! tasks.dispose().await;
//! client.shutdown_broadcast().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Connection behavior
//!
//! A lost broadcast connection is retried a fixed number of times (default
//! three attempts, six seconds apart). Once the budget is spent, a
//! non-recoverable [`ConnectionError`] is reported and live updates stop;
//! HTTP requests keep working. See [`ConnectionOptions`] to tune this.

pub mod client;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod reactive;
pub mod registry;
pub mod transport;

pub use client::{ResolinkClient, ResolinkClientBuilder};
pub use diff::apply_change;
pub use dispatcher::Dispatcher;
pub use error::{ResolinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{
    ChangeKind, ChangeMessage, ConnectionOptions, CreateSubscriptionResult, ReactiveResponse,
};
pub use reactive::{
    HttpUnsubscriber, ObserverUnsubscriber, ReactiveHandle, SubscriptionLifecycle,
};
pub use registry::{ObserverRegistry, UpdateCallback};
pub use transport::{BroadcastClient, BroadcastConnector, ConnectionState, ReconnectPolicy};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
