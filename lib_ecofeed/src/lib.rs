//! # lib_ecofeed
//!
//! Shared library behind the EcoVerse dashboard tooling. The centre of the crate
//! is [`TelemetryFeedClient`], a single logical subscription to the backend
//! telemetry stream that hides reconnects, stale connections and polling
//! fallback from the view layer.
//!
//! ## Layout:
//! - **`telemetry`**: typed events and the inbound wire decoder.
//! - **`core`**: dispatcher, backoff policy, sequencer, state and counters.
//! - **`ingestors`**: WebSocket and HTTP poll transports behind two small traits.
//! - **`retrieve`**: retrying HTTP client and the dashboard REST endpoints.
//! - **`client`**: the public feed client, its config and its session task.
//! - **`configs`** / **`loggers`**: feature-gated ambient setup.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod client;
pub mod core;
pub mod errors;
pub mod ingestors;
pub mod retrieve;
pub mod telemetry;

#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "loggers")]
pub mod loggers;

// Re-export the handful of types every consumer touches.
pub use crate::client::{FeedConfig, TelemetryFeedClient};
pub use crate::core::{ConnectionState, EventFilter, FeedStats, SubscriptionHandle};
pub use crate::errors::{ConfigError, FeedError, ProtocolError, TransportError};
pub use crate::telemetry::{EventKind, EventPayload, EventSource, FeedEvent, Severity, TelemetryEvent};
