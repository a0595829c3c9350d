//! # Data Ingestors Module
//!
//! Transports that bring telemetry into the feed session. Each submodule
//! handles one protocol and hides it behind the traits in `transport`, so the
//! session's reconnect, liveness and fallback logic is protocol-agnostic.
//!
//! ## Contained Modules:
//! - **`transport`**: the `StreamConnector` / `PollSource` seams and the `Frame` type.
//! - **`telemetry_wss`**: WebSocket streaming via tokio-tungstenite.
//! - **`telemetry_polling`**: HTTP polling for degraded mode.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Transport traits and frame vocabulary.
pub mod transport;
/// The WebSocket connector for the live telemetry stream.
pub mod telemetry_wss;
/// The HTTP poll source used in degraded mode.
pub mod telemetry_polling;

// --- Public API Re-exports ---
pub use telemetry_polling::HttpPollSource;
pub use telemetry_wss::WsConnector;
pub use transport::{Frame, FrameStream, PollSource, StreamConnector};
