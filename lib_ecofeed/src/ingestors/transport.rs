//! # Transport Seams
//!
//! The session never talks to sockets or HTTP directly. It dials through a
//! [`StreamConnector`] and polls through a [`PollSource`], so tests can
//! script connection failures, silence and poll batches under paused time.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use serde_json::Value;
use url::Url;

use crate::errors::TransportError;

/// One inbound unit from a streaming transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame, expected to hold one JSON message.
    Text(String),
    /// A binary frame. Not part of the protocol; counted as malformed.
    Binary(Vec<u8>),
    /// Transport-level keep-alive (ping/pong). Counts as activity only.
    Liveness,
}

/// Inbound frames of one live connection. The stream ends (or yields an
/// error) when the connection goes away.
pub type FrameStream = BoxStream<'static, Result<Frame, TransportError>>;

/// Opens streaming connections.
pub trait StreamConnector: Send + Sync {
    /// Performs the connect/handshake and returns the frame stream.
    fn connect<'a>(&'a self, endpoint: &'a Url) -> BoxFuture<'a, Result<FrameStream, TransportError>>;
}

/// Fetches one poll batch in degraded mode.
pub trait PollSource: Send + Sync {
    /// GETs `endpoint` and returns the JSON array items in response order.
    fn poll<'a>(&'a self, endpoint: &'a Url) -> BoxFuture<'a, Result<Vec<Value>, TransportError>>;
}
