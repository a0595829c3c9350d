//! Health of the feed as seen by the view layer.

use std::fmt;

/// Lifecycle states of a `TelemetryFeedClient`. Only the session task moves
/// between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and nothing scheduled. Initial state, and the state after `close()`.
    #[default]
    Disconnected,
    /// First connection attempt of a cycle is in flight.
    Connecting,
    /// Streaming transport is up and delivering.
    Connected,
    /// Transport failed; a retry is scheduled or in flight.
    Reconnecting,
    /// Streaming gave up; events come from periodic polling.
    DegradedPolling,
    /// Retry budget exhausted with no fallback. Only `connect()` leaves this state.
    Failed,
}

impl ConnectionState {
    /// True while a `connect()` call should be a no-op.
    pub fn is_active_stream(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }

    /// True when events can currently flow to subscribers.
    pub fn is_delivering(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::DegradedPolling)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::DegradedPolling => "degraded-polling",
            ConnectionState::Failed => "failed",
        };
        f.write_str(label)
    }
}
