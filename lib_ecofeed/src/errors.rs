//! # Error Taxonomy
//!
//! Every failure the feed can observe falls into one of these enums. Only
//! [`ConfigError`] (wrapped in [`FeedError`]) ever reaches a caller; transport
//! and protocol errors are absorbed by the session and surface through
//! `ConnectionState` and the counters instead.

use std::time::Duration;

use thiserror::Error;

/// Rejected endpoint or configuration, reported synchronously by `connect()`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// The stream endpoint is not a parseable URL.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The rejected input.
        endpoint: String,
        /// Parser message.
        reason: String,
    },

    /// The endpoint scheme is not `ws` or `wss`.
    #[error("Unsupported endpoint scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),

    /// `reconnectBaseDelayMs` is zero.
    #[error("reconnectBaseDelayMs must be greater than zero")]
    ZeroBaseDelay,

    /// `reconnectMaxDelayMs` is below `reconnectBaseDelayMs`.
    #[error("reconnectMaxDelayMs ({max}) is lower than reconnectBaseDelayMs ({base})")]
    InvalidBackoffRange {
        /// Configured base delay in milliseconds.
        base: u64,
        /// Configured maximum delay in milliseconds.
        max: u64,
    },

    /// `heartbeatIntervalMs` is zero.
    #[error("heartbeatIntervalMs must be greater than zero")]
    InvalidHeartbeat,

    /// `jitterRatio` is outside `0.0..=1.0` or not a number.
    #[error("jitterRatio must be within 0.0..=1.0, got {0}")]
    InvalidJitter(f64),

    /// `pollFallbackIntervalMs` is zero.
    #[error("pollFallbackIntervalMs must be greater than zero")]
    InvalidPollInterval,

    /// Polling is enabled without a poll endpoint.
    #[error("pollFallbackIntervalMs is set but pollEndpoint is missing")]
    MissingPollEndpoint,

    /// The poll endpoint is not an http(s) URL.
    #[error("Invalid poll endpoint '{endpoint}': {reason}")]
    InvalidPollEndpoint {
        /// The rejected input.
        endpoint: String,
        /// What is wrong with it.
        reason: String,
    },

    /// `connectTimeoutMs` is zero.
    #[error("connectTimeoutMs must be greater than zero")]
    InvalidConnectTimeout,

    /// `maxMessageBytes` is zero.
    #[error("maxMessageBytes must be greater than zero")]
    InvalidMessageLimit,
}

/// Network-level failure. Always triggers the reconnect (or poll retry) path.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// Dial or handshake failure.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The dial did not finish within `connectTimeoutMs`.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Read error on an established connection.
    #[error("Connection reset: {0}")]
    Reset(String),

    /// The remote host closed the stream, with the close code when one was sent.
    #[error("Connection closed by remote host (code {0:?})")]
    Closed(Option<u16>),

    /// Nothing arrived within two heartbeat intervals.
    #[error("No message within the liveness window")]
    Stale,

    /// A poll request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// A poll response carried a non-success status.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),
}

/// A single inbound message that could not be turned into a telemetry event.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Not valid JSON.
    #[error("Unparseable payload: {0}")]
    Unparseable(String),

    /// A required field is absent.
    #[error("Missing field '{0}'")]
    MissingField(String),

    /// Valid JSON with fields of the wrong shape.
    #[error("Invalid message: {0}")]
    InvalidField(String),

    /// A `type` tag this client does not understand.
    #[error("Unknown message type '{0}'")]
    UnknownType(String),

    /// The frame is larger than `maxMessageBytes`.
    #[error("Frame of {len} bytes exceeds the {limit} byte limit")]
    Oversized {
        /// Frame size in bytes.
        len: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// A binary frame.
    #[error("Binary frames are not part of the telemetry protocol")]
    NonText,
}

/// Error returned by `TelemetryFeedClient::connect`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeedError {
    /// Rejected configuration; no connection was attempted.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The session task has exited.
    #[error("The feed session task is no longer running")]
    SessionGone,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_feed_error() {
        let err: FeedError = ConfigError::ZeroBaseDelay.into();
        assert_eq!(err, FeedError::Config(ConfigError::ZeroBaseDelay));
        assert!(err.to_string().contains("reconnectBaseDelayMs"));
    }

    #[test]
    fn oversized_message_mentions_both_sizes() {
        let err = ProtocolError::Oversized { len: 2048, limit: 1024 };
        assert_eq!(err.to_string(), "Frame of 2048 bytes exceeds the 1024 byte limit");
    }
}
