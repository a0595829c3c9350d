//! # Feed Configuration
//!
//! The options accepted by `TelemetryFeedClient::connect`, in the camelCase
//! shape the dashboard passes them. Validation happens entirely up front so a
//! bad config is reported synchronously and never reaches the network.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::backoff::ReconnectPolicy;
use crate::errors::ConfigError;

/// Connection options for one feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedConfig {
    /// Initial reconnect backoff.
    pub reconnect_base_delay_ms: u64,
    /// Backoff ceiling.
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before giving up. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Expected heartbeat period. Silence for twice this long is stale.
    pub heartbeat_interval_ms: u64,
    /// Poll period in degraded mode. `None` disables the fallback.
    pub poll_fallback_interval_ms: Option<u64>,
    /// http(s) URL polled in degraded mode.
    pub poll_endpoint: Option<String>,
    /// Backoff jitter spread, `0.0..=1.0`.
    pub jitter_ratio: f64,
    /// Bound on one connect/handshake attempt.
    pub connect_timeout_ms: u64,
    /// Frames larger than this are dropped as malformed.
    pub max_message_bytes: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: Some(10),
            heartbeat_interval_ms: 15_000,
            poll_fallback_interval_ms: None,
            poll_endpoint: None,
            jitter_ratio: 0.2,
            connect_timeout_ms: 10_000,
            max_message_bytes: 1024 * 1024,
        }
    }
}

/// A validated config bound to its endpoint, ready for the session.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPlan {
    /// Streaming endpoint (ws or wss).
    pub endpoint: Url,
    /// Backoff and retry budget.
    pub policy: ReconnectPolicy,
    /// Silence after which the connection is presumed stale.
    pub stale_after: Duration,
    /// Bound on one connect attempt.
    pub connect_timeout: Duration,
    /// Inbound frame size limit.
    pub max_message_bytes: usize,
    /// Degraded-mode polling, when configured.
    pub fallback: Option<PollFallback>,
}

/// Degraded-mode polling target.
#[derive(Debug, Clone, PartialEq)]
pub struct PollFallback {
    /// URL returning a JSON array of wire messages.
    pub endpoint: Url,
    /// Delay between poll cycles.
    pub interval: Duration,
}

impl FeedConfig {
    /// Checks every option and binds the config to `endpoint`.
    pub fn resolve(&self, endpoint: &str) -> Result<FeedPlan, ConfigError> {
        let endpoint = parse_stream_endpoint(endpoint)?;

        if self.reconnect_base_delay_ms == 0 {
            return Err(ConfigError::ZeroBaseDelay);
        }
        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(ConfigError::InvalidBackoffRange {
                base: self.reconnect_base_delay_ms,
                max: self.reconnect_max_delay_ms,
            });
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidHeartbeat);
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ConfigError::InvalidJitter(self.jitter_ratio));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConnectTimeout);
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::InvalidMessageLimit);
        }

        let fallback = match self.poll_fallback_interval_ms {
            None => None,
            Some(0) => return Err(ConfigError::InvalidPollInterval),
            Some(interval_ms) => {
                let raw = self.poll_endpoint.as_deref().ok_or(ConfigError::MissingPollEndpoint)?;
                Some(PollFallback {
                    endpoint: parse_poll_endpoint(raw)?,
                    interval: Duration::from_millis(interval_ms),
                })
            }
        };

        Ok(FeedPlan {
            endpoint,
            policy: ReconnectPolicy::new(
                Duration::from_millis(self.reconnect_base_delay_ms),
                Duration::from_millis(self.reconnect_max_delay_ms),
                self.max_reconnect_attempts,
                self.jitter_ratio,
            ),
            stale_after: Duration::from_millis(self.heartbeat_interval_ms.saturating_mul(2)),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            max_message_bytes: self.max_message_bytes,
            fallback,
        })
    }
}

fn parse_stream_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

fn parse_poll_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidPollEndpoint {
        endpoint: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidPollEndpoint {
            endpoint: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}
