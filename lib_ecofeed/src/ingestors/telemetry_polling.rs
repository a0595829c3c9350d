//! # Telemetry Poll Source
//!
//! HTTP transport used while the feed is in degraded mode. Each call is one
//! poll cycle: a `GET` that must return a JSON array of wire messages. The
//! session owns scheduling; this type only performs the request.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use url::Url;

use crate::errors::TransportError;
use crate::ingestors::transport::PollSource;
use crate::retrieve::ky_http::ApiClient;

/// Retries per poll request before the cycle counts as failed.
const POLL_MAX_RETRIES: u32 = 2;

/// Polls an http(s) endpoint through the retrying [`ApiClient`].
#[derive(Clone)]
pub struct HttpPollSource {
    client: ApiClient,
}

impl HttpPollSource {
    /// Creates a poll source with the given per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: ApiClient::new(None, POLL_MAX_RETRIES, timeout),
        }
    }

    /// Wraps a preconfigured client (auth token, retry budget).
    pub fn with_client(client: ApiClient) -> Self {
        Self { client }
    }
}

impl Default for HttpPollSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Accepts a bare array, or an object wrapping it under `events`.
fn batch_items(body: Value) -> Result<Vec<Value>, TransportError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("events") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(TransportError::Http("poll response is not a JSON array".to_string())),
        },
        _ => Err(TransportError::Http("poll response is not a JSON array".to_string())),
    }
}

impl PollSource for HttpPollSource {
    fn poll<'a>(&'a self, endpoint: &'a Url) -> BoxFuture<'a, Result<Vec<Value>, TransportError>> {
        async move {
            let response = self
                .client
                .get_json::<Value>(endpoint.clone())
                .await
                .map_err(|e| TransportError::Http(e.to_string()))?;

            if !response.success {
                return Err(TransportError::Status(response.status));
            }
            batch_items(response.data.unwrap_or(Value::Null))
        }
        .boxed()
    }
}
