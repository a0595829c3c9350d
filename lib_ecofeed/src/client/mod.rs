//! # Telemetry Feed Client
//!
//! The public face of the feed. A `TelemetryFeedClient` is a cheap, cloneable
//! handle to one background session task (see `session`). Every method either
//! sends that task a message or reads shared state, so they are all safe to
//! call from inside a subscriber callback.
//!
//! ```no_run
//! use lib_ecofeed::{EventFilter, EventKind, FeedConfig, TelemetryFeedClient};
//!
//! # async fn demo() -> Result<(), lib_ecofeed::FeedError> {
//! let client = TelemetryFeedClient::new();
//! let alerts = client.subscribe(EventFilter::only(EventKind::Alert), |ev| {
//!     println!("alert #{}: {:?}", ev.event.sequence_id, ev.event.payload);
//! });
//! client.connect("ws://localhost:8000/ws", &FeedConfig::default()).await?;
//! // ...
//! client.unsubscribe(alerts);
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::core::{ConnectionState, EventFilter, FeedCounters, FeedStats, SubscriptionHandle};
use crate::errors::FeedError;
use crate::ingestors::{HttpPollSource, PollSource, StreamConnector, WsConnector};
use crate::telemetry::FeedEvent;

/// Connect options and their validation.
pub mod feed_config;
/// The background task behind every client handle.
mod session;

pub use feed_config::{FeedConfig, FeedPlan, PollFallback};

use session::{Control, RegistryOp, Session};

struct ClientInner {
    control_tx: mpsc::UnboundedSender<Control>,
    registry_tx: mpsc::UnboundedSender<RegistryOp>,
    state_rx: watch::Receiver<ConnectionState>,
    counters: Arc<FeedCounters>,
    next_id: AtomicU64,
}

/// Handle to a resilient telemetry feed.
///
/// Clones share the same session. The session stops once every clone is
/// dropped; callbacks that capture a clone keep it alive until `close()`
/// releases them.
#[derive(Clone)]
pub struct TelemetryFeedClient {
    inner: Arc<ClientInner>,
}

impl TelemetryFeedClient {
    /// Creates a client using the WebSocket connector and the HTTP poller.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime, since the session task is
    /// spawned immediately.
    pub fn new() -> Self {
        Self::with_transports(Arc::new(WsConnector::new()), Arc::new(HttpPollSource::default()))
    }

    /// Creates a client over custom transports.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn with_transports(connector: Arc<dyn StreamConnector>, poller: Arc<dyn PollSource>) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (registry_tx, registry_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let counters = Arc::new(FeedCounters::new());

        let session = Session::new(
            connector,
            poller,
            control_rx,
            registry_rx,
            state_tx,
            Arc::clone(&counters),
        );
        tokio::spawn(session.run());

        Self {
            inner: Arc::new(ClientInner {
                control_tx,
                registry_tx,
                state_rx,
                counters,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Starts streaming from `endpoint` (ws or wss).
    ///
    /// The config is validated before anything is sent to the session, so a
    /// bad endpoint or option comes back as `FeedError::Config` and no
    /// connection is attempted. While the feed is already connecting,
    /// connected or reconnecting this is a no-op that returns the current
    /// state; from `Disconnected`, `Failed` or `DegradedPolling` it starts a
    /// fresh connection cycle.
    pub async fn connect(&self, endpoint: &str, config: &FeedConfig) -> Result<ConnectionState, FeedError> {
        let plan = config.resolve(endpoint)?;
        let (reply, ack) = oneshot::channel();
        self.inner
            .control_tx
            .send(Control::Connect { plan, reply })
            .map_err(|_| FeedError::SessionGone)?;
        ack.await.map_err(|_| FeedError::SessionGone)
    }

    /// Registers `callback` for every event passing `filter`.
    ///
    /// Events are delivered one at a time in wire order. When called from
    /// inside a callback the subscription starts with the next event.
    pub fn subscribe<F>(&self, filter: EventFilter, callback: F) -> SubscriptionHandle
    where
        F: FnMut(&FeedEvent) + Send + 'static,
    {
        let handle = SubscriptionHandle::from_raw(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let op = RegistryOp::Subscribe {
            handle,
            filter,
            callback: Box::new(callback),
        };
        if self.inner.registry_tx.send(op).is_err() {
            tracing::warn!("subscribe() on a stopped feed session; callback dropped.");
        }
        handle
    }

    /// Removes a subscription. Unknown or already-removed handles are ignored.
    /// When called from inside a callback, it takes effect after the current
    /// event has been dispatched to every subscriber.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let _ = self.inner.registry_tx.send(RegistryOp::Unsubscribe(handle));
    }

    /// Current connection state. Never blocks.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Snapshot of the feed counters.
    pub fn stats(&self) -> FeedStats {
        self.inner.counters.snapshot()
    }

    /// Tears the feed down: drops the transport or poller, cancels any pending
    /// reconnect, and releases every subscription. Resolves once the session
    /// has done all of that; no callback runs afterwards.
    pub async fn close(&self) {
        let (reply, ack) = oneshot::channel();
        if self.inner.control_tx.send(Control::Close { reply }).is_err() {
            return;
        }
        let _ = ack.await;
    }
}

impl Default for TelemetryFeedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TelemetryFeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryFeedClient")
            .field("state", &self.state())
            .finish()
    }
}
