//! # Feed Session
//!
//! The single task that owns everything mutable about a feed: the transport,
//! the poller, the subscriber registry, the sequencer and the published
//! `ConnectionState`. Public client methods only send it messages.
//!
//! ## Core Design Principles:
//!
//! 1.  **One dispatch sequence**: control commands, registry changes, inbound
//!     frames and every timer are multiplexed by one `tokio::select!` loop, so
//!     callbacks never overlap each other or a state transition.
//! 2.  **Explicit link phases**: the transport side is a small state machine
//!     ([`Link`]). Dropping the current phase cancels whatever it was waiting
//!     on (handshake, socket read, backoff timer, poll request), which is how
//!     `close()` and a fresh `connect()` cancel outstanding work.
//! 3.  **Cancellation-safe waits**: every branch of the loop either borrows a
//!     pinned future it keeps across iterations or is itself cancel-safe, so
//!     losing a `select!` race never loses progress or data.
//! 4.  **Backpressure by construction**: the next frame is read only after the
//!     previous one's callbacks have returned.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Instant, Sleep};

use crate::client::feed_config::{FeedPlan, PollFallback};
use crate::core::{
    Admission, Callback, ConnectionState, Dispatcher, EventFilter, FeedCounters, Sequencer,
    SubscriptionHandle,
};
use crate::errors::{ProtocolError, TransportError};
use crate::ingestors::transport::{Frame, FrameStream, PollSource, StreamConnector};
use crate::telemetry::{decode_frame, decode_value, EventSource, FeedEvent, Inbound, TelemetryEvent};

/// Lifecycle commands from the client.
pub(crate) enum Control {
    Connect {
        plan: FeedPlan,
        reply: oneshot::Sender<ConnectionState>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Subscriber registry changes. Applied between events, never mid-dispatch.
pub(crate) enum RegistryOp {
    Subscribe {
        handle: SubscriptionHandle,
        filter: EventFilter,
        callback: Callback,
    },
    Unsubscribe(SubscriptionHandle),
}

type DialFuture = BoxFuture<'static, Result<FrameStream, TransportError>>;
type PollFuture = BoxFuture<'static, Result<Vec<Value>, TransportError>>;

/// What the transport side is currently doing.
enum Link {
    /// Nothing scheduled.
    Idle,
    /// Connect/handshake in flight, already bounded by the connect timeout.
    Dialing(DialFuture),
    /// Live stream with a liveness deadline pushed back on every frame.
    Streaming {
        frames: FrameStream,
        stale_at: Pin<Box<Sleep>>,
    },
    /// Backoff timer before the next dial.
    Waiting(Pin<Box<Sleep>>),
    /// Degraded mode: either a poll request in flight or a timer until the next one.
    Polling {
        next_poll: Pin<Box<Sleep>>,
        inflight: Option<PollFuture>,
    },
}

/// Something the link produced.
enum Signal {
    Dialed(Result<FrameStream, TransportError>),
    Frame(Result<Frame, TransportError>),
    StreamEnded,
    Stale,
    RetryDue,
    PollDue,
    Polled(Result<Vec<Value>, TransportError>),
}

impl Link {
    /// Waits for the next signal of the current phase. Idle never resolves.
    async fn next_signal(&mut self) -> Signal {
        match self {
            Link::Idle => std::future::pending::<Signal>().await,
            Link::Dialing(dial) => Signal::Dialed(dial.await),
            Link::Streaming { frames, stale_at } => {
                tokio::select! {
                    biased;
                    frame = frames.next() => match frame {
                        Some(frame) => Signal::Frame(frame),
                        None => Signal::StreamEnded,
                    },
                    _ = stale_at.as_mut() => Signal::Stale,
                }
            }
            Link::Waiting(timer) => {
                timer.as_mut().await;
                Signal::RetryDue
            }
            Link::Polling { next_poll, inflight } => match inflight {
                Some(request) => Signal::Polled(request.await),
                None => {
                    next_poll.as_mut().await;
                    Signal::PollDue
                }
            },
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Link::Idle => "idle",
            Link::Dialing(_) => "dialing",
            Link::Streaming { .. } => "streaming",
            Link::Waiting(_) => "waiting",
            Link::Polling { .. } => "polling",
        }
    }
}

/// The feed's event loop. Created and spawned by `TelemetryFeedClient`.
pub(crate) struct Session {
    connector: Arc<dyn StreamConnector>,
    poller: Arc<dyn PollSource>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    registry_rx: mpsc::UnboundedReceiver<RegistryOp>,
    state_tx: watch::Sender<ConnectionState>,
    counters: Arc<FeedCounters>,
    dispatcher: Dispatcher,
    sequencer: Sequencer,
    plan: Option<FeedPlan>,
    link: Link,
    failures: u32,
}

impl Session {
    pub(crate) fn new(
        connector: Arc<dyn StreamConnector>,
        poller: Arc<dyn PollSource>,
        control_rx: mpsc::UnboundedReceiver<Control>,
        registry_rx: mpsc::UnboundedReceiver<RegistryOp>,
        state_tx: watch::Sender<ConnectionState>,
        counters: Arc<FeedCounters>,
    ) -> Self {
        Self {
            connector,
            poller,
            control_rx,
            registry_rx,
            state_tx,
            counters,
            dispatcher: Dispatcher::new(),
            sequencer: Sequencer::new(),
            plan: None,
            link: Link::Idle,
            failures: 0,
        }
    }

    /// Runs until every client handle has been dropped.
    pub(crate) async fn run(mut self) {
        tracing::debug!("Feed session started.");
        loop {
            tokio::select! {
                biased;
                command = self.control_rx.recv() => match command {
                    Some(command) => self.handle_control(command),
                    None => break,
                },
                op = self.registry_rx.recv() => match op {
                    Some(op) => self.apply_registry(op),
                    None => break,
                },
                signal = self.link.next_signal() => self.handle_signal(signal),
            }
        }
        tracing::debug!("Feed session stopped ({} link dropped).", self.link.name());
    }

    fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn transition(&mut self, next: ConnectionState) {
        let prev = self.current_state();
        if prev != next {
            tracing::info!("Transitioning state: {:?} -> {:?}", prev, next);
            self.state_tx.send_replace(next);
        }
    }

    // --- Control ---

    fn handle_control(&mut self, command: Control) {
        match command {
            Control::Connect { plan, reply } => {
                let current = self.current_state();
                if current.is_active_stream() {
                    tracing::debug!("connect() ignored: feed is already {}.", current);
                    let _ = reply.send(current);
                    return;
                }
                tracing::info!("Opening telemetry feed to {}", plan.endpoint);
                self.link = Link::Idle;
                self.failures = 0;
                self.plan = Some(plan);
                self.start_dial(ConnectionState::Connecting);
                let _ = reply.send(self.current_state());
            }
            Control::Close { reply } => {
                self.link = Link::Idle;
                self.plan = None;
                self.failures = 0;
                // Anything queued before close() is released along with the rest.
                while self.registry_rx.try_recv().is_ok() {}
                let released = self.dispatcher.clear();
                self.transition(ConnectionState::Disconnected);
                tracing::info!("Telemetry feed closed; released {} subscription(s).", released);
                let _ = reply.send(());
            }
        }
    }

    fn apply_registry(&mut self, op: RegistryOp) {
        match op {
            RegistryOp::Subscribe { handle, filter, callback } => {
                self.dispatcher.add_subscriber(handle, filter, callback);
            }
            RegistryOp::Unsubscribe(handle) => {
                if !self.dispatcher.remove_subscriber(handle) {
                    tracing::debug!("Unsubscribe for unknown subscription {}", handle.id());
                }
            }
        }
    }

    fn drain_registry(&mut self) {
        while let Ok(op) = self.registry_rx.try_recv() {
            self.apply_registry(op);
        }
    }

    // --- Link transitions ---

    fn start_dial(&mut self, state: ConnectionState) {
        let Some(plan) = self.plan.as_ref() else {
            return;
        };
        let connector = Arc::clone(&self.connector);
        let endpoint = plan.endpoint.clone();
        let timeout = plan.connect_timeout;

        self.counters.record_connect_attempt();
        let dial = async move {
            match tokio::time::timeout(timeout, connector.connect(&endpoint)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout)),
            }
        }
        .boxed();

        self.link = Link::Dialing(dial);
        self.transition(state);
    }

    fn on_connected(&mut self, frames: FrameStream) {
        let Some(stale_after) = self.plan.as_ref().map(|p| p.stale_after) else {
            return;
        };
        self.failures = 0;
        let epoch = self.sequencer.begin_epoch();
        self.counters.record_epoch();
        self.link = Link::Streaming {
            frames,
            stale_at: Box::pin(sleep(stale_after)),
        };
        tracing::info!("Telemetry stream established (epoch {}).", epoch);
        self.transition(ConnectionState::Connected);
    }

    fn on_transport_failure(&mut self, err: TransportError) {
        self.link = Link::Idle;
        let Some(plan) = self.plan.as_ref() else {
            return;
        };
        let policy = plan.policy.clone();
        let fallback = plan.fallback.clone();

        self.failures = self.failures.saturating_add(1);

        if policy.is_exhausted(self.failures) {
            match fallback {
                Some(fallback) => {
                    tracing::warn!(
                        "Streaming unavailable after {} consecutive failure(s) (last: {}). Polling {} every {:?}.",
                        self.failures,
                        err,
                        fallback.endpoint,
                        fallback.interval
                    );
                    self.enter_polling(&fallback);
                }
                None => {
                    tracing::error!(
                        "Reconnect budget exhausted after {} consecutive failure(s) (last: {}).",
                        self.failures,
                        err
                    );
                    self.transition(ConnectionState::Failed);
                }
            }
            return;
        }

        let attempt = self.failures - 1;
        let delay = policy.delay(attempt);
        self.counters.record_reconnect(delay.as_millis() as u64);
        tracing::warn!(
            "Transport failure: {}. Reconnecting in {}ms (retry {}).",
            err,
            delay.as_millis(),
            attempt + 1
        );
        self.link = Link::Waiting(Box::pin(sleep(delay)));
        self.transition(ConnectionState::Reconnecting);
    }

    fn enter_polling(&mut self, fallback: &PollFallback) {
        self.link = Link::Polling {
            next_poll: Box::pin(sleep(fallback.interval)),
            inflight: Some(self.poll_request(fallback)),
        };
        self.transition(ConnectionState::DegradedPolling);
    }

    fn poll_request(&self, fallback: &PollFallback) -> PollFuture {
        let poller = Arc::clone(&self.poller);
        let endpoint = fallback.endpoint.clone();
        async move { poller.poll(&endpoint).await }.boxed()
    }

    fn schedule_next_poll(&mut self) {
        let Some(interval) = self
            .plan
            .as_ref()
            .and_then(|p| p.fallback.as_ref())
            .map(|f| f.interval)
        else {
            return;
        };
        if let Link::Polling { next_poll, inflight } = &mut self.link {
            *inflight = None;
            next_poll.as_mut().reset(Instant::now() + interval);
        }
    }

    // --- Signals ---

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Dialed(Ok(frames)) => self.on_connected(frames),
            Signal::Dialed(Err(err)) => self.on_transport_failure(err),
            Signal::Frame(Ok(frame)) => {
                self.touch_liveness();
                self.handle_frame(frame);
            }
            Signal::Frame(Err(err)) => self.on_transport_failure(err),
            Signal::StreamEnded => self.on_transport_failure(TransportError::Closed(None)),
            Signal::Stale => {
                self.counters.record_stale_timeout();
                tracing::warn!("No message within the liveness window. Dropping the connection.");
                self.on_transport_failure(TransportError::Stale);
            }
            Signal::RetryDue => self.start_dial(ConnectionState::Reconnecting),
            Signal::PollDue => {
                let request = self
                    .plan
                    .as_ref()
                    .and_then(|p| p.fallback.as_ref())
                    .map(|f| self.poll_request(f));
                if let (Link::Polling { inflight, .. }, Some(request)) = (&mut self.link, request) {
                    *inflight = Some(request);
                }
            }
            Signal::Polled(Ok(items)) => {
                self.handle_poll_batch(items);
                self.schedule_next_poll();
            }
            Signal::Polled(Err(err)) => {
                self.counters.record_poll_failure();
                tracing::warn!("Poll cycle failed: {}. Retrying on the next interval.", err);
                self.schedule_next_poll();
            }
        }
    }

    fn touch_liveness(&mut self) {
        let Some(stale_after) = self.plan.as_ref().map(|p| p.stale_after) else {
            return;
        };
        if let Link::Streaming { stale_at, .. } = &mut self.link {
            stale_at.as_mut().reset(Instant::now() + stale_after);
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        let limit = self.plan.as_ref().map_or(usize::MAX, |p| p.max_message_bytes);
        match frame {
            Frame::Liveness => {}
            Frame::Binary(_) => self.record_protocol_error(ProtocolError::NonText),
            Frame::Text(text) => match decode_frame(&text, limit) {
                Ok(inbound) => self.handle_inbound(inbound, EventSource::Stream),
                Err(err) => self.record_protocol_error(err),
            },
        }
    }

    fn handle_poll_batch(&mut self, items: Vec<Value>) {
        self.counters.record_poll_cycle();
        let epoch = self.sequencer.begin_epoch();
        self.counters.record_epoch();
        tracing::debug!("Poll cycle returned {} item(s) (epoch {}).", items.len(), epoch);

        for item in items {
            match decode_value(item) {
                Ok(inbound) => self.handle_inbound(inbound, EventSource::Poll),
                Err(err) => self.record_protocol_error(err),
            }
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound, source: EventSource) {
        match inbound {
            Inbound::Heartbeat { .. } => self.counters.record_heartbeat(),
            Inbound::Event(event) => self.admit_and_dispatch(event, source),
        }
    }

    fn admit_and_dispatch(&mut self, event: TelemetryEvent, source: EventSource) {
        match self.sequencer.admit(event.sequence_id) {
            Admission::Accepted { starts_epoch } => {
                let feed_event = FeedEvent {
                    epoch: self.sequencer.epoch(),
                    source,
                    starts_epoch,
                    event,
                };
                self.counters.record_delivered();
                let report = self.dispatcher.broadcast(&feed_event);
                for _ in &report.removed {
                    self.counters.record_callback_panic();
                }
                // Subscribe/unsubscribe calls made by callbacks take effect now.
                self.drain_registry();
            }
            Admission::Duplicate => {
                self.counters.record_duplicate();
                tracing::debug!("Dropping duplicate sequenceId {}", event.sequence_id);
            }
            Admission::OutOfOrder => {
                self.counters.record_out_of_order();
                tracing::debug!("Dropping out-of-order sequenceId {}", event.sequence_id);
            }
        }
    }

    fn record_protocol_error(&self, err: ProtocolError) {
        match err {
            ProtocolError::UnknownType(_) => self.counters.record_unknown_type(),
            _ => self.counters.record_malformed(),
        }
        tracing::warn!("Dropping inbound message: {}", err);
    }
}
