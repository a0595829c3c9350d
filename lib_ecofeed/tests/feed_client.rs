//! End-to-end behaviour of `TelemetryFeedClient` over scripted transports.
//!
//! Every test runs with Tokio's clock paused, so backoff delays, liveness
//! windows and poll intervals elapse instantly and deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_channel::mpsc as frames;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use url::Url;

use lib_ecofeed::ingestors::{Frame, FrameStream, PollSource, StreamConnector};
use lib_ecofeed::{
    ConfigError, ConnectionState, EventFilter, EventKind, EventSource, FeedConfig, FeedError, FeedEvent,
    SubscriptionHandle, TelemetryFeedClient, TransportError,
};

const ENDPOINT: &str = "ws://feed.test/ws";
const POLL_ENDPOINT: &str = "http://feed.test/api/v1/telemetry";

// --- Scripted transports ---

type FrameTx = frames::UnboundedSender<Result<Frame, TransportError>>;

enum Dial {
    Refuse,
    Accept(frames::UnboundedReceiver<Result<Frame, TransportError>>),
    Hang,
}

/// A dial that succeeds, plus the sender that feeds the resulting stream.
fn live() -> (Dial, FrameTx) {
    let (tx, rx) = frames::unbounded();
    (Dial::Accept(rx), tx)
}

#[derive(Default)]
struct ScriptedConnector {
    script: Mutex<VecDeque<Dial>>,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    fn new(script: Vec<Dial>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            attempts: Mutex::new(Vec::new()),
        })
    }

    fn push(&self, dial: Dial) {
        self.script.lock().unwrap().push_back(dial);
    }

    fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

impl StreamConnector for ScriptedConnector {
    fn connect<'a>(&'a self, _endpoint: &'a Url) -> BoxFuture<'a, Result<FrameStream, TransportError>> {
        self.attempts.lock().unwrap().push(Instant::now());
        // An empty script refuses every further attempt.
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Dial::Refuse);
        async move {
            match next {
                Dial::Refuse => Err(TransportError::Connect("connection refused".to_string())),
                Dial::Accept(rx) => Ok(rx.boxed()),
                Dial::Hang => std::future::pending().await,
            }
        }
        .boxed()
    }
}

#[derive(Default)]
struct ScriptedPoller {
    script: Mutex<VecDeque<Result<Vec<Value>, TransportError>>>,
    polls: Mutex<Vec<Instant>>,
}

impl ScriptedPoller {
    fn new(script: Vec<Result<Vec<Value>, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            polls: Mutex::new(Vec::new()),
        })
    }

    fn polls(&self) -> Vec<Instant> {
        self.polls.lock().unwrap().clone()
    }
}

impl PollSource for ScriptedPoller {
    fn poll<'a>(&'a self, _endpoint: &'a Url) -> BoxFuture<'a, Result<Vec<Value>, TransportError>> {
        self.polls.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()));
        async move { next }.boxed()
    }
}

// --- Helpers ---

fn reading_value(seq: u64) -> Value {
    json!({
        "type": "reading",
        "sequenceId": seq,
        "timestamp": "2025-03-01T12:00:00Z",
        "temperature": 21.5,
        "humidity": 48.0,
        "aqi": 42.0
    })
}

fn reading(seq: u64) -> Frame {
    Frame::Text(reading_value(seq).to_string())
}

fn alert(seq: u64) -> Frame {
    Frame::Text(
        json!({
            "type": "alert",
            "sequenceId": seq,
            "timestamp": "2025-03-01T12:00:00Z",
            "message": "PM2.5 above threshold",
            "location": "Zone B",
            "severity": "high"
        })
        .to_string(),
    )
}

fn agent_status(seq: u64) -> Frame {
    Frame::Text(
        json!({
            "type": "agent_status",
            "sequenceId": seq,
            "timestamp": "2025-03-01T12:00:00Z",
            "agent": "Forecaster",
            "taskCount": 12,
            "accuracy": 0.94
        })
        .to_string(),
    )
}

fn heartbeat() -> Frame {
    Frame::Text(json!({ "type": "heartbeat", "timestamp": "2025-03-01T12:00:00Z" }).to_string())
}

fn send(feed: &FrameTx, frame: Frame) {
    feed.unbounded_send(Ok(frame)).unwrap();
}

fn fast_config() -> FeedConfig {
    FeedConfig {
        reconnect_base_delay_ms: 100,
        reconnect_max_delay_ms: 1_600,
        max_reconnect_attempts: Some(6),
        heartbeat_interval_ms: 1_000,
        ..FeedConfig::default()
    }
}

fn collector() -> (impl FnMut(&FeedEvent) + Send + 'static, mpsc::UnboundedReceiver<FeedEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |ev: &FeedEvent| {
        let _ = tx.send(ev.clone());
    }, rx)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<FeedEvent>) -> FeedEvent {
    tokio::time::timeout(Duration::from_secs(600), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("subscription released")
}

async fn wait_for_state(client: &TelemetryFeedClient, want: ConnectionState) {
    let mut states = client.watch_state();
    tokio::time::timeout(Duration::from_secs(600), states.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", want))
        .map(|_| ())
        .expect("session stopped");
}

fn client_with(connector: &Arc<ScriptedConnector>, poller: &Arc<ScriptedPoller>) -> TelemetryFeedClient {
    TelemetryFeedClient::with_transports(connector.clone(), poller.clone())
}

// --- Delivery ---

#[tokio::test(start_paused = true)]
async fn delivers_events_in_wire_order() {
    let (dial, feed) = live();
    let connector = ScriptedConnector::new(vec![dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));

    let (callback, mut events) = collector();
    client.subscribe(EventFilter::All, callback);

    let state = client.connect(ENDPOINT, &fast_config()).await.unwrap();
    assert!(state.is_active_stream());
    wait_for_state(&client, ConnectionState::Connected).await;

    for seq in 1..=5 {
        send(&feed, reading(seq));
    }
    for seq in 1..=5 {
        let ev = next_event(&mut events).await;
        assert_eq!(ev.event.sequence_id, seq);
        assert_eq!(ev.source, EventSource::Stream);
        assert_eq!(ev.epoch, 1);
        assert_eq!(ev.starts_epoch, seq == 1);
    }
    assert_eq!(client.stats().delivered, 5);
}

#[tokio::test(start_paused = true)]
async fn malformed_messages_are_dropped_and_counted() {
    let (dial, feed) = live();
    let connector = ScriptedConnector::new(vec![dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));
    let (callback, mut events) = collector();
    client.subscribe(EventFilter::All, callback);

    client.connect(ENDPOINT, &fast_config()).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    send(&feed, Frame::Text("not json at all".to_string()));
    send(&feed, Frame::Text(json!({ "type": "reading", "timestamp": "2025-03-01T12:00:00Z" }).to_string()));
    send(&feed, Frame::Text(json!({ "type": "mystery", "sequenceId": 1 }).to_string()));
    send(&feed, Frame::Binary(vec![0xde, 0xad]));
    send(&feed, reading(7));

    let ev = next_event(&mut events).await;
    assert_eq!(ev.event.sequence_id, 7);
    assert!(events.try_recv().is_err());

    let stats = client.stats();
    assert_eq!(stats.malformed, 3);
    assert_eq!(stats.unknown_type, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn filters_restrict_delivery_by_kind() {
    let (dial, feed) = live();
    let connector = ScriptedConnector::new(vec![dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));

    let (on_alert, mut alerts) = collector();
    client.subscribe(EventFilter::only(EventKind::Alert), on_alert);
    let (on_any, mut everything) = collector();
    client.subscribe(EventFilter::All, on_any);

    client.connect(ENDPOINT, &fast_config()).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    send(&feed, reading(1));
    send(&feed, alert(2));
    send(&feed, agent_status(3));
    send(&feed, alert(4));

    for seq in 1..=4 {
        assert_eq!(next_event(&mut everything).await.event.sequence_id, seq);
    }
    let first = next_event(&mut alerts).await;
    let second = next_event(&mut alerts).await;
    assert_eq!((first.event.sequence_id, second.event.sequence_id), (2, 4));
    assert!(first.kind() == EventKind::Alert && second.kind() == EventKind::Alert);
    assert!(alerts.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn callbacks_can_change_subscriptions_mid_dispatch() {
    let (dial, feed) = live();
    let connector = ScriptedConnector::new(vec![dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));

    let (on_any, mut everything) = collector();
    client.subscribe(EventFilter::All, on_any);

    let (late_callback, mut late) = collector();
    let late_callback = Arc::new(Mutex::new(Some(late_callback)));
    let own_handle: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
    let invocations = Arc::new(AtomicUsize::new(0));

    let handle = {
        let inner = client.clone();
        let own_handle = Arc::clone(&own_handle);
        let invocations = Arc::clone(&invocations);
        client.subscribe(EventFilter::All, move |_ev: &FeedEvent| {
            invocations.fetch_add(1, Ordering::SeqCst);
            if let Some(callback) = late_callback.lock().unwrap().take() {
                inner.subscribe(EventFilter::All, callback);
            }
            if let Some(me) = *own_handle.lock().unwrap() {
                inner.unsubscribe(me);
            }
        })
    };
    *own_handle.lock().unwrap() = Some(handle);

    client.connect(ENDPOINT, &fast_config()).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    for seq in 1..=3 {
        send(&feed, reading(seq));
    }
    for seq in 1..=3 {
        assert_eq!(next_event(&mut everything).await.event.sequence_id, seq);
    }

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(next_event(&mut late).await.event.sequence_id, 2);
    assert_eq!(next_event(&mut late).await.event.sequence_id, 3);

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_callback_is_removed_without_stopping_the_feed() {
    let (dial, feed) = live();
    let connector = ScriptedConnector::new(vec![dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));

    client.subscribe(EventFilter::All, |ev: &FeedEvent| {
        if ev.event.sequence_id == 1 {
            panic!("view layer bug");
        }
    });
    let (on_any, mut everything) = collector();
    client.subscribe(EventFilter::All, on_any);

    client.connect(ENDPOINT, &fast_config()).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    send(&feed, reading(1));
    send(&feed, reading(2));
    assert_eq!(next_event(&mut everything).await.event.sequence_id, 1);
    assert_eq!(next_event(&mut everything).await.event.sequence_id, 2);

    assert_eq!(client.stats().callback_panics, 1);
    assert_eq!(client.state(), ConnectionState::Connected);
}

// --- Lifecycle ---

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent_while_active() {
    let connector = ScriptedConnector::new(vec![Dial::Hang]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));

    let first = client.connect(ENDPOINT, &fast_config()).await.unwrap();
    let second = client.connect(ENDPOINT, &fast_config()).await.unwrap();
    assert_eq!(first, ConnectionState::Connecting);
    assert_eq!(second, ConnectionState::Connecting);

    sleep(Duration::from_millis(1)).await;
    assert_eq!(connector.attempts().len(), 1);
    assert_eq!(client.stats().connect_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected_before_dialing() {
    let connector = ScriptedConnector::new(vec![]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));

    let err = client.connect("http://feed.test/ws", &fast_config()).await.unwrap_err();
    assert_eq!(err, FeedError::Config(ConfigError::UnsupportedScheme("http".to_string())));

    let bad = FeedConfig { jitter_ratio: -0.1, ..fast_config() };
    let err = client.connect(ENDPOINT, &bad).await.unwrap_err();
    assert!(matches!(err, FeedError::Config(ConfigError::InvalidJitter(_))));

    sleep(Duration::from_secs(1)).await;
    assert!(connector.attempts().is_empty());
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn connect_attempt_times_out() {
    let connector = ScriptedConnector::new(vec![Dial::Hang]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));
    let config = FeedConfig {
        connect_timeout_ms: 2_000,
        reconnect_base_delay_ms: 10_000,
        reconnect_max_delay_ms: 10_000,
        ..fast_config()
    };

    let started = Instant::now();
    client.connect(ENDPOINT, &config).await.unwrap();
    wait_for_state(&client, ConnectionState::Reconnecting).await;

    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(2) && waited <= Duration::from_millis(2_005), "{:?}", waited);
    assert_eq!(client.stats().reconnects_scheduled, 1);
}

#[tokio::test(start_paused = true)]
async fn close_releases_subscriptions_and_the_transport() {
    let (dial, feed) = live();
    let connector = ScriptedConnector::new(vec![dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));
    let (callback, mut events) = collector();
    client.subscribe(EventFilter::All, callback);

    client.connect(ENDPOINT, &fast_config()).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(feed.is_closed());
    // The callback, and with it the sender, has been dropped.
    assert!(events.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn close_cancels_a_pending_reconnect() {
    let (dial, feed) = live();
    let connector = ScriptedConnector::new(vec![dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));
    let config = FeedConfig {
        reconnect_base_delay_ms: 5_000,
        reconnect_max_delay_ms: 30_000,
        ..fast_config()
    };

    client.connect(ENDPOINT, &config).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    drop(feed);
    wait_for_state(&client, ConnectionState::Reconnecting).await;

    client.close().await;
    sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.attempts().len(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn close_abandons_an_in_flight_dial() {
    let connector = ScriptedConnector::new(vec![Dial::Hang]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));
    let config = FeedConfig {
        connect_timeout_ms: 10_000,
        ..fast_config()
    };

    assert_eq!(client.connect(ENDPOINT, &config).await.unwrap(), ConnectionState::Connecting);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(client.state(), ConnectionState::Connecting);

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Neither the connect timeout nor a retry fires afterwards.
    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts().len(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.stats().reconnects_scheduled, 0);

    // The session is still usable.
    let (dial, _feed) = live();
    connector.push(dial);
    client.connect(ENDPOINT, &config).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;
    assert_eq!(connector.attempts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn close_stops_degraded_polling() {
    let connector = ScriptedConnector::new(vec![]);
    let poller = ScriptedPoller::new(vec![Ok(vec![reading_value(1)])]);
    let client = client_with(&connector, &poller);
    let (callback, mut events) = collector();
    client.subscribe(EventFilter::All, callback);

    let config = FeedConfig {
        max_reconnect_attempts: Some(0),
        poll_fallback_interval_ms: Some(5_000),
        poll_endpoint: Some(POLL_ENDPOINT.to_string()),
        ..fast_config()
    };
    client.connect(ENDPOINT, &config).await.unwrap();
    wait_for_state(&client, ConnectionState::DegradedPolling).await;
    assert_eq!(next_event(&mut events).await.source, EventSource::Poll);
    assert_eq!(poller.polls().len(), 1);

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(poller.polls().len(), 1, "no poll may fire after close()");
    assert_eq!(connector.attempts().len(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(events.recv().await.is_none());
}

// --- Reconnect & backoff ---

#[tokio::test(start_paused = true)]
async fn backoff_grows_until_the_budget_is_exhausted() {
    let connector = ScriptedConnector::new(vec![]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));

    client.connect(ENDPOINT, &fast_config()).await.unwrap();
    wait_for_state(&client, ConnectionState::Failed).await;

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 7, "initial attempt plus six retries");

    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
    // Below the cap each gap starts at base * 2^n. At the cap the jitter band
    // reaches down to max / (1 + jitterRatio).
    let floors = [100u64, 200, 400, 800, 1_333, 1_333];
    for (gap, floor) in gaps.iter().zip(floors) {
        assert!(*gap >= Duration::from_millis(floor), "gap {:?} below {}ms", gap, floor);
        assert!(*gap <= Duration::from_millis(1_601), "gap {:?} above the cap", gap);
    }
    assert!(gaps.windows(2).all(|w| w[1] >= w[0]), "delays must not shrink: {:?}", gaps);

    let stats = client.stats();
    assert_eq!(stats.connect_attempts, 7);
    assert_eq!(stats.reconnects_scheduled, 6);
}

#[tokio::test(start_paused = true)]
async fn zero_attempt_budget_fails_on_first_error_and_connect_recovers() {
    let connector = ScriptedConnector::new(vec![Dial::Refuse]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));
    let config = FeedConfig {
        max_reconnect_attempts: Some(0),
        ..fast_config()
    };

    client.connect(ENDPOINT, &config).await.unwrap();
    wait_for_state(&client, ConnectionState::Failed).await;
    assert_eq!(connector.attempts().len(), 1);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts().len(), 1, "Failed must not retry on its own");

    let (dial, _feed) = live();
    connector.push(dial);
    assert_eq!(client.connect(ENDPOINT, &config).await.unwrap(), ConnectionState::Connecting);
    wait_for_state(&client, ConnectionState::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_opens_a_new_epoch_and_keeps_subscriptions() {
    let (first_dial, first_feed) = live();
    let (second_dial, second_feed) = live();
    let connector = ScriptedConnector::new(vec![first_dial, second_dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));
    let (callback, mut events) = collector();
    client.subscribe(EventFilter::All, callback);

    client.connect(ENDPOINT, &fast_config()).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    for seq in [1, 2, 2, 1, 3] {
        send(&first_feed, reading(seq));
    }
    for seq in 1..=3 {
        let ev = next_event(&mut events).await;
        assert_eq!((ev.epoch, ev.event.sequence_id), (1, seq));
    }

    first_feed
        .unbounded_send(Err(TransportError::Reset("peer reset".to_string())))
        .unwrap();
    wait_for_state(&client, ConnectionState::Reconnecting).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    // The producer restarted its counter; the new epoch accepts it.
    send(&second_feed, reading(1));
    let ev = next_event(&mut events).await;
    assert_eq!(ev.epoch, 2);
    assert!(ev.starts_epoch);
    assert_eq!(ev.event.sequence_id, 1);

    let stats = client.stats();
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.out_of_order, 1);
    assert_eq!(stats.epochs, 2);
}

// --- Liveness ---

#[tokio::test(start_paused = true)]
async fn silence_for_two_heartbeats_drops_the_connection() {
    let (first_dial, feed) = live();
    let (second_dial, _second_feed) = live();
    let connector = ScriptedConnector::new(vec![first_dial, second_dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));
    let config = FeedConfig {
        reconnect_base_delay_ms: 10_000,
        reconnect_max_delay_ms: 10_000,
        ..fast_config()
    };

    client.connect(ENDPOINT, &config).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;
    let opened = Instant::now();

    send(&feed, heartbeat());
    sleep(Duration::from_secs(1)).await;
    send(&feed, heartbeat());
    sleep(Duration::from_secs(1)).await;
    send(&feed, heartbeat());

    wait_for_state(&client, ConnectionState::Reconnecting).await;
    let detected = opened.elapsed();
    assert!(detected >= Duration::from_secs(3), "detected too early: {:?}", detected);
    assert!(detected <= Duration::from_millis(4_010), "detected too late: {:?}", detected);

    let stats = client.stats();
    assert_eq!(stats.stale_timeouts, 1);
    assert_eq!(stats.heartbeats, 3);

    wait_for_state(&client, ConnectionState::Connected).await;
    assert_eq!(connector.attempts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn silence_after_readings_drops_the_connection() {
    let (first_dial, feed) = live();
    let (second_dial, _second_feed) = live();
    let connector = ScriptedConnector::new(vec![first_dial, second_dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));
    let (callback, mut events) = collector();
    client.subscribe(EventFilter::All, callback);
    let config = FeedConfig {
        reconnect_base_delay_ms: 10_000,
        reconnect_max_delay_ms: 10_000,
        ..fast_config()
    };

    client.connect(ENDPOINT, &config).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;
    let opened = Instant::now();

    // Readings at t=0, 1 and 2s with a 1s heartbeat, then silence.
    send(&feed, reading(1));
    sleep(Duration::from_secs(1)).await;
    send(&feed, reading(2));
    sleep(Duration::from_secs(1)).await;
    send(&feed, reading(3));

    wait_for_state(&client, ConnectionState::Reconnecting).await;
    let detected = opened.elapsed();
    assert!(detected >= Duration::from_secs(3), "detected too early: {:?}", detected);
    assert!(detected <= Duration::from_millis(4_010), "detected too late: {:?}", detected);

    for seq in 1..=3 {
        assert_eq!(next_event(&mut events).await.event.sequence_id, seq);
    }
    let stats = client.stats();
    assert_eq!(stats.stale_timeouts, 1);
    assert_eq!(stats.heartbeats, 0);
    assert_eq!(stats.delivered, 3);

    wait_for_state(&client, ConnectionState::Connected).await;
    assert_eq!(connector.attempts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_keep_the_link_alive_and_are_not_forwarded() {
    let (dial, feed) = live();
    let connector = ScriptedConnector::new(vec![dial]);
    let client = client_with(&connector, &ScriptedPoller::new(vec![]));
    let (callback, mut events) = collector();
    client.subscribe(EventFilter::All, callback);

    client.connect(ENDPOINT, &fast_config()).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    for tick in 0..10 {
        if tick % 2 == 0 {
            send(&feed, heartbeat());
        } else {
            send(&feed, Frame::Liveness);
        }
        sleep(Duration::from_millis(1_500)).await;
    }

    assert_eq!(client.state(), ConnectionState::Connected);
    let stats = client.stats();
    assert_eq!(stats.stale_timeouts, 0);
    assert_eq!(stats.heartbeats, 5);
    assert!(events.try_recv().is_err());
}

// --- Degraded polling ---

#[tokio::test(start_paused = true)]
async fn exhausted_stream_falls_back_to_polling() {
    let connector = ScriptedConnector::new(vec![]);
    let poller = ScriptedPoller::new(vec![
        Ok(vec![reading_value(1), reading_value(2), json!({ "type": "bogus" })]),
        Err(TransportError::Status(503)),
        Ok(vec![reading_value(1)]),
    ]);
    let client = client_with(&connector, &poller);
    let (callback, mut events) = collector();
    client.subscribe(EventFilter::All, callback);

    let config = FeedConfig {
        max_reconnect_attempts: Some(1),
        poll_fallback_interval_ms: Some(5_000),
        poll_endpoint: Some(POLL_ENDPOINT.to_string()),
        heartbeat_interval_ms: 60_000,
        ..fast_config()
    };
    client.connect(ENDPOINT, &config).await.unwrap();
    wait_for_state(&client, ConnectionState::DegradedPolling).await;
    assert_eq!(connector.attempts().len(), 2);

    let first = next_event(&mut events).await;
    let second = next_event(&mut events).await;
    assert_eq!(first.source, EventSource::Poll);
    assert!(first.starts_epoch && !second.starts_epoch);
    assert_eq!(first.epoch, second.epoch);
    assert_eq!(second.event.sequence_id, 2);

    // The failed cycle is skipped; the next one opens a fresh epoch.
    let third = next_event(&mut events).await;
    assert_eq!(third.event.sequence_id, 1);
    assert!(third.starts_epoch);
    assert_eq!(third.epoch, first.epoch + 1);

    let polls = poller.polls();
    assert_eq!(polls.len(), 3);
    assert_eq!(polls[1] - polls[0], Duration::from_secs(5));
    assert_eq!(polls[2] - polls[1], Duration::from_secs(5));

    let stats = client.stats();
    assert_eq!(stats.poll_cycles, 2);
    assert_eq!(stats.poll_failures, 1);
    assert_eq!(stats.unknown_type, 1);
    assert_eq!(client.state(), ConnectionState::DegradedPolling);

    // An explicit connect() leaves polling for a fresh streaming cycle.
    let (dial, _feed) = live();
    connector.push(dial);
    assert_eq!(client.connect(ENDPOINT, &config).await.unwrap(), ConnectionState::Connecting);
    wait_for_state(&client, ConnectionState::Connected).await;

    sleep(Duration::from_secs(20)).await;
    assert_eq!(poller.polls().len(), 3, "polling stops once streaming resumes");
}
