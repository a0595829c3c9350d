//! # Mock EcoVerse Backend
//!
//! A stand-in for the EcoVerse agent backend, for exercising the feed client
//! and the dashboard tooling without the real system.
//!
//! ## Routes:
//! - **`/ws`**: telemetry stream. Each connection gets its own sequence counter
//!   starting at 1, events every `--interval-ms` and heartbeats every
//!   `--heartbeat-ms`.
//! - **`/api/v1/telemetry`**: one poll batch (a JSON array) for degraded mode.
//! - **`/api/v1/environmental-data`**, **`/api/v1/agents/status`**,
//!   **`/api/v1/alerts`**, **`/api/v1/pollution/distribution`**: the
//!   dashboard's REST endpoints with canned data.
//! - **`/health`**: liveness probe.
//!
//! ## Fault injection:
//! - `--stall-after N` goes silent (no events, no heartbeats) after N events
//!   while keeping the socket open, which trips the client's liveness check.
//! - `--drop-after N` closes the socket after N events.
//! - `--malformed-every N` sends a broken frame after every N-th event.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

mod mock_data;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        ConnectInfo, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use clap::Parser;
use serde_json::Value;
use tokio::signal;
use tokio::time::{MissedTickBehavior, interval};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use lib_ecofeed::loggers::{LogOptions, init_tracing};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Mock EcoVerse backend (stream, poll and REST)", long_about = None)]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "MOCK_FEED_PORT", default_value_t = 8000)]
    port: u16,

    /// Milliseconds between stream events.
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Milliseconds between heartbeats.
    #[arg(long, default_value_t = 5000)]
    heartbeat_ms: u64,

    /// Go silent after this many events, keeping the socket open.
    #[arg(long)]
    stall_after: Option<u64>,

    /// Close the socket after this many events.
    #[arg(long)]
    drop_after: Option<u64>,

    /// Send a malformed frame after every N-th event.
    #[arg(long)]
    malformed_every: Option<u64>,

    /// Events per poll batch.
    #[arg(long, default_value_t = 5)]
    batch_size: u64,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

struct AppState {
    args: Args,
    /// Total events sent across all connections.
    sent: AtomicU64,
    connections: AtomicU64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let _guard = init_tracing(&LogOptions {
        level: args.log_level.clone(),
        log_dir: None,
        app_name: "server_mock_feed".to_string(),
    })?;

    let port = args.port;
    let state = Arc::new(AppState {
        args,
        sent: AtomicU64::new(0),
        connections: AtomicU64::new(0),
    });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/v1/telemetry", get(poll_handler))
        .route("/api/v1/environmental-data", get(environmental_handler))
        .route("/api/v1/agents/status", get(agents_handler))
        .route("/api/v1/alerts", get(alerts_handler))
        .route("/api/v1/pollution/distribution", get(pollution_handler))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Mock feed live at ws://{}/ws (REST under http://{}/api/v1)", addr, addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Mock feed stopped.");
    Ok(())
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Streams events and heartbeats to one client until it leaves or a fault
/// option ends the session.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let id = state.connections.fetch_add(1, Ordering::Relaxed) + 1;
    info!("Client #{} connected from {}", id, addr);

    let args = &state.args;
    let mut events = interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut heartbeats = interval(Duration::from_millis(args.heartbeat_ms.max(1)));
    events.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeats.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut seq: u64 = 0;
    let mut stalled = false;

    loop {
        tokio::select! {
            _ = events.tick(), if !stalled => {
                seq += 1;
                let frame = match serde_json::to_string(&mock_data::event(seq)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Could not encode event {}: {}", seq, e);
                        continue;
                    }
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
                state.sent.fetch_add(1, Ordering::Relaxed);

                if args.malformed_every.is_some_and(|n| n > 0 && seq % n == 0) {
                    let broken = r#"{"type":"reading","sequenceId":"#;
                    if socket.send(Message::Text(broken.into())).await.is_err() {
                        break;
                    }
                }
                if args.drop_after.is_some_and(|n| seq >= n) {
                    warn!("Client #{}: dropping connection after {} events.", id, seq);
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                if args.stall_after.is_some_and(|n| seq >= n) {
                    warn!("Client #{}: stalling after {} events.", id, seq);
                    stalled = true;
                }
            }
            _ = heartbeats.tick(), if !stalled => {
                let hb = mock_data::heartbeat().to_string();
                if socket.send(Message::Text(hb.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(other)) => debug!("Client #{} sent {:?}", id, other),
            },
        }
    }

    info!(
        "Client #{} disconnected after {} events ({} sent in total).",
        id,
        seq,
        state.sent.load(Ordering::Relaxed)
    );
}

/// One degraded-mode batch. Ids restart at 1; every poll cycle is its own epoch.
async fn poll_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let batch: Vec<Value> = (1..=state.args.batch_size)
        .filter_map(|seq| serde_json::to_value(mock_data::event(seq)).ok())
        .collect();
    Json(Value::Array(batch))
}

async fn environmental_handler(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let range = params.get("range").map(String::as_str).unwrap_or("24h");
    Json(mock_data::environmental_data(range))
}

async fn agents_handler() -> Json<Value> {
    Json(mock_data::agent_status())
}

async fn alerts_handler(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(10);
    Json(mock_data::alerts(limit))
}

async fn pollution_handler() -> Json<Value> {
    Json(mock_data::pollution_distribution())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Shutdown signal received. Closing server gracefully...");
}
