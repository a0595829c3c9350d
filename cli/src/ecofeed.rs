//! # ecofeed
//!
//! Command-line front end for the EcoVerse telemetry feed.
//!
//! ## Subcommands:
//! - **`tail`**: connects a `TelemetryFeedClient` and prints every event it
//!   delivers until ctrl-c (or `--duration-secs`), then prints the feed counters.
//! - **`snapshot`**: fetches the four dashboard REST endpoints once and prints
//!   them as a single JSON document.
//!
//! Settings are resolved in this order, later winning: layered config files
//! (`config.global.json`, `ecofeed.common.json`, `ecofeed.<mode>.json`),
//! environment variables, then command-line flags.
//!
//! ```text
//! ecofeed tail --api-base http://localhost:8000 --only alert,reading
//! ecofeed snapshot --api-base http://localhost:8000 --range 7d
//! ```

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use lib_ecofeed::configs::{FeedSettings, load_runtime_config};
use lib_ecofeed::loggers::{LogOptions, init_tracing};
use lib_ecofeed::retrieve::{DashboardApi, DataRange, stream_url_from_api_base};
use lib_ecofeed::{EventFilter, EventPayload, FeedConfig, FeedEvent, FeedStats, TelemetryFeedClient};

const APP_NAME: &str = "ecofeed";

#[derive(Parser, Debug)]
#[command(author, version, about = "EcoVerse telemetry feed tools", long_about = None)]
struct Cli {
    /// Directory holding config.global.json and ecofeed.*.json.
    #[arg(long, env = "ECOFEED_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,

    /// Running mode; selects ecofeed.<mode>.json. Falls back to RUNNING_MODE_ECOFEED.
    #[arg(long)]
    mode: Option<String>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Directory for the daily JSON log file.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream live events to stdout.
    Tail(TailArgs),
    /// Fetch the dashboard REST endpoints once.
    Snapshot(SnapshotArgs),
}

#[derive(Args, Debug)]
struct TailArgs {
    /// WebSocket endpoint (ws:// or wss://).
    #[arg(long, env = "ECOFEED_ENDPOINT")]
    endpoint: Option<String>,

    /// REST base URL; the stream URL is derived from it when --endpoint is absent.
    #[arg(long, env = "ECOFEED_API_BASE")]
    api_base: Option<String>,

    /// Comma-separated event types to print, e.g. "alert,reading".
    #[arg(long)]
    only: Option<String>,

    /// Expected heartbeat period in milliseconds.
    #[arg(long)]
    heartbeat_ms: Option<u64>,

    /// Reconnect attempts before giving up; 0 fails on the first error.
    #[arg(long, conflicts_with = "unbounded")]
    max_attempts: Option<u32>,

    /// Retry forever.
    #[arg(long)]
    unbounded: bool,

    /// Poll period for degraded mode, in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// URL polled in degraded mode. Defaults to <api-base>/api/v1/telemetry.
    #[arg(long)]
    poll_endpoint: Option<String>,

    /// Print raw JSON events instead of one-line summaries.
    #[arg(long)]
    json: bool,

    /// Stop after this many seconds instead of waiting for ctrl-c.
    #[arg(long)]
    duration_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct SnapshotArgs {
    /// REST base URL, e.g. http://localhost:8000.
    #[arg(long, env = "ECOFEED_API_BASE")]
    api_base: Option<String>,

    /// Environmental data window: 1h, 24h, 7d or 30d.
    #[arg(long, default_value = "24h")]
    range: DataRange,

    /// Number of alerts to fetch.
    #[arg(long, default_value_t = 10)]
    alerts_limit: u32,

    /// Bearer token sent with every request.
    #[arg(long, env = "ECOFEED_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let runtime = load_runtime_config(APP_NAME, &cli.config_dir, cli.mode.as_deref())?;
    let settings = FeedSettings::from_options(&runtime.options)?;

    let log_options = LogOptions {
        level: cli
            .log_level
            .clone()
            .or_else(|| settings.log_level.clone())
            .unwrap_or_else(|| "info".to_string()),
        log_dir: cli.log_dir.clone().or_else(|| settings.log_dir.clone().map(PathBuf::from)),
        app_name: APP_NAME.to_string(),
    };
    let _guard = init_tracing(&log_options)?;
    tracing::debug!("{}", runtime);

    match cli.command {
        Command::Tail(args) => tail(args, settings).await,
        Command::Snapshot(args) => snapshot(args, settings).await,
    }
}

/// Applies command-line overrides on top of the file settings.
fn feed_config(args: &TailArgs, settings: &FeedSettings, api_base: Option<&str>) -> anyhow::Result<FeedConfig> {
    let mut config = settings.feed.clone();
    if let Some(ms) = args.heartbeat_ms {
        config.heartbeat_interval_ms = ms;
    }
    if args.unbounded {
        config.max_reconnect_attempts = None;
    } else if let Some(n) = args.max_attempts {
        config.max_reconnect_attempts = Some(n);
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll_fallback_interval_ms = Some(ms);
    }
    if let Some(url) = &args.poll_endpoint {
        config.poll_endpoint = Some(url.clone());
    }
    if config.poll_fallback_interval_ms.is_some() && config.poll_endpoint.is_none() {
        let base = api_base.ok_or_else(|| anyhow!("polling needs --poll-endpoint or an API base URL"))?;
        config.poll_endpoint = Some(format!("{}/api/v1/telemetry", base.trim_end_matches('/')));
    }
    Ok(config)
}

async fn tail(args: TailArgs, settings: FeedSettings) -> anyhow::Result<()> {
    let api_base = args.api_base.clone().or_else(|| settings.api_base.clone());
    let endpoint = match args.endpoint.clone().or_else(|| settings.endpoint.clone()) {
        Some(endpoint) => endpoint,
        None => {
            let base = api_base
                .as_deref()
                .ok_or_else(|| anyhow!("no endpoint; pass --endpoint or --api-base, or set ecofeed:endpoint"))?;
            stream_url_from_api_base(base)?.to_string()
        }
    };
    let config = feed_config(&args, &settings, api_base.as_deref())?;

    let filter = match &args.only {
        Some(list) => EventFilter::parse_list(list).map_err(|tag| anyhow!("unknown event type '{}'", tag))?,
        None => EventFilter::All,
    };

    let client = TelemetryFeedClient::new();
    let as_json = args.json;
    client.subscribe(filter, move |ev: &FeedEvent| print_event(ev, as_json));

    let mut states = client.watch_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            eprintln!("[feed] {}", state);
        }
    });

    let state = client.connect(&endpoint, &config).await?;
    info!("Tailing {} (state: {})", endpoint, state);

    match args.duration_secs {
        Some(secs) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => res.context("failed to listen for ctrl-c")?,
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?,
    }

    warn!("Stopping feed...");
    client.close().await;
    print_stats(&client.stats());
    Ok(())
}

fn print_event(ev: &FeedEvent, as_json: bool) {
    if as_json {
        match serde_json::to_string(&ev.event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Could not serialize event {}: {}", ev.event.sequence_id, e),
        }
        return;
    }

    let marker = if ev.starts_epoch { "*" } else { " " };
    let body = match &ev.event.payload {
        EventPayload::Reading(r) => format!(
            "temp={:.1} humidity={:.1} aqi={:.0}{}",
            r.temperature,
            r.humidity,
            r.aqi,
            r.co2.map(|c| format!(" co2={:.0}", c)).unwrap_or_default()
        ),
        EventPayload::AgentStatus(a) => format!(
            "{} {} tasks={} accuracy={:.1}",
            a.agent,
            a.status.as_deref().unwrap_or("-"),
            a.task_count,
            a.accuracy
        ),
        EventPayload::Alert(a) => format!("[{:?}] {} @ {}", a.severity, a.message, a.location),
    };
    println!(
        "{}e{:<3} #{:<6} {} {:<12} {}",
        marker,
        ev.epoch,
        ev.event.sequence_id,
        ev.event.timestamp.format("%H:%M:%S"),
        ev.kind(),
        body
    );
}

fn print_stats(stats: &FeedStats) {
    println!("\n----- Feed Summary -----");
    println!("Delivered:        {}", stats.delivered);
    println!(
        "Dropped:          {} (malformed {}, unknown {}, duplicate {}, out-of-order {})",
        stats.dropped(),
        stats.malformed,
        stats.unknown_type,
        stats.duplicates,
        stats.out_of_order
    );
    println!("Heartbeats:       {}", stats.heartbeats);
    println!(
        "Connects:         {} attempts, {} reconnects, {} stale",
        stats.connect_attempts, stats.reconnects_scheduled, stats.stale_timeouts
    );
    println!("Polling:          {} cycles, {} failures", stats.poll_cycles, stats.poll_failures);
    println!("Epochs:           {}", stats.epochs);
    println!("------------------------\n");
}

async fn snapshot(args: SnapshotArgs, settings: FeedSettings) -> anyhow::Result<()> {
    let base = args
        .api_base
        .or(settings.api_base)
        .ok_or_else(|| anyhow!("no API base URL; pass --api-base or set ecofeed:apiBase"))?;
    let api = DashboardApi::new(&base, args.token, Duration::from_secs(args.timeout_secs))?;
    info!("Fetching dashboard snapshot from {}", api.base());

    let (environment, agents, alerts, pollution) = tokio::try_join!(
        api.environmental_data(args.range),
        api.agent_status(),
        api.alerts(args.alerts_limit),
        api.pollution_distribution(),
    )?;

    let doc = json!({
        "environmentalData": environment,
        "agents": agents.agents,
        "alerts": alerts,
        "pollution": pollution.distribution,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
