use chrono::{Duration, Utc};
use clap::Parser;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;

use lib_ecofeed::loggers::{LogOptions, init_tracing};
use lib_ecofeed::{EventFilter, EventKind, FeedConfig, FeedEvent, TelemetryFeedClient};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Per-kind message rates of a live telemetry feed", long_about = None)]
struct Args {
    /// Stream endpoint
    #[clap(short, long, default_value = "ws://localhost:8000/ws")]
    endpoint: String,

    /// Report interval in minutes
    #[clap(short, long, default_value_t = 1)]
    report_interval_minutes: u64,

    /// Expected heartbeat period in milliseconds
    #[clap(long, default_value_t = 5000)]
    heartbeat_ms: u64,
}

struct Stats {
    global_timestamps: VecDeque<chrono::DateTime<Utc>>,
    kind_timestamps: BTreeMap<EventKind, VecDeque<chrono::DateTime<Utc>>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;
    let _guard = init_tracing(&LogOptions::default())?;

    let stats = Arc::new(Mutex::new(Stats {
        global_timestamps: VecDeque::new(),
        kind_timestamps: BTreeMap::new(),
    }));

    let client = TelemetryFeedClient::new();

    // Clone for the subscriber
    let stats_sink = Arc::clone(&stats);
    client.subscribe(EventFilter::All, move |ev: &FeedEvent| {
        let now = Utc::now();
        if let Ok(mut data) = stats_sink.lock() {
            data.global_timestamps.push_back(now);
            data.kind_timestamps.entry(ev.kind()).or_default().push_back(now);
        }
    });

    // Clone for the reporter task
    let stats_reporter = Arc::clone(&stats);
    let reporter_client = client.clone();
    let report_interval_seconds = args.report_interval_minutes.max(1) * 60;
    tokio::spawn(async move {
        loop {
            sleep(std::time::Duration::from_secs(report_interval_seconds)).await;
            let now = Utc::now();
            let one_minute_ago = now - Duration::minutes(1);

            let Ok(mut data) = stats_reporter.lock() else {
                break;
            };

            // Clean global
            while data.global_timestamps.front().is_some_and(|&t| t < one_minute_ago) {
                data.global_timestamps.pop_front();
            }
            let global_rate = data.global_timestamps.len();

            // Clean per kind and collect rates
            let mut rates: Vec<(EventKind, usize)> = Vec::new();
            for (kind, dq) in data.kind_timestamps.iter_mut() {
                while dq.front().is_some_and(|&t| t < one_minute_ago) {
                    dq.pop_front();
                }
                if !dq.is_empty() {
                    rates.push((*kind, dq.len()));
                }
            }
            drop(data);

            // Sort DESC by msg/min
            rates.sort_by(|a, b| b.1.cmp(&a.1));

            let report = rates
                .iter()
                .map(|(k, r)| format!("{}: {} msg/min", k, r))
                .collect::<Vec<_>>()
                .join(", ");

            let feed = reporter_client.stats();
            println!("\n----- 1-Minute Summary -----");
            println!("State: {}", reporter_client.state());
            println!("Global rate: {} msg/min", global_rate);
            println!("Kinds: {}", if report.is_empty() { "No data" } else { &report });
            println!(
                "Dropped: {} | Reconnects: {} | Stale: {} | Epochs: {}",
                feed.dropped(),
                feed.reconnects_scheduled,
                feed.stale_timeouts,
                feed.epochs
            );
            println!("----------------------------\n");
        }
    });

    let config = FeedConfig {
        heartbeat_interval_ms: args.heartbeat_ms,
        max_reconnect_attempts: None,
        ..FeedConfig::default()
    };

    println!("Connecting to {}...", args.endpoint);
    client.connect(&args.endpoint, &config).await?;
    println!("Subscribed. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    client.close().await;
    Ok(())
}
