//! # Feed Counters
//!
//! Lock-free accounting of everything the session drops, retries or delivers.
//! The session task is the only writer; `TelemetryFeedClient::stats()` reads a
//! snapshot from any thread without touching the session.
//!
//! ## `Ordering::Relaxed`
//! Each counter is independent and only its own eventual value matters, so no
//! stronger ordering is needed. A snapshot is therefore not atomic as a whole.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters, held behind an `Arc` by the client and its session.
#[derive(Debug, Default)]
pub struct FeedCounters {
    delivered: AtomicU64,
    malformed: AtomicU64,
    unknown_type: AtomicU64,
    duplicates: AtomicU64,
    out_of_order: AtomicU64,
    heartbeats: AtomicU64,
    connect_attempts: AtomicU64,
    reconnects_scheduled: AtomicU64,
    stale_timeouts: AtomicU64,
    epochs: AtomicU64,
    poll_cycles: AtomicU64,
    poll_failures: AtomicU64,
    callback_panics: AtomicU64,
    last_retry_delay_ms: AtomicU64,
}

/// Point-in-time copy of [`FeedCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Events handed to at least the dispatch stage.
    pub delivered: u64,
    /// Frames dropped as unparseable, incomplete, binary or oversized.
    pub malformed: u64,
    /// Frames dropped because of an unrecognized `type`.
    pub unknown_type: u64,
    /// Events dropped because their id repeated the last delivered one.
    pub duplicates: u64,
    /// Events dropped because their id went backwards.
    pub out_of_order: u64,
    /// Heartbeat messages received.
    pub heartbeats: u64,
    /// Streaming connection attempts started.
    pub connect_attempts: u64,
    /// Reconnect timers scheduled.
    pub reconnects_scheduled: u64,
    /// Connections abandoned for lack of liveness.
    pub stale_timeouts: u64,
    /// Sequence epochs opened, stream and poll combined.
    pub epochs: u64,
    /// Successful poll cycles.
    pub poll_cycles: u64,
    /// Failed poll requests.
    pub poll_failures: u64,
    /// Subscriber callbacks removed after panicking.
    pub callback_panics: u64,
    /// Most recent backoff delay, in milliseconds.
    pub last_retry_delay_ms: u64,
}

impl FeedStats {
    /// Total messages dropped by validation or sequencing.
    pub fn dropped(&self) -> u64 {
        self.malformed + self.unknown_type + self.duplicates + self.out_of_order
    }
}

macro_rules! bump {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[doc = concat!("Increments `", stringify!($field), "`.")]
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl FeedCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    bump! {
        record_delivered => delivered,
        record_malformed => malformed,
        record_unknown_type => unknown_type,
        record_duplicate => duplicates,
        record_out_of_order => out_of_order,
        record_heartbeat => heartbeats,
        record_connect_attempt => connect_attempts,
        record_stale_timeout => stale_timeouts,
        record_epoch => epochs,
        record_poll_cycle => poll_cycles,
        record_poll_failure => poll_failures,
        record_callback_panic => callback_panics,
    }

    /// Records a scheduled reconnect and the delay chosen for it.
    pub fn record_reconnect(&self, delay_ms: u64) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
        self.last_retry_delay_ms.store(delay_ms, Ordering::Relaxed);
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> FeedStats {
        FeedStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unknown_type: self.unknown_type.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            stale_timeouts: self.stale_timeouts.load(Ordering::Relaxed),
            epochs: self.epochs.load(Ordering::Relaxed),
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
            last_retry_delay_ms: self.last_retry_delay_ms.load(Ordering::Relaxed),
        }
    }
}
