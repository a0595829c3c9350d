//! # Core Engine Module
//!
//! The transport-independent building blocks of the feed session.
//!
//! ## Core Components:
//!
//! - **`dispatcher`**: ordered, non-reentrant fan-out of events to subscriber
//!   callbacks, with per-subscription kind filters.
//! - **`backoff`**: the reconnect delay policy (capped exponential with jitter)
//!   and the retry budget.
//! - **`sequencer`**: per-epoch dedupe and ordering of sequence ids.
//! - **`connection_state`**: the lifecycle states published to the view layer.
//! - **`counters`**: lock-free drop/retry/delivery accounting.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Reconnect delay policy and retry budget.
pub mod backoff;
/// Connection lifecycle states.
pub mod connection_state;
/// Lock-free feed accounting.
pub mod counters;
/// Ordered subscriber fan-out.
pub mod dispatcher;
/// Per-epoch sequence tracking.
pub mod sequencer;

// --- Public API Re-exports ---
pub use backoff::ReconnectPolicy;
pub use connection_state::ConnectionState;
pub use counters::{FeedCounters, FeedStats};
pub use dispatcher::{Callback, DispatchReport, Dispatcher, EventFilter, SubscriptionHandle};
pub use sequencer::{Admission, Sequencer};
