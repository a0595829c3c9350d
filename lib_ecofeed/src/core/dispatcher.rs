//! # Subscription Dispatcher
//!
//! The ordered fan-out stage between the session task and view-layer callbacks.
//!
//! ## Core Design Principles:
//!
//! 1.  **Single owner**: the dispatcher lives inside the session task and is
//!     never shared, so it needs no lock. Callbacks therefore never run
//!     concurrently with each other or with a state transition.
//! 2.  **Registration order is delivery order**: subscribers are kept in a
//!     `Vec` and invoked front to back for every event.
//! 3.  **Non-reentrant mutation**: `subscribe`/`unsubscribe` calls made from
//!     inside a callback travel through the client's registry channel and are
//!     applied by the session only after `broadcast` returns.
//! 4.  **Panic isolation**: a callback that panics is unwound, logged and
//!     removed with `retain_mut`. Later subscribers still see the event.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::telemetry::{EventKind, FeedEvent};

/// Boxed subscriber callback.
pub type Callback = Box<dyn FnMut(&FeedEvent) + Send + 'static>;

/// Opaque handle returned by `subscribe`, consumed by `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Wraps a raw subscription id.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// The raw subscription id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Which event kinds a subscription wants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EventFilter {
    /// Every event.
    #[default]
    All,
    /// Only the listed kinds.
    Kinds(BTreeSet<EventKind>),
}

impl EventFilter {
    /// Filter for a single kind.
    pub fn only(kind: EventKind) -> Self {
        EventFilter::Kinds(BTreeSet::from([kind]))
    }

    /// Filter for several kinds. An empty iterator matches nothing.
    pub fn kinds<I: IntoIterator<Item = EventKind>>(kinds: I) -> Self {
        EventFilter::Kinds(kinds.into_iter().collect())
    }

    /// Parses a comma-separated list of wire tags, e.g. `"alert,reading"`.
    /// Returns the first unrecognized tag as the error.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        let mut kinds = BTreeSet::new();
        for tag in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let kind = EventKind::from_wire(tag).ok_or_else(|| tag.to_string())?;
            kinds.insert(kind);
        }
        if kinds.is_empty() {
            return Ok(EventFilter::All);
        }
        Ok(EventFilter::Kinds(kinds))
    }

    /// True if an event of `kind` passes this filter.
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

struct Subscriber {
    handle: SubscriptionHandle,
    filter: EventFilter,
    callback: Callback,
}

/// Outcome of one `broadcast`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that ran to completion.
    pub invoked: usize,
    /// Subscribers dropped because their callback panicked.
    pub removed: Vec<SubscriptionHandle>,
}

/// Ordered registry of subscriber callbacks.
#[derive(Default)]
pub struct Dispatcher {
    subscribers: Vec<Subscriber>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback at the end of the delivery order.
    pub fn add_subscriber(&mut self, handle: SubscriptionHandle, filter: EventFilter, callback: Callback) {
        tracing::debug!("Subscription {} registered with filter {:?}", handle.id(), filter);
        self.subscribers.push(Subscriber {
            handle,
            filter,
            callback,
        });
    }

    /// Removes a callback. Returns `false` if the handle was unknown.
    pub fn remove_subscriber(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.handle != handle);
        let removed = self.subscribers.len() != before;
        if removed {
            tracing::debug!("Subscription {} removed", handle.id());
        }
        removed
    }

    /// Drops every subscriber and returns how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.subscribers.len();
        self.subscribers.clear();
        count
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// True when nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Invokes every matching callback, in registration order.
    pub fn broadcast(&mut self, event: &FeedEvent) -> DispatchReport {
        let kind = event.kind();
        let mut report = DispatchReport::default();

        self.subscribers.retain_mut(|sub| {
            if !sub.filter.matches(kind) {
                return true;
            }
            match catch_unwind(AssertUnwindSafe(|| (sub.callback)(event))) {
                Ok(()) => {
                    report.invoked += 1;
                    true
                }
                Err(_) => {
                    tracing::warn!(
                        "Subscriber {} panicked on {} event (epoch {}, seq {}). Removing it.",
                        sub.handle.id(),
                        kind,
                        event.epoch,
                        event.event.sequence_id
                    );
                    report.removed.push(sub.handle);
                    false
                }
            }
        });

        report
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
