//! # Telemetry Event Model
//!
//! Typed representation of everything the backend pushes at the dashboard.
//!
//! ## Core Design Principles:
//!
//! 1.  **One tagged union**: [`EventPayload`] is internally tagged by the wire
//!     `type` field, so the JSON shape `{ "type": "alert", ...fields }` maps
//!     straight onto a Rust enum variant.
//! 2.  **Lenient field names**: the Python backend historically sent `temp`,
//!     `name`, `tasks` and `id`. Those are accepted as aliases of the canonical
//!     names so old producers keep working.
//! 3.  **UTC everywhere**: timestamps with an offset are normalized to UTC and
//!     naive ISO 8601 timestamps are read as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single normalized message from the telemetry stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    /// Monotonic within one connection epoch. Used for dedupe and ordering.
    pub sequence_id: u64,
    /// Producer-supplied time of the observation.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Variant-specific body.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl TelemetryEvent {
    /// The discriminant of the payload, used by subscription filters.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Variant-specific fields, tagged on the wire by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// An environmental sensor reading.
    Reading(EnvironmentalReading),
    /// A status update from one of the backend agents.
    AgentStatus(AgentStatusUpdate),
    /// An alert raised by the alerting agent.
    Alert(AlertRaised),
}

impl EventPayload {
    /// Returns the payload discriminant.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Reading(_) => EventKind::Reading,
            EventPayload::AgentStatus(_) => EventKind::AgentStatus,
            EventPayload::Alert(_) => EventKind::Alert,
        }
    }
}

/// One sample from the environmental sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalReading {
    /// Degrees Celsius.
    #[serde(alias = "temp")]
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Air quality index.
    pub aqi: f64,
    /// CO2 concentration in ppm, when the sensor reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2: Option<f64>,
    /// Zone or city the sample was taken in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Periodic status of one backend agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusUpdate {
    /// Agent name, e.g. `Sensing`.
    #[serde(alias = "name")]
    pub agent: String,
    /// Free-form status such as `active`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Tasks handled so far.
    #[serde(alias = "tasks")]
    pub task_count: u64,
    /// Accuracy in percent.
    pub accuracy: f64,
}

/// An alert raised by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRaised {
    /// Human-readable description.
    pub message: String,
    /// Where the condition was detected.
    pub location: String,
    /// How urgent the alert is.
    pub severity: Severity,
    /// Backend alert id, if assigned.
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<u64>,
}

/// Alert severity. Unrecognized values deserialize to `Unknown` rather than
/// failing the whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Info,
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
    /// Critical.
    Critical,
    /// Any value this client does not recognize.
    #[serde(other)]
    Unknown,
}

/// Payload discriminant, mirroring the wire `type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// `reading`
    Reading,
    /// `agent_status`
    AgentStatus,
    /// `alert`
    Alert,
}

impl EventKind {
    /// Every event kind, in wire order.
    pub const ALL: [EventKind; 3] = [EventKind::Reading, EventKind::AgentStatus, EventKind::Alert];

    /// The wire `type` tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Reading => "reading",
            EventKind::AgentStatus => "agent_status",
            EventKind::Alert => "alert",
        }
    }

    /// Parses a wire `type` tag. Heartbeats and unknown tags return `None`.
    pub fn from_wire(tag: &str) -> Option<Self> {
        EventKind::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which transport produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// The persistent streaming connection.
    Stream,
    /// A fallback poll cycle.
    Poll,
}

/// What subscribers actually receive: the event plus its delivery context.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    /// Connection epoch the event belongs to. Every reconnect and every poll
    /// cycle starts a new one.
    pub epoch: u64,
    /// Transport that delivered the event.
    pub source: EventSource,
    /// True for the first event delivered in `epoch`. Sequence ids may reset
    /// here; treat it as a discontinuity marker, not an error.
    pub starts_epoch: bool,
    /// The event itself.
    pub event: TelemetryEvent,
}

impl FeedEvent {
    /// Shorthand for `self.event.kind()`.
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// Parses RFC 3339 timestamps, falling back to naive ISO 8601 read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}
