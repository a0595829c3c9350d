//! # Telemetry Module
//!
//! The typed event model shared by every transport, and the decoder that
//! validates inbound frames against it.

/// Event types, payload variants and delivery context.
pub mod model;
/// JSON frame decoding and validation.
pub mod wire;

pub use model::{
    AgentStatusUpdate, AlertRaised, EnvironmentalReading, EventKind, EventPayload, EventSource,
    FeedEvent, Severity, TelemetryEvent,
};
pub use wire::{decode_frame, decode_value, Inbound};
