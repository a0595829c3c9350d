//! # Inbound Wire Decoder
//!
//! Turns raw text frames (and poll-response array items) into either a
//! [`TelemetryEvent`] or a heartbeat. Anything else is a [`ProtocolError`],
//! which the session counts and drops.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::telemetry::model::{parse_timestamp, EventKind, TelemetryEvent};

const HEARTBEAT_TAG: &str = "heartbeat";

/// A successfully decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A telemetry event to sequence and dispatch.
    Event(TelemetryEvent),
    /// Keep-alive. Resets the liveness timer and is never forwarded.
    Heartbeat {
        /// Producer time, when present and parseable.
        timestamp: Option<DateTime<Utc>>,
    },
}

/// Decodes one text frame, enforcing the configured size limit first.
pub fn decode_frame(text: &str, max_bytes: usize) -> Result<Inbound, ProtocolError> {
    if text.len() > max_bytes {
        return Err(ProtocolError::Oversized {
            len: text.len(),
            limit: max_bytes,
        });
    }
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Unparseable(e.to_string()))?;
    decode_value(value)
}

/// Decodes an already-parsed JSON message. Poll responses come through here.
pub fn decode_value(value: Value) -> Result<Inbound, ProtocolError> {
    let Some(object) = value.as_object() else {
        return Err(ProtocolError::InvalidField("message is not a JSON object".to_string()));
    };

    let tag = match object.get("type") {
        Some(Value::String(tag)) => tag.as_str(),
        Some(_) => return Err(ProtocolError::InvalidField("'type' must be a string".to_string())),
        None => return Err(ProtocolError::MissingField("type".to_string())),
    };

    if tag == HEARTBEAT_TAG {
        let timestamp = object
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp);
        return Ok(Inbound::Heartbeat { timestamp });
    }

    if EventKind::from_wire(tag).is_none() {
        return Err(ProtocolError::UnknownType(tag.to_string()));
    }

    for required in ["sequenceId", "timestamp"] {
        if !object.contains_key(required) {
            return Err(ProtocolError::MissingField(required.to_string()));
        }
    }

    serde_json::from_value::<TelemetryEvent>(value)
        .map(Inbound::Event)
        .map_err(|e| ProtocolError::InvalidField(e.to_string()))
}
