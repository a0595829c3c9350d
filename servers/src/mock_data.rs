//! Canned and randomized payloads served by `server_mock_feed`.
//!
//! Stream events are built from the library's own wire types, so whatever
//! the mock sends is by construction something the feed client accepts.

use chrono::Utc;
use rand::Rng;
use serde_json::{Value, json};

use lib_ecofeed::telemetry::{
    AgentStatusUpdate, AlertRaised, EnvironmentalReading, EventPayload, Severity, TelemetryEvent,
};

const ZONES: [&str; 4] = ["Zone A", "Zone B", "Zone C", "Harbor"];
const AGENTS: [(&str, f64); 4] = [
    ("Sensing", 98.5),
    ("Analysis", 95.2),
    ("Alert", 100.0),
    ("Coordination", 97.8),
];

/// Builds the event carrying `seq`. Kinds rotate so a short session sees all
/// three: mostly readings, an agent update every 4th, an alert every 7th.
pub fn event(seq: u64) -> TelemetryEvent {
    let mut rng = rand::rng();
    let payload = if seq % 7 == 0 {
        let severity = match rng.random_range(0..3) {
            0 => Severity::Medium,
            1 => Severity::High,
            _ => Severity::Critical,
        };
        EventPayload::Alert(AlertRaised {
            message: format!("High PM2.5 detected ({} ug/m3)", rng.random_range(35..180)),
            location: ZONES[rng.random_range(0..ZONES.len())].to_string(),
            severity,
            alert_id: Some(seq),
        })
    } else if seq % 4 == 0 {
        let (name, accuracy) = AGENTS[rng.random_range(0..AGENTS.len())];
        EventPayload::AgentStatus(AgentStatusUpdate {
            agent: name.to_string(),
            status: Some("active".to_string()),
            task_count: rng.random_range(10..250),
            accuracy,
        })
    } else {
        EventPayload::Reading(EnvironmentalReading {
            temperature: round1(rng.random_range(18.0..32.0)),
            humidity: round1(rng.random_range(40.0..80.0)),
            aqi: rng.random_range(20..160) as f64,
            co2: Some(rng.random_range(380..460) as f64),
            location: Some(ZONES[rng.random_range(0..ZONES.len())].to_string()),
        })
    };

    TelemetryEvent {
        sequence_id: seq,
        timestamp: Utc::now(),
        payload,
    }
}

pub fn heartbeat() -> Value {
    json!({ "type": "heartbeat", "timestamp": Utc::now().to_rfc3339() })
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn environmental_data(range: &str) -> Value {
    let points = match range {
        "1h" => 12,
        "7d" => 28,
        "30d" => 30,
        _ => 24,
    };
    let mut rng = rand::rng();
    let data: Vec<Value> = (0..points)
        .map(|i| {
            json!({
                "time": format!("{:02}:00", i % 24),
                "temp": 22 + rng.random_range(0..6),
                "humidity": 65 - rng.random_range(0..10),
                "aqi": 45 + rng.random_range(0..40),
                "co2": 410 + rng.random_range(0..30),
            })
        })
        .collect();

    json!({
        "data": data,
        "range": range,
        "timestamp": Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    })
}

pub fn agent_status() -> Value {
    let agents: Vec<Value> = [
        ("Sensing", 156, 98.5),
        ("Analysis", 89, 95.2),
        ("Alert", 12, 100.0),
        ("Coordination", 234, 97.8),
    ]
    .iter()
    .map(|(name, tasks, accuracy)| {
        json!({ "name": name, "status": "active", "tasks": tasks, "accuracy": accuracy })
    })
    .collect();
    json!({ "agents": agents })
}

pub fn alerts(limit: usize) -> Value {
    let all = [
        (1, "warning", "High PM2.5 detected in Zone A", "Mumbai", "2 min ago", "high"),
        (2, "info", "Sensor calibration completed", "Delhi", "15 min ago", "low"),
        (3, "warning", "NO2 rising near the harbor", "Chennai", "1 hour ago", "medium"),
    ];
    let alerts: Vec<Value> = all
        .iter()
        .take(limit)
        .map(|(id, kind, message, location, time, severity)| {
            json!({
                "id": id,
                "type": kind,
                "message": message,
                "location": location,
                "time": time,
                "severity": severity,
            })
        })
        .collect();
    let total = alerts.len();
    json!({ "alerts": alerts, "total": total })
}

pub fn pollution_distribution() -> Value {
    json!({
        "distribution": [
            { "name": "CO2", "value": 42, "color": "#10b981" },
            { "name": "PM2.5", "value": 28, "color": "#f59e0b" },
            { "name": "NO2", "value": 18, "color": "#ef4444" },
            { "name": "SO2", "value": 12, "color": "#8b5cf6" },
        ]
    })
}
