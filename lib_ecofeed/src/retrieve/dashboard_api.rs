//! # Dashboard REST API
//!
//! Typed access to the read-only endpoints the dashboard loads on start-up,
//! before the live feed takes over:
//!
//! - `GET /api/v1/environmental-data?range=<1h|24h|7d|30d>`
//! - `GET /api/v1/agents/status`
//! - `GET /api/v1/alerts?limit=<n>`
//! - `GET /api/v1/pollution/distribution`

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use crate::errors::ConfigError;
use crate::retrieve::endpoint::ensure_trailing_slash;
use crate::retrieve::ky_http::ApiClient;
use crate::telemetry::Severity;

/// Time window for historical environmental data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataRange {
    /// `1h`
    OneHour,
    /// `24h`
    #[default]
    OneDay,
    /// `7d`
    SevenDays,
    /// `30d`
    ThirtyDays,
}

impl DataRange {
    /// Query-string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataRange::OneHour => "1h",
            DataRange::OneDay => "24h",
            DataRange::SevenDays => "7d",
            DataRange::ThirtyDays => "30d",
        }
    }
}

impl fmt::Display for DataRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(DataRange::OneHour),
            "24h" => Ok(DataRange::OneDay),
            "7d" => Ok(DataRange::SevenDays),
            "30d" => Ok(DataRange::ThirtyDays),
            other => Err(format!("unknown range '{}' (expected 1h, 24h, 7d or 30d)", other)),
        }
    }
}

/// One point of the environmental history chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalPoint {
    /// Chart label, e.g. `14:00`.
    pub time: String,
    /// Degrees Celsius.
    pub temp: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Air quality index.
    pub aqi: f64,
    /// CO2 in ppm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2: Option<f64>,
}

/// Response of `/api/v1/environmental-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalData {
    /// Points in chronological order.
    pub data: Vec<EnvironmentalPoint>,
    /// Echo of the requested range.
    pub range: String,
    /// Server time of the response.
    pub timestamp: String,
}

/// Status card of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    /// Agent name.
    pub name: String,
    /// Current status, e.g. `active`.
    pub status: String,
    /// Tasks handled so far.
    pub tasks: u64,
    /// Accuracy in percent.
    pub accuracy: f64,
}

/// Response of `/api/v1/agents/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusList {
    /// One card per agent.
    pub agents: Vec<AgentCard>,
}

/// One entry of the alert history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEntry {
    /// Alert id.
    pub id: u64,
    /// Category such as `warning` or `info`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable description.
    pub message: String,
    /// Where the condition was detected.
    pub location: String,
    /// Relative time label, e.g. `2 min ago`.
    pub time: String,
    /// How urgent the alert is.
    pub severity: Severity,
}

/// Response of `/api/v1/alerts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertList {
    /// Most recent alerts first.
    pub alerts: Vec<AlertEntry>,
    /// Number of alerts returned.
    pub total: u64,
}

/// Share of one pollutant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutionShare {
    /// Pollutant name, e.g. `PM2.5`.
    pub name: String,
    /// Share in percent.
    pub value: f64,
    /// Chart color hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Response of `/api/v1/pollution/distribution`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutionDistribution {
    /// One share per pollutant.
    pub distribution: Vec<PollutionShare>,
}

/// Client for the dashboard REST endpoints, rooted at an http(s) base URL.
#[derive(Clone)]
pub struct DashboardApi {
    client: ApiClient,
    base: Url,
}

impl DashboardApi {
    /// Creates a client for `base` (for example `http://localhost:8000`).
    pub fn new(base: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self, ConfigError> {
        Self::with_client(base, ApiClient::new(auth_token, 3, timeout))
    }

    /// Creates a client that reuses an existing `ApiClient`.
    pub fn with_client(base: &str, client: ApiClient) -> Result<Self, ConfigError> {
        let mut url = Url::parse(base).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: base.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }
        ensure_trailing_slash(&mut url);
        Ok(Self { client, base: url })
    }

    /// The normalized base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Historical environmental readings for `range`.
    pub async fn environmental_data(&self, range: DataRange) -> anyhow::Result<EnvironmentalData> {
        self.get("api/v1/environmental-data", &[("range", range.as_str().to_string())])
            .await
    }

    /// Current status card of every backend agent.
    pub async fn agent_status(&self) -> anyhow::Result<AgentStatusList> {
        self.get("api/v1/agents/status", &[]).await
    }

    /// The most recent `limit` alerts.
    pub async fn alerts(&self, limit: u32) -> anyhow::Result<AlertList> {
        self.get("api/v1/alerts", &[("limit", limit.to_string())]).await
    }

    /// Share of each pollutant type.
    pub async fn pollution_distribution(&self) -> anyhow::Result<PollutionDistribution> {
        self.get("api/v1/pollution/distribution", &[]).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<T> {
        let mut url = self.base.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        tracing::debug!("GET {}", url);
        self.client.get_json::<T>(url).await?.into_data()
    }
}
