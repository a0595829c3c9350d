//! # Layered Runtime Configuration
//!
//! Loads feed settings from JSON files and the environment with `more-config`.
//! Layers are applied in order, later ones winning:
//!
//! 1.  `config.global.json`
//! 2.  `<app>.common.json`
//! 3.  `<app>.<mode>.json`, where the mode comes from the caller or from
//!     `RUNNING_MODE_<APP>`
//! 4.  environment variables (`ECOFEED__HEARTBEATINTERVALMS=1000`)
//!
//! Keys are case-insensitive; they are lowercased on the way into the flat
//! option map. Feed options live under the `ecofeed` section.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fmt};

use thiserror::Error;

use config::{ext::*, *};

use crate::client::FeedConfig;

const CONFIG_GLOBAL_NAME: &str = "config.global.json";
const SECTION: &str = "ecofeed";

/// Failures while loading or interpreting layered settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A layer could not be read or parsed.
    #[error("Failed to build configuration: {0}")]
    Build(String),

    /// An option is present but cannot be used.
    #[error("Invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        /// Option name, e.g. `heartbeatIntervalMs`.
        key: String,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Reading the running-mode variable failed.
    #[error("Environment variable error: {0}")]
    VarError(#[from] env::VarError),
}

/// The resolved layers and the merged, flattened options.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Mode used to pick `<app>.<mode>.json`, if any.
    pub running_mode: Option<String>,
    /// Directory the layers were read from.
    pub config_dir: PathBuf,
    /// Files that existed and were applied, in layer order.
    pub loaded_files: Vec<PathBuf>,
    /// Every key, lowercased, e.g. `ecofeed:heartbeatintervalms`.
    pub options: BTreeMap<String, String>,
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuntimeConfig
    Running mode: {},
    Config dir: {},
    Loaded files: {:?},
    Feed options: {}
",
            self.running_mode.as_deref().unwrap_or("-"),
            self.config_dir.display(),
            self.loaded_files,
            self.options.keys().filter(|k| k.starts_with(SECTION)).count()
        )
    }
}

/// Builds the layered configuration for `app_name` from `config_dir`.
pub fn load_runtime_config(
    app_name: &str,
    config_dir: &Path,
    running_mode: Option<&str>,
) -> Result<RuntimeConfig, SettingsError> {
    let running_mode = match running_mode {
        Some(mode) => Some(mode.to_string()),
        None => get_running_mode(app_name)?,
    };

    let mut candidates = vec![
        config_dir.join(CONFIG_GLOBAL_NAME),
        config_dir.join(format!("{}.common.json", app_name)),
    ];
    if let Some(mode) = &running_mode {
        candidates.push(config_dir.join(format!("{}.{}.json", app_name, mode)));
    }

    // Missing layers become "" and are skipped by `optional()`.
    let layer = |idx: usize| -> String {
        candidates
            .get(idx)
            .filter(|p| p.is_file())
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default()
    };
    let global_file = layer(0);
    let common_file = layer(1);
    let mode_file = layer(2);

    let config_data: Box<dyn ConfigurationRoot> = DefaultConfigurationBuilder::new()
        .add_json_file(&global_file.is().optional())
        .add_json_file(&common_file.is().optional())
        .add_json_file(&mode_file.is().optional())
        .add_env_vars()
        .build()
        .map_err(|e| SettingsError::Build(format!("{:?}", e)))?;

    let mut options: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in config_data.iter(None) {
        options.insert(key.to_string().to_lowercase(), value.to_string());
    }

    let loaded_files = candidates.into_iter().filter(|p| p.is_file()).collect();

    Ok(RuntimeConfig {
        running_mode,
        config_dir: config_dir.to_path_buf(),
        loaded_files,
        options,
    })
}

fn get_running_mode(app_name: &str) -> Result<Option<String>, SettingsError> {
    let envar = format!("RUNNING_MODE_{}", app_name.to_uppercase());
    match env::var(&envar) {
        Ok(mode) => Ok(Some(mode)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(SettingsError::VarError(e)),
    }
}

/// Feed-related settings extracted from a [`RuntimeConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSettings {
    /// `ecofeed:endpoint`, the ws(s) stream URL.
    pub endpoint: Option<String>,
    /// `ecofeed:apibase`, the http(s) REST base URL.
    pub api_base: Option<String>,
    /// `ecofeed:loglevel`.
    pub log_level: Option<String>,
    /// `ecofeed:logdir`.
    pub log_dir: Option<String>,
    /// Every connect option, defaults filled in.
    pub feed: FeedConfig,
}

impl FeedSettings {
    /// Reads the `ecofeed:*` keys of a flattened option map.
    pub fn from_options(options: &BTreeMap<String, String>) -> Result<Self, SettingsError> {
        let get = |name: &str| -> Option<&str> {
            options
                .get(&format!("{}:{}", SECTION, name))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let mut feed = FeedConfig::default();
        if let Some(v) = get("reconnectbasedelayms") {
            feed.reconnect_base_delay_ms = parse_num("reconnectBaseDelayMs", v)?;
        }
        if let Some(v) = get("reconnectmaxdelayms") {
            feed.reconnect_max_delay_ms = parse_num("reconnectMaxDelayMs", v)?;
        }
        if let Some(v) = get("maxreconnectattempts") {
            feed.max_reconnect_attempts = match v.to_lowercase().as_str() {
                "unbounded" | "null" | "none" => None,
                _ => Some(parse_num("maxReconnectAttempts", v)?),
            };
        }
        if let Some(v) = get("heartbeatintervalms") {
            feed.heartbeat_interval_ms = parse_num("heartbeatIntervalMs", v)?;
        }
        if let Some(v) = get("pollfallbackintervalms") {
            feed.poll_fallback_interval_ms = Some(parse_num("pollFallbackIntervalMs", v)?);
        }
        if let Some(v) = get("pollendpoint") {
            feed.poll_endpoint = Some(v.to_string());
        }
        if let Some(v) = get("jitterratio") {
            feed.jitter_ratio = parse_num("jitterRatio", v)?;
        }
        if let Some(v) = get("connecttimeoutms") {
            feed.connect_timeout_ms = parse_num("connectTimeoutMs", v)?;
        }
        if let Some(v) = get("maxmessagebytes") {
            feed.max_message_bytes = parse_num("maxMessageBytes", v)?;
        }

        Ok(Self {
            endpoint: get("endpoint").map(str::to_string),
            api_base: get("apibase").map(str::to_string),
            log_level: get("loglevel").map(str::to_string),
            log_dir: get("logdir").map(str::to_string),
            feed,
        })
    }
}

fn parse_num<T>(key: &str, value: &str) -> Result<T, SettingsError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.parse::<T>().map_err(|e| SettingsError::InvalidValue {
        key: format!("{}:{}", SECTION, key),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
