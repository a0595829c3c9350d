//! # Configuration Modules
//!
//! Layered file and environment configuration for the binaries. The feed
//! client itself only needs a [`crate::FeedConfig`]; this module is how the
//! binaries build one.

/// Layered JSON/env loading and `ecofeed:*` option extraction.
pub mod config_sys;

pub use config_sys::{load_runtime_config, FeedSettings, RuntimeConfig, SettingsError};
