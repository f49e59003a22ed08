//! Layered configuration shared by every service.
//!
//! Sources, lowest precedence first: defaults set by the caller, an optional
//! `configuration.{yaml,toml,json}` file in the working directory, then
//! environment variables prefixed with `APP_` (nested keys separated by `__`,
//! e.g. `APP_LICENSE__CACHE_TTL_SECS=600`). A `.env` file is loaded first.

use crate::error::AppError;
use config::{Config as Cfg, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP collector endpoint. Tracing export is disabled when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Builder pre-populated with the standard file and environment sources.
///
/// Callers add their own `set_default` entries before calling `build()`;
/// defaults never override the file or environment layers.
pub fn layered() -> ConfigBuilder<DefaultState> {
    dotenvy::dotenv().ok();

    Cfg::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        let config = layered().build()?;
        Ok(config.try_deserialize()?)
    }
}

/// Treat blank strings as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
