//! Runtime configuration: optional TOML file plus environment overrides.
//!
//! Every field has a default, so the client runs with no config file at all.
//! Environment variables use the `BRAINDUMP_` prefix with `__` between
//! nesting levels, e.g. `BRAINDUMP_SERVER__URL`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::CaptureConfig;

const ENV_PREFIX: &str = "BRAINDUMP";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: CaptureConfig,
    pub export: ExportConfig,
}

/// Channel endpoint and reconnect policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket base; the session id is appended as a path segment.
    pub url: String,
    /// Re-dial after a drop. Off means one connection attempt per session.
    pub reconnect: bool,
    pub reconnect_initial_secs: u64,
    pub reconnect_max_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".to_string(),
            reconnect: true,
            reconnect_initial_secs: 1,
            reconnect_max_secs: 60,
        }
    }
}

/// Where exported session documents are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load from `path` (missing file is fine) with environment overrides on
    /// top.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;
        settings
            .try_deserialize()
            .context("invalid configuration")
    }
}
