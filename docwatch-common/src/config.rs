//! Configuration loading and resolution
//!
//! Resolution priority, per setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding `[service] base_url`
pub const ENV_BASE_URL: &str = "DOCWATCH_BASE_URL";
/// Environment variable overriding `[polling] interval_ms`
pub const ENV_POLL_INTERVAL_MS: &str = "DOCWATCH_POLL_INTERVAL_MS";

/// Default job service REST root
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
/// Reference polling interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Contents of `config.toml`; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub service: ServiceConfig,
    pub polling: PollingConfig,
    pub channel: ChannelConfig,
    pub logging: LoggingConfig,
}

/// `[service]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// REST root, e.g. `http://127.0.0.1:8000/api`
    pub base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// `[polling]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// `[channel]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// When false the monitor runs polling-only
    pub enabled: bool,
    /// Extra connection attempts after the channel closes (0 = never reconnect)
    pub max_reconnects: u32,
    /// Base delay between attempts; attempt `n` waits `n * reconnect_delay_ms`
    pub reconnect_delay_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_reconnects: 0,
            reconnect_delay_ms: 1000,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Explicit config file; must exist when given
    pub config_path: Option<PathBuf>,
    pub base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
}

/// Platform config file location: `<config_dir>/docwatch/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("docwatch").join("config.toml"))
}

/// Load a TOML config file
///
/// A missing file yields defaults; a malformed file is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        debug!("Config file not found, using defaults: {}", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve the effective configuration from all tiers
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<TomlConfig> {
    // Priority 3: TOML config file
    let mut config = match &overrides.config_path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::NotFound(format!("config file {}", path.display())));
            }
            load_toml_config(path)?
        }
        None => match default_config_path() {
            Some(path) => load_toml_config(&path)?,
            None => TomlConfig::default(),
        },
    };

    // Priority 2: Environment variables
    if let Ok(url) = std::env::var(ENV_BASE_URL) {
        if !url.trim().is_empty() {
            config.service.base_url = url;
        }
    }
    if let Ok(raw) = std::env::var(ENV_POLL_INTERVAL_MS) {
        match raw.trim().parse::<u64>() {
            Ok(ms) => config.polling.interval_ms = ms,
            Err(_) => warn!("Ignoring {}={:?}: not a number of milliseconds", ENV_POLL_INTERVAL_MS, raw),
        }
    }

    // Priority 1: Command-line arguments
    if let Some(url) = &overrides.base_url {
        config.service.base_url = url.clone();
    }
    if let Some(ms) = overrides.poll_interval_ms {
        config.polling.interval_ms = ms;
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &TomlConfig) -> Result<()> {
    let url = config.service.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "service.base_url must be an http(s) URL, got {:?}",
            config.service.base_url
        )));
    }
    if config.polling.interval_ms == 0 {
        return Err(Error::Config(
            "polling.interval_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
