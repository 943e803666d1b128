//! Runtime configuration for the monitor
//!
//! Built from the resolved [`TomlConfig`]; see `docwatch_common::config` for
//! the file/env/CLI tiers.

use docwatch_common::config::TomlConfig;
use std::time::Duration;

/// Effective monitor settings
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// REST root of the job service
    pub base_url: String,
    /// Polling fallback period while the focused task is Running
    pub poll_interval: Duration,
    /// Open a push channel per focused Running task
    pub channel_enabled: bool,
    /// Extra push channel attempts after it closes
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from(&TomlConfig::default())
    }
}

impl From<&TomlConfig> for MonitorConfig {
    fn from(config: &TomlConfig) -> Self {
        Self {
            base_url: config.service.base_url.trim().to_string(),
            poll_interval: Duration::from_millis(config.polling.interval_ms.max(1)),
            channel_enabled: config.channel.enabled,
            max_reconnects: config.channel.max_reconnects,
            reconnect_delay: Duration::from_millis(config.channel.reconnect_delay_ms),
        }
    }
}
