use serde::{Deserialize, Serialize};

use crate::hub::BackendConfig;
use crate::sink::SinkConfig;

#[inline]
fn default_sinks() -> Vec<SinkConfig> {
    vec![SinkConfig::Console]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Bluetooth settings: notification_timeout, history_progress,
    // scan_duration, scan_retries and connect_retry
    #[serde(flatten)]
    pub backend: BackendConfig,
    // List of sensor MAC addresses to poll when none are given on the
    // command line
    // optional, default: empty
    #[serde(default)]
    pub devices: Vec<String>,
    // Where reports go
    // optional, default: [Console]
    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            devices: Vec::new(),
            sinks: default_sinks(),
        }
    }
}
