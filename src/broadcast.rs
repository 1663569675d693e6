use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::decode::BroadcastSample;
use crate::error::Result;
use crate::identity::is_valid_device_address;
use crate::transport::{Scanner, UUID_BROADCAST_SERVICE};

#[inline]
fn default_scan_duration() -> Duration {
    Duration::from_secs(10)
}
#[inline]
fn default_scan_retries() -> u16 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BroadcastConfig {
    // How long a single scan listens for advertisements
    // optional, default: 10s
    #[serde(with = "humantime_serde", default = "default_scan_duration")]
    pub scan_duration: Duration,
    // Max number of retry when a scan fails
    // optional, default: 3
    #[serde(default = "default_scan_retries")]
    pub scan_retries: u16,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            scan_duration: default_scan_duration(),
            scan_retries: default_scan_retries(),
        }
    }
}

/// Collects compact readings from advertisements, no connection needed.
pub struct BroadcastClient {
    config: BroadcastConfig,
}

impl BroadcastClient {
    pub fn new(config: BroadcastConfig) -> Self {
        Self { config }
    }

    /// Run one scan pass and decode every sensor heard.
    pub fn collect<S: Scanner + ?Sized>(&self, scanner: &mut S) -> Result<Vec<BroadcastSample>> {
        let devices = {
            let mut attempt = 0;
            loop {
                match scanner.scan(self.config.scan_duration) {
                    Ok(devices) => break devices,
                    Err(e) if attempt < self.config.scan_retries => {
                        attempt += 1;
                        warn!(
                            "scan failed ({}), retrying {}/{}",
                            e, attempt, self.config.scan_retries
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let samples = devices
            .into_iter()
            .filter(|device| is_valid_device_address(&device.address))
            .filter_map(|device| {
                let data = device.service_data.get(&UUID_BROADCAST_SERVICE)?;
                match BroadcastSample::decode_service_data(data) {
                    Ok(mut sample) => {
                        sample.rssi = device.rssi;
                        debug!("broadcast from {}: {:?}", device.address, sample);
                        Some(sample)
                    }
                    Err(e) => {
                        warn!("failed to decode advertisement from {}: {}", device.address, e);
                        None
                    }
                }
            })
            .collect();
        Ok(samples)
    }
}
