use chrono::{DateTime, Local};

use crate::decode::{BroadcastSample, SensorSample, StoredEntries, TemperatureUnit};
use crate::history::{History, StopReason};

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub firmware: String,
    pub hardware: String,
    pub units: TemperatureUnit,
    pub entries: StoredEntries,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Reading(SensorSample),
    /// `stop` is `None` when the connection dropped mid-sync and `records`
    /// only holds what arrived before.
    History {
        records: History,
        stop: Option<StopReason>,
    },
    Info(DeviceInfo),
    Broadcast(BroadcastSample),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub timestamp: DateTime<Local>,
    pub device: String,
    pub payload: Payload,
}

impl Report {
    pub fn new(device: impl Into<String>, payload: Payload) -> Self {
        Self {
            timestamp: Local::now(),
            device: device.into(),
            payload,
        }
    }
}
