use std::{collections::HashMap, time::Duration};

use uuid::Uuid;

use crate::error::Result;

pub const UUID_TIME: Uuid = Uuid::from_u128(0xebe0ccb7_7a0a_4b0c_8a1a_6ff2997da3a6);
pub const UUID_NUM_RECORDS: Uuid = Uuid::from_u128(0xebe0ccb9_7a0a_4b0c_8a1a_6ff2997da3a6);
pub const UUID_HISTORY: Uuid = Uuid::from_u128(0xebe0ccbc_7a0a_4b0c_8a1a_6ff2997da3a6);
pub const UUID_UNITS: Uuid = Uuid::from_u128(0xebe0ccbe_7a0a_4b0c_8a1a_6ff2997da3a6);
pub const UUID_DATA: Uuid = Uuid::from_u128(0xebe0ccc1_7a0a_4b0c_8a1a_6ff2997da3a6);
pub const UUID_FIRMWARE: Uuid = Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb);
pub const UUID_HARDWARE: Uuid = Uuid::from_u128(0x00002a27_0000_1000_8000_00805f9b34fb);
/// Environmental sensing service carrying the compact advertisement.
pub const UUID_BROADCAST_SERVICE: Uuid = Uuid::from_u128(0x0000181a_0000_1000_8000_00805f9b34fb);

/// A connected device. Dropping it releases the connection.
pub trait Transport {
    fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>>;
    fn write(&mut self, characteristic: Uuid, value: &[u8]) -> Result<()>;
    fn subscribe(&mut self, characteristic: Uuid) -> Result<()>;
    fn unsubscribe(&mut self, characteristic: Uuid) -> Result<()>;
    /// Block until the next notification arrives, `None` once `timeout` expires.
    fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveredDevice {
    pub address: String,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub rssi: Option<i16>,
}

pub trait Scanner {
    fn scan(&mut self, duration: Duration) -> Result<Vec<DiscoveredDevice>>;
}
