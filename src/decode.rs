//! Decoders for the fixed binary layouts spoken by the LYWSD03MMC.
//!
//! Everything connected-mode is little-endian at fixed offsets. The compact
//! advertisement is handled as the hex string the advertisement is usually
//! rendered as, split into byte pairs, with multi-byte fields big-endian.

use std::fmt;

use chrono::{DateTime, Duration, Local};

use crate::battery::battery_percent;
use crate::error::DecodeError;

const LIVE_SAMPLE_LEN: usize = 5;
const HISTORY_RECORD_LEN: usize = 14;
const STORED_ENTRIES_LEN: usize = 8;
// Byte pairs needed before the trailing frame counter.
const BROADCAST_REQUIRED_BYTES: usize = 14;
const BROADCAST_COUNTER_TOKEN: usize = 14;

/// 16-bit service UUID `0x181A` as it appears on air.
pub const BROADCAST_SERVICE_PREFIX: [u8; 2] = [0x1a, 0x18];

fn ensure_len(layout: &'static str, data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::TooShort {
            layout,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// A live reading pushed by the device while connected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: u8,
    /// Cell voltage in volts.
    pub voltage: f32,
    /// Derived from `voltage`, never transmitted.
    pub battery: u8,
}

impl SensorSample {
    /// Layout: `[i16 centidegrees][u8 humidity][i16 millivolts]`.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        ensure_len("live sample", data, LIVE_SAMPLE_LEN)?;

        let temperature = i16::from_le_bytes([data[0], data[1]]) as f32 / 100.0;
        let humidity = data[2];
        let voltage = i16::from_le_bytes([data[3], data[4]]) as f32 / 1000.0;

        Ok(Self {
            temperature,
            humidity,
            voltage,
            battery: battery_percent(voltage),
        })
    }
}

/// One closed hour of min/max readings replayed from the device log.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub index: u32,
    pub timestamp: DateTime<Local>,
    pub min_temperature: f32,
    pub min_humidity: u8,
    pub max_temperature: f32,
    pub max_humidity: u8,
}

impl HistoryRecord {
    /// Layout: `[u32 index][u32 offset][i16 max decidegrees][u8 max hum]
    /// [i16 min decidegrees][u8 min hum]`.
    ///
    /// The offset counts seconds since the device started, so the absolute
    /// timestamp is anchored on `start_time`.
    pub fn decode(data: &[u8], start_time: DateTime<Local>) -> Result<Self, DecodeError> {
        ensure_len("history record", data, HISTORY_RECORD_LEN)?;

        let index = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let offset = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let max_temperature = i16::from_le_bytes([data[8], data[9]]) as f32 / 10.0;
        let max_humidity = data[10];
        let min_temperature = i16::from_le_bytes([data[11], data[12]]) as f32 / 10.0;
        let min_humidity = data[13];

        Ok(Self {
            index,
            timestamp: start_time + Duration::seconds(i64::from(offset)),
            min_temperature,
            min_humidity,
            max_temperature,
            max_humidity,
        })
    }
}

/// A compact reading embedded in a BLE advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastSample {
    pub mac: String,
    pub temperature: f32,
    pub humidity: u8,
    pub battery: u8,
    pub voltage: f32,
    /// The trailing frame counter was missing; the other fields are best-effort.
    pub malformed: bool,
    /// Supplied by the transport, not part of the payload.
    pub rssi: Option<i16>,
}

impl BroadcastSample {
    /// Decode the hex rendering of an advertisement, service UUID included.
    ///
    /// Byte pairs: `[0..2)` service UUID, `[2..8)` MAC, `[8..10)` temperature,
    /// `10` humidity, `11` battery, `[12..14)` millivolts, `14` frame counter.
    pub fn decode(advertisement: &str) -> Result<Self, DecodeError> {
        let advertisement = advertisement.trim();
        if !advertisement.is_ascii() {
            return Err(DecodeError::InvalidHex(advertisement.to_string()));
        }
        if advertisement.len() < BROADCAST_REQUIRED_BYTES * 2 {
            return Err(DecodeError::TooShort {
                layout: "broadcast",
                expected: BROADCAST_REQUIRED_BYTES,
                actual: advertisement.len() / 2,
            });
        }

        let bytes = hex::decode(&advertisement[..BROADCAST_REQUIRED_BYTES * 2])
            .map_err(|_| DecodeError::InvalidHex(advertisement.to_string()))?;

        let counter_start = BROADCAST_COUNTER_TOKEN * 2;
        let counter_end = (counter_start + 2).min(advertisement.len());
        let counter = &advertisement[counter_start..counter_end];
        let malformed = counter.is_empty();
        if !malformed && u8::from_str_radix(counter, 16).is_err() {
            return Err(DecodeError::InvalidHex(advertisement.to_string()));
        }

        let mac = bytes[2..8]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":");

        Ok(Self {
            mac,
            temperature: i16::from_be_bytes([bytes[8], bytes[9]]) as f32 / 10.0,
            humidity: bytes[10],
            battery: bytes[11].min(100),
            voltage: u16::from_be_bytes([bytes[12], bytes[13]]) as f32 / 1000.0,
            malformed,
            rssi: None,
        })
    }

    /// Decode raw `0x181A` service data as delivered by the transport.
    pub fn decode_service_data(data: &[u8]) -> Result<Self, DecodeError> {
        let mut raw = Vec::with_capacity(BROADCAST_SERVICE_PREFIX.len() + data.len());
        raw.extend_from_slice(&BROADCAST_SERVICE_PREFIX);
        raw.extend_from_slice(data);
        Self::decode(&hex::encode(raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        ensure_len("temperature unit", data, 1)?;
        match data[0] {
            0x00 => Ok(TemperatureUnit::Celsius),
            0x01 => Ok(TemperatureUnit::Fahrenheit),
            code => Err(DecodeError::UnknownUnit(code)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            TemperatureUnit::Celsius => 0x00,
            TemperatureUnit::Fahrenheit => 0x01,
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureUnit::Celsius => write!(f, "C"),
            TemperatureUnit::Fahrenheit => write!(f, "F"),
        }
    }
}

/// Record counters kept by the device log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredEntries {
    pub total: u32,
    pub current: u32,
}

impl StoredEntries {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        ensure_len("stored entries", data, STORED_ENTRIES_LEN)?;
        Ok(Self {
            total: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            current: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}

#[cfg(test)]
pub(crate) fn encode_history(
    index: u32,
    offset: u32,
    max_temperature: i16,
    max_humidity: u8,
    min_temperature: i16,
    min_humidity: u8,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(HISTORY_RECORD_LEN);
    data.extend_from_slice(&index.to_le_bytes());
    data.extend_from_slice(&offset.to_le_bytes());
    data.extend_from_slice(&max_temperature.to_le_bytes());
    data.push(max_humidity);
    data.extend_from_slice(&min_temperature.to_le_bytes());
    data.push(min_humidity);
    data
}

#[cfg(test)]
pub(crate) fn encode_live(temperature: i16, humidity: u8, millivolts: i16) -> Vec<u8> {
    let mut data = Vec::with_capacity(LIVE_SAMPLE_LEN);
    data.extend_from_slice(&temperature.to_le_bytes());
    data.push(humidity);
    data.extend_from_slice(&millivolts.to_le_bytes());
    data
}
