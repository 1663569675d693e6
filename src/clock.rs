//! Device clock handling and start-time inference.
//!
//! The device only knows how long it has been running. Its "current time"
//! characteristic is the epoch plus that elapsed time, shifted by a timezone
//! offset, and history records carry elapsed seconds only. Absolute
//! timestamps therefore hinge on working out when the counter started.

use chrono::{DateTime, Duration, Local};
use log::debug;

use crate::error::{DecodeError, Result};

const CLOCK_LEN: usize = 4;

/// Raw reading of the device clock characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceClock {
    /// Seconds since the epoch as the device counts them.
    pub timestamp: u32,
    /// Timezone offset in hours.
    pub tz_offset: i8,
}

impl DeviceClock {
    /// Layout: `[u32 timestamp][i8 tz_offset]`, the offset byte is optional.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < CLOCK_LEN {
            return Err(DecodeError::TooShort {
                layout: "device clock",
                expected: CLOCK_LEN,
                actual: data.len(),
            });
        }
        let timestamp = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let tz_offset = data.get(CLOCK_LEN).map_or(0, |&b| b as i8);
        Ok(Self {
            timestamp,
            tz_offset,
        })
    }

    /// Time the device has been counting, with the timezone shift removed.
    pub fn elapsed(&self) -> Duration {
        Duration::seconds(i64::from(self.timestamp)) - Duration::hours(i64::from(self.tz_offset))
    }
}

/// Infer the instant the device started counting.
pub fn resolve_start_time(clock: &DeviceClock, now: DateTime<Local>) -> DateTime<Local> {
    now - clock.elapsed()
}

/// Per-session start time, resolved at most once.
#[derive(Debug, Clone, Default)]
pub struct StartTimeCache {
    cached: Option<DateTime<Local>>,
}

impl StartTimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached start time, reading the clock through `read` only
    /// when nothing has been resolved yet.
    pub fn get_or_resolve<F>(&mut self, now: DateTime<Local>, read: F) -> Result<DateTime<Local>>
    where
        F: FnOnce() -> Result<DeviceClock>,
    {
        if let Some(start_time) = self.cached {
            return Ok(start_time);
        }
        let clock = read()?;
        let start_time = resolve_start_time(&clock, now);
        debug!("resolved device start time {} from {:?}", start_time, clock);
        self.cached = Some(start_time);
        Ok(start_time)
    }
}

/// Result of writing a setting the device may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Accepted,
    /// The device class has no way to make the write observable.
    Unsupported,
}
