use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{DeviceClock, StartTimeCache, WriteOutcome};
use crate::decode::{SensorSample, StoredEntries, TemperatureUnit};
use crate::error::{Error, Result};
use crate::history::{History, HistorySync, SyncReport};
use crate::transport::{
    Transport, UUID_DATA, UUID_FIRMWARE, UUID_HARDWARE, UUID_NUM_RECORDS, UUID_TIME, UUID_UNITS,
};

/// Called for each history record while syncing, with its timestamp and
/// minimum and maximum temperature.
pub type ProgressReporter = Box<dyn FnMut(DateTime<Local>, f32, f32) + Send>;
pub type WallClock = Box<dyn Fn() -> DateTime<Local> + Send>;

#[inline]
fn default_notification_timeout() -> Duration {
    Duration::from_secs(15)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    // How long to wait for a single notification
    // optional, default: 15s
    #[serde(with = "humantime_serde", default = "default_notification_timeout")]
    pub notification_timeout: Duration,
    // Report every history record as it arrives
    // optional, default: false
    #[serde(default)]
    pub history_progress: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            notification_timeout: default_notification_timeout(),
            history_progress: false,
        }
    }
}

/// One line per history record, printed while `history_progress` is on.
pub fn progress_line(timestamp: DateTime<Local>, min_temperature: f32, max_temperature: f32) -> String {
    format!("{}: {} to {}", timestamp, min_temperature, max_temperature)
}

fn read_clock<T: Transport + ?Sized>(transport: &mut T) -> Result<DeviceClock> {
    let value = transport.read(UUID_TIME)?;
    Ok(DeviceClock::decode(&value)?)
}

fn read_text<T: Transport + ?Sized>(transport: &mut T, characteristic: Uuid) -> Result<String> {
    let value = transport.read(characteristic)?;
    Ok(value.into_iter().map(char::from).collect())
}

/// One connection to one sensor.
///
/// The start time cache and the history map live exactly as long as the
/// session; a reconnect gets a fresh session, since the device may have
/// restarted in between.
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    start_time: StartTimeCache,
    history: History,
    data: Option<SensorSample>,
    clock: WallClock,
    progress: ProgressReporter,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            start_time: StartTimeCache::new(),
            history: History::new(),
            data: None,
            clock: Box::new(Local::now),
            progress: Box::new(|timestamp: DateTime<Local>, min: f32, max: f32| {
                println!("{}", progress_line(timestamp, min, max))
            }),
        }
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Local> + Send + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_progress_reporter<F>(mut self, reporter: F) -> Self
    where
        F: FnMut(DateTime<Local>, f32, f32) + Send + 'static,
    {
        self.progress = Box::new(reporter);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_history_progress(&mut self, enabled: bool) {
        self.config.history_progress = enabled;
    }

    /// Wait for one live notification and keep it as the current reading.
    pub fn reading(&mut self) -> Result<SensorSample> {
        self.transport.subscribe(UUID_DATA)?;
        let received = self
            .transport
            .wait_for_notification(self.config.notification_timeout);
        if let Err(e) = self.transport.unsubscribe(UUID_DATA) {
            warn!("failed to release live data subscription: {}", e);
        }

        let value = received?.ok_or(Error::NoData("live reading"))?;
        let sample = SensorSample::decode(&value)?;
        debug!("live reading {:?}", sample);
        self.data = Some(sample);
        Ok(sample)
    }

    /// Last reading taken in this session.
    pub fn data(&self) -> Option<SensorSample> {
        self.data
    }

    pub fn battery(&self) -> Option<u8> {
        self.data.map(|sample| sample.battery)
    }

    pub fn units(&mut self) -> Result<TemperatureUnit> {
        let value = self.transport.read(UUID_UNITS)?;
        Ok(TemperatureUnit::decode(&value)?)
    }

    pub fn set_units(&mut self, unit: TemperatureUnit) -> Result<WriteOutcome> {
        self.transport.write(UUID_UNITS, &[unit.code()])?;
        Ok(WriteOutcome::Accepted)
    }

    pub fn time(&mut self) -> Result<DeviceClock> {
        read_clock(&mut self.transport)
    }

    /// The sensor has no display, so its clock is left alone.
    pub fn set_time(&mut self, time: DateTime<Local>) -> WriteOutcome {
        debug!("ignoring clock write {}: not supported by this device", time);
        WriteOutcome::Unsupported
    }

    pub fn set_tz_offset(&mut self, tz_offset: i8) -> WriteOutcome {
        debug!(
            "ignoring timezone write {}: not supported by this device",
            tz_offset
        );
        WriteOutcome::Unsupported
    }

    /// When the device started counting, resolved once per session.
    pub fn start_time(&mut self) -> Result<DateTime<Local>> {
        let now = (self.clock)();
        let transport = &mut self.transport;
        self.start_time.get_or_resolve(now, || read_clock(transport))
    }

    pub fn stored_entries(&mut self) -> Result<StoredEntries> {
        let value = self.transport.read(UUID_NUM_RECORDS)?;
        Ok(StoredEntries::decode(&value)?)
    }

    /// Pull the device log into `history()`. Slow: the device replays every
    /// stored hour one notification at a time.
    pub fn sync_history(&mut self) -> Result<SyncReport> {
        let start_time = self.start_time()?;
        let now = (self.clock)();

        let Self {
            transport,
            config,
            history,
            progress,
            ..
        } = self;
        let report_progress = config.history_progress;
        let mut sync = HistorySync::new(start_time, now, history);
        sync.run(transport, config.notification_timeout, |record| {
            if report_progress {
                progress(
                    record.timestamp,
                    record.min_temperature,
                    record.max_temperature,
                );
            }
        })
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn firmware(&mut self) -> Result<String> {
        read_text(&mut self.transport, UUID_FIRMWARE)
    }

    pub fn hardware(&mut self) -> Result<String> {
        read_text(&mut self.transport, UUID_HARDWARE)
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{encode_history, encode_live};
    use crate::history::StopReason;
    use crate::mock::{MockTransport, Scripted};
    use crate::transport::UUID_HISTORY;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    fn now() -> DateTime<Local> {
        Local.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn clock_bytes(timestamp: u32, tz_offset: i8) -> Vec<u8> {
        let mut value = timestamp.to_le_bytes().to_vec();
        value.push(tz_offset as u8);
        value
    }

    fn session(transport: MockTransport) -> Session<MockTransport> {
        Session::new(transport, SessionConfig::default()).with_clock(now)
    }

    #[test]
    fn test_reading() {
        let mut session = session(MockTransport::new().with_notification(encode_live(2500, 55, 3000)));
        assert_eq!(session.data(), None);
        assert_eq!(session.battery(), None);

        let sample = session.reading().unwrap();

        assert_eq!(sample.temperature, 25.0);
        assert_eq!(sample.humidity, 55);
        assert_eq!(session.battery(), Some(90));
        assert_eq!(session.data(), Some(sample));

        let transport = session.into_transport();
        assert_eq!(transport.subscribed, vec![UUID_DATA]);
        assert_eq!(transport.unsubscribed, vec![UUID_DATA]);
    }

    #[test]
    fn test_reading_without_notification() {
        let mut session = session(MockTransport::new().with_scripted(Scripted::Timeout));
        assert!(matches!(session.reading(), Err(Error::NoData(_))));
        assert_eq!(session.data(), None);
    }

    #[test]
    fn test_reading_decode_failure_is_reported() {
        let mut session = session(MockTransport::new().with_notification(vec![0xc4, 0x09]));
        assert!(matches!(session.reading(), Err(Error::Decode(_))));
        assert_eq!(session.data(), None);
    }

    #[test]
    fn test_reading_kept_when_release_fails() {
        let transport = MockTransport::new()
            .with_notification(encode_live(2500, 55, 3000))
            .with_failing_unsubscribe();
        let mut session = session(transport);

        let sample = session.reading().unwrap();
        assert_eq!(sample.temperature, 25.0);
        assert_eq!(session.data(), Some(sample));
    }

    #[test]
    fn test_reading_disconnect_not_masked_by_release_failure() {
        let transport = MockTransport::new()
            .with_scripted(Scripted::Disconnect)
            .with_failing_unsubscribe();
        let mut session = session(transport);

        assert!(matches!(session.reading(), Err(Error::Disconnected)));
        assert_eq!(session.data(), None);
    }

    #[test]
    fn test_start_time_read_once() {
        let transport = MockTransport::new()
            .with_read(UUID_TIME, clock_bytes(7_200, 0))
            .with_read(UUID_TIME, clock_bytes(50_000, 2));
        let mut session = session(transport);

        let first = session.start_time().unwrap();
        let second = session.start_time().unwrap();

        assert_eq!(first, now() - chrono::Duration::hours(2));
        assert_eq!(first, second);
        assert_eq!(session.into_transport().reads_of(UUID_TIME), 1);
    }

    #[test]
    fn test_new_session_resolves_again() {
        let transport = MockTransport::new().with_read(UUID_TIME, clock_bytes(7_200, 0));
        let mut first = session(transport);
        first.start_time().unwrap();

        assert_eq!(first.into_transport().reads_of(UUID_TIME), 1);

        let transport = MockTransport::new().with_read(UUID_TIME, clock_bytes(3_600, 0));
        let mut second = session(transport);
        assert_eq!(second.start_time().unwrap(), now() - chrono::Duration::hours(1));
    }

    #[test]
    fn test_progress_line() {
        assert_eq!(
            progress_line(now(), 18.5, 21.5),
            format!("{}: 18.5 to 21.5", now())
        );
    }

    #[test]
    fn test_sync_history_with_progress() {
        let transport = MockTransport::new()
            .with_read(UUID_TIME, clock_bytes(36_000, 0))
            .with_notification(encode_history(1, 8 * 3600, 215, 60, 180, 40))
            .with_notification(encode_history(2, 9 * 3600, 220, 61, 185, 42));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let reporter = {
            let seen = seen.clone();
            move |timestamp: DateTime<Local>, min: f32, max: f32| {
                seen.lock().unwrap().push((timestamp, min, max))
            }
        };
        let mut session = Session::new(
            transport,
            SessionConfig {
                history_progress: true,
                ..SessionConfig::default()
            },
        )
        .with_clock(now)
        .with_progress_reporter(reporter);

        let report = session.sync_history().unwrap();

        assert_eq!(report.reason, StopReason::CaughtUp);
        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[&1].timestamp, now() - chrono::Duration::hours(2));
        assert_eq!(history[&2].timestamp, now() - chrono::Duration::hours(1));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (now() - chrono::Duration::hours(2), 18.0, 21.5),
                (now() - chrono::Duration::hours(1), 18.5, 22.0),
            ]
        );
        assert_eq!(session.into_transport().unsubscribed, vec![UUID_HISTORY]);
    }

    #[test]
    fn test_sync_history_progress_disabled() {
        let transport = MockTransport::new()
            .with_read(UUID_TIME, clock_bytes(36_000, 0))
            .with_notification(encode_history(1, 3600, 215, 60, 180, 40));
        let calls = Arc::new(Mutex::new(0));
        let reporter = {
            let calls = calls.clone();
            move |_: DateTime<Local>, _: f32, _: f32| *calls.lock().unwrap() += 1
        };
        let mut session = session(transport).with_progress_reporter(reporter);

        let report = session.sync_history().unwrap();

        assert_eq!(report.reason, StopReason::Exhausted);
        assert_eq!(session.history().len(), 1);
        assert_eq!(*calls.lock().unwrap(), 0);

        session.set_history_progress(true);
        assert!(session.config().history_progress);
    }

    #[test]
    fn test_sync_history_fails_without_clock() {
        let mut session = session(MockTransport::new().with_notification(encode_history(1, 0, 1, 1, 1, 1)));
        assert!(matches!(
            session.sync_history(),
            Err(Error::CharacteristicNotFound(uuid)) if uuid == UUID_TIME
        ));
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_clock_writes_are_unsupported() {
        let mut session = session(MockTransport::new());
        assert_eq!(session.set_time(now()), WriteOutcome::Unsupported);
        assert_eq!(session.set_tz_offset(2), WriteOutcome::Unsupported);
        assert!(session.into_transport().writes.is_empty());
    }

    #[test]
    fn test_units() {
        let mut session = session(MockTransport::new().with_read(UUID_UNITS, vec![0x01]));
        assert_eq!(session.units().unwrap(), TemperatureUnit::Fahrenheit);
        assert_eq!(
            session.set_units(TemperatureUnit::Celsius).unwrap(),
            WriteOutcome::Accepted
        );
        assert_eq!(session.into_transport().writes, vec![(UUID_UNITS, vec![0x00])]);
    }

    #[test]
    fn test_revisions_and_counters() {
        let mut entries = 152u32.to_le_bytes().to_vec();
        entries.extend_from_slice(&153u32.to_le_bytes());
        let transport = MockTransport::new()
            .with_read(UUID_FIRMWARE, b"1.0.0_0109".to_vec())
            .with_read(UUID_HARDWARE, vec![0x42, 0x31, 0xe9])
            .with_read(UUID_NUM_RECORDS, entries);
        let mut session = session(transport);

        assert_eq!(session.firmware().unwrap(), "1.0.0_0109");
        assert_eq!(session.hardware().unwrap(), "B1\u{e9}");
        assert_eq!(session.stored_entries().unwrap().total, 152);
    }
}
