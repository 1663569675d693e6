//! Replay of the hourly min/max log stored on the device.
//!
//! Once subscribed, the device streams every stored record, oldest first.
//! It never tells us the stream is over, so the sync stops either when the
//! newest record reaches the last closed hour or when the device goes quiet.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Local};
use log::{debug, info, warn};

use crate::decode::HistoryRecord;
use crate::error::{DecodeError, Result};
use crate::transport::{Transport, UUID_HISTORY};

/// Records accumulated by a session, keyed by device index.
pub type History = BTreeMap<u32, HistoryRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The newest record reached the last closed hour.
    CaughtUp,
    /// No notification arrived within the timeout.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Running,
    Done(StopReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub reason: StopReason,
    /// Records decoded during this run, re-deliveries included.
    pub received: usize,
    pub latest_record: Option<DateTime<Local>>,
    pub expected_end: DateTime<Local>,
}

pub struct HistorySync<'a> {
    start_time: DateTime<Local>,
    expected_end: DateTime<Local>,
    latest_record: Option<DateTime<Local>>,
    received: usize,
    records: &'a mut History,
}

impl<'a> HistorySync<'a> {
    /// Start a fresh sync into `records`, which is cleared.
    ///
    /// The current hour is only logged once it closes, so the newest record
    /// we can expect is the one an hour before `now`.
    pub fn new(start_time: DateTime<Local>, now: DateTime<Local>, records: &'a mut History) -> Self {
        records.clear();
        Self {
            start_time,
            expected_end: now - chrono::Duration::hours(1),
            latest_record: None,
            received: 0,
            records,
        }
    }

    pub fn latest_record(&self) -> Option<DateTime<Local>> {
        self.latest_record
    }

    pub fn state(&self) -> SyncState {
        match self.latest_record {
            Some(latest) if latest >= self.expected_end => SyncState::Done(StopReason::CaughtUp),
            _ => SyncState::Running,
        }
    }

    /// Decode one notification and store it, replacing any record already
    /// held at the same index.
    pub fn ingest(&mut self, payload: &[u8]) -> Result<&HistoryRecord, DecodeError> {
        let record = HistoryRecord::decode(payload, self.start_time)?;
        self.received += 1;
        self.latest_record = Some(match self.latest_record {
            Some(latest) if latest > record.timestamp => latest,
            _ => record.timestamp,
        });

        let index = record.index;
        self.records.insert(index, record);
        Ok(&self.records[&index])
    }

    /// Subscribe to the history characteristic and consume notifications
    /// until done. The subscription is released on every exit path; a
    /// transport error ends the run but keeps what was already stored.
    pub fn run<T, P>(&mut self, transport: &mut T, timeout: Duration, mut progress: P) -> Result<SyncReport>
    where
        T: Transport + ?Sized,
        P: FnMut(&HistoryRecord),
    {
        info!(
            "syncing history, expecting records up to {}",
            self.expected_end
        );
        transport.subscribe(UUID_HISTORY)?;

        let result = self.drain(transport, timeout, &mut progress);
        if let Err(e) = transport.unsubscribe(UUID_HISTORY) {
            warn!("failed to release history subscription: {}", e);
        }
        let reason = result?;

        info!(
            "history sync finished ({:?}) with {} records, latest {:?}",
            reason,
            self.records.len(),
            self.latest_record()
        );
        Ok(SyncReport {
            reason,
            received: self.received,
            latest_record: self.latest_record(),
            expected_end: self.expected_end,
        })
    }

    fn drain<T, P>(&mut self, transport: &mut T, timeout: Duration, progress: &mut P) -> Result<StopReason>
    where
        T: Transport + ?Sized,
        P: FnMut(&HistoryRecord),
    {
        loop {
            let payload = match transport.wait_for_notification(timeout)? {
                Some(payload) => payload,
                None => {
                    debug!("no history notification for {:?}, stream exhausted", timeout);
                    return Ok(StopReason::Exhausted);
                }
            };

            match self.ingest(&payload) {
                Ok(record) => progress(record),
                Err(e) => warn!("skipping history record {:x?}: {}", payload, e),
            }

            if let SyncState::Done(reason) = self.state() {
                return Ok(reason);
            }
        }
    }
}
