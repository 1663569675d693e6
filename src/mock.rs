//! Scripted transport and scanner for exercising the session logic.

use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{DiscoveredDevice, Scanner, Transport};

#[derive(Debug, Clone)]
pub enum Scripted {
    Notify(Vec<u8>),
    Timeout,
    Disconnect,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    pub reads: HashMap<Uuid, VecDeque<Vec<u8>>>,
    pub read_count: HashMap<Uuid, usize>,
    pub writes: Vec<(Uuid, Vec<u8>)>,
    pub notifications: VecDeque<Scripted>,
    pub subscribed: Vec<Uuid>,
    pub unsubscribed: Vec<Uuid>,
    pub unsubscribe_fails: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a value for the next read of `characteristic`. The last queued
    /// value keeps being returned once the queue is down to one entry.
    pub fn with_read(mut self, characteristic: Uuid, value: Vec<u8>) -> Self {
        self.reads.entry(characteristic).or_default().push_back(value);
        self
    }

    pub fn with_notification(mut self, value: Vec<u8>) -> Self {
        self.notifications.push_back(Scripted::Notify(value));
        self
    }

    pub fn with_scripted(mut self, step: Scripted) -> Self {
        self.notifications.push_back(step);
        self
    }

    /// Make every `unsubscribe` fail, as if the link went away after the
    /// last notification.
    pub fn with_failing_unsubscribe(mut self) -> Self {
        self.unsubscribe_fails = true;
        self
    }

    pub fn reads_of(&self, characteristic: Uuid) -> usize {
        self.read_count.get(&characteristic).copied().unwrap_or(0)
    }
}

impl Transport for MockTransport {
    fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>> {
        *self.read_count.entry(characteristic).or_default() += 1;
        let queue = self
            .reads
            .get_mut(&characteristic)
            .ok_or(Error::CharacteristicNotFound(characteristic))?;
        match queue.len() {
            0 => Err(Error::CharacteristicNotFound(characteristic)),
            1 => Ok(queue[0].clone()),
            _ => Ok(queue.pop_front().unwrap_or_default()),
        }
    }

    fn write(&mut self, characteristic: Uuid, value: &[u8]) -> Result<()> {
        self.writes.push((characteristic, value.to_vec()));
        Ok(())
    }

    fn subscribe(&mut self, characteristic: Uuid) -> Result<()> {
        self.subscribed.push(characteristic);
        Ok(())
    }

    fn unsubscribe(&mut self, characteristic: Uuid) -> Result<()> {
        if self.unsubscribe_fails {
            return Err(Error::CharacteristicNotFound(characteristic));
        }
        self.unsubscribed.push(characteristic);
        Ok(())
    }

    fn wait_for_notification(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.notifications.pop_front() {
            Some(Scripted::Notify(value)) => Ok(Some(value)),
            Some(Scripted::Timeout) | None => Ok(None),
            Some(Scripted::Disconnect) => Err(Error::Disconnected),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockScanner {
    /// Each scan pops one result; an exhausted script reports a disconnect.
    pub passes: VecDeque<Result<Vec<DiscoveredDevice>>>,
    pub scans: usize,
}

impl MockScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pass(mut self, pass: Result<Vec<DiscoveredDevice>>) -> Self {
        self.passes.push_back(pass);
        self
    }
}

impl Scanner for MockScanner {
    fn scan(&mut self, _duration: Duration) -> Result<Vec<DiscoveredDevice>> {
        self.scans += 1;
        self.passes.pop_front().unwrap_or(Err(Error::Disconnected))
    }
}
