//! Bridge between the blocking Bluetooth backend and async callers.
//!
//! `btleplug` is driven from a single dedicated thread running
//! [`Backend::serve`]. Each request connects, builds a fresh [`Session`],
//! does its work and disconnects again before the answer is sent back.

#[cfg(target_os = "linux")]
use btleplug::bluez::{adapter::Adapter, manager::Manager};
#[cfg(target_os = "macos")]
use btleplug::corebluetooth::{adapter::Adapter, manager::Manager};
#[cfg(target_os = "windows")]
use btleplug::winrtble::{adapter::Adapter, manager::Manager};
use btleplug::api::Central;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::ble::{self, get_central, BleScanner};
use crate::broadcast::{BroadcastClient, BroadcastConfig};
use crate::decode::BroadcastSample;
use crate::error::{Error, Result};
use crate::message::{DeviceInfo, Payload};
use crate::session::{Session, SessionConfig};
use crate::transport::Transport;

#[inline]
fn default_connect_retry() -> u16 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(flatten)]
    pub session: SessionConfig,
    #[serde(flatten)]
    pub broadcast: BroadcastConfig,
    // Max number of retry when connection fails
    // optional, default: 3
    #[serde(default = "default_connect_retry")]
    pub connect_retry: u16,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            broadcast: BroadcastConfig::default(),
            connect_retry: default_connect_retry(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Reading,
    History,
    Info,
}

#[derive(Debug)]
struct PollRequest {
    address: String,
    kind: RequestKind,
    callback_channel: oneshot::Sender<Result<Payload>>,
}

#[derive(Debug)]
enum BusMessage {
    Poll(PollRequest),
    Scan(oneshot::Sender<Result<Vec<BroadcastSample>>>),
    Terminate,
}

pub(crate) fn serve_request<T: Transport>(mut session: Session<T>, kind: RequestKind) -> Result<Payload> {
    match kind {
        RequestKind::Reading => Ok(Payload::Reading(session.reading()?)),
        RequestKind::History => match session.sync_history() {
            Ok(report) => Ok(Payload::History {
                records: session.history().clone(),
                stop: Some(report.reason),
            }),
            Err(e) if !session.history().is_empty() => {
                warn!(
                    "history sync interrupted after {} records: {}",
                    session.history().len(),
                    e
                );
                Ok(Payload::History {
                    records: session.history().clone(),
                    stop: None,
                })
            }
            Err(e) => Err(e),
        },
        RequestKind::Info => Ok(Payload::Info(DeviceInfo {
            firmware: session.firmware()?,
            hardware: session.hardware()?,
            units: session.units()?,
            entries: session.stored_entries()?,
        })),
    }
}

pub struct Backend {
    control_recv: mpsc::UnboundedReceiver<BusMessage>,
    config: BackendConfig,

    _manager: Manager,
    central: Adapter,
}

impl Backend {
    fn new(recv: mpsc::UnboundedReceiver<BusMessage>, config: BackendConfig) -> Result<Self> {
        let manager = Manager::new().map_err(|e| Error::Bluetooth(e, "initializing manager"))?;
        let central = get_central(&manager)?;

        central
            .start_scan()
            .map_err(|e| Error::Bluetooth(e, "starting scan"))?;

        Ok(Self {
            control_recv: recv,
            config,
            _manager: manager,
            central,
        })
    }

    fn poll(&self, address: &str, kind: RequestKind) -> Result<Payload> {
        let transport = ble::connect(&self.central, address, self.config.connect_retry)?;
        info!("connected to {}, serving {:?}", address, kind);
        serve_request(Session::new(transport, self.config.session.clone()), kind)
    }

    pub fn serve(mut self) {
        while let Some(command) = self.control_recv.blocking_recv() {
            match command {
                BusMessage::Poll(PollRequest {
                    address,
                    kind,
                    callback_channel,
                }) => {
                    debug!("polling {} for {:?}", address, kind);
                    callback_channel.send(self.poll(&address, kind)).ok();
                }
                BusMessage::Scan(callback_channel) => {
                    let client = BroadcastClient::new(self.config.broadcast.clone());
                    let mut scanner = BleScanner::new(&self.central);
                    callback_channel.send(client.collect(&mut scanner)).ok();
                }
                BusMessage::Terminate => {
                    break;
                }
            }
        }
        debug!("bluetooth backend stopped");
    }
}

pub struct Hub {
    control_send: mpsc::UnboundedSender<BusMessage>,
}

impl Hub {
    fn new(send: mpsc::UnboundedSender<BusMessage>) -> Self {
        Self { control_send: send }
    }

    pub async fn poll(&self, address: &str, kind: RequestKind) -> Result<Payload> {
        let (send, recv) = oneshot::channel();
        self.control_send
            .send(BusMessage::Poll(PollRequest {
                address: address.to_string(),
                kind,
                callback_channel: send,
            }))
            .map_err(|_| Error::BackendDead)?;
        recv.await.map_err(|_| Error::BackendDead)?
    }

    pub async fn scan(&self) -> Result<Vec<BroadcastSample>> {
        let (send, recv) = oneshot::channel();
        self.control_send
            .send(BusMessage::Scan(send))
            .map_err(|_| Error::BackendDead)?;
        recv.await.map_err(|_| Error::BackendDead)?
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.control_send.send(BusMessage::Terminate).ok();
    }
}

pub fn init(config: BackendConfig) -> Result<(Hub, Backend)> {
    let (send, recv) = mpsc::unbounded_channel();
    let hub = Hub::new(send);
    let backend = Backend::new(recv, config)?;
    Ok((hub, backend))
}
