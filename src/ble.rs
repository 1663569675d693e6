use std::{
    collections::HashMap,
    fmt::Display,
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::Duration,
};

use btleplug::api::{
    BDAddr, Central, Characteristic, Peripheral, PeripheralProperties, ValueNotification, WriteType,
};
#[cfg(target_os = "linux")]
use btleplug::bluez::{adapter::Adapter, manager::Manager};
#[cfg(target_os = "macos")]
use btleplug::corebluetooth::{adapter::Adapter, manager::Manager};
#[cfg(target_os = "windows")]
use btleplug::winrtble::{adapter::Adapter, manager::Manager};
use log::{debug, warn};
use rand::Rng;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{DiscoveredDevice, Scanner, Transport};

#[cfg(any(target_os = "windows", target_os = "macos"))]
pub(crate) fn get_central(manager: &Manager) -> Result<Adapter> {
    let adapters = manager
        .adapters()
        .map_err(|e| Error::Bluetooth(e, "listing adapters"))?;
    adapters.into_iter().nth(0).ok_or(Error::NoAdapter)
}

#[cfg(target_os = "linux")]
pub(crate) fn get_central(manager: &Manager) -> Result<Adapter> {
    let adapters = manager
        .adapters()
        .map_err(|e| Error::Bluetooth(e, "listing adapters"))?;
    let adapter = adapters.into_iter().nth(0).ok_or(Error::NoAdapter)?;
    adapter
        .set_powered(true)
        .map_err(|e| Error::Bluetooth(e, "powering adapter"))?;
    Ok(adapter)
}

/// A connected sensor. Notifications of every subscribed characteristic end
/// up in one channel, drained on each new subscription.
pub struct BleTransport<P: Peripheral + Display> {
    device: P,
    characteristics: Vec<Characteristic>,
    notifications: mpsc::Receiver<Vec<u8>>,
}

impl<P: Peripheral + Display> BleTransport<P> {
    fn new(device: P) -> Result<Self> {
        let (send, recv) = mpsc::channel();
        let address = device.address();
        device.on_notification(Box::new(move |notification: ValueNotification| {
            debug!(
                "received message from {}: {:x?}",
                address, notification.value
            );
            send.send(notification.value).ok();
        }));

        let mut transport = Self {
            device,
            characteristics: Vec::new(),
            notifications: recv,
        };
        transport.characteristics = transport
            .device
            .discover_characteristics()
            .map_err(|e| Error::Bluetooth(e, "discovering characteristics"))?;
        debug!(
            "discovered {} characteristics on {}",
            transport.characteristics.len(),
            transport.device
        );
        Ok(transport)
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .ok_or(Error::CharacteristicNotFound(uuid))
    }
}

impl<P: Peripheral + Display> Transport for BleTransport<P> {
    fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.characteristic(characteristic)?;
        self.device
            .read(characteristic)
            .map_err(|e| Error::Bluetooth(e, "reading characteristic"))
    }

    fn write(&mut self, characteristic: Uuid, value: &[u8]) -> Result<()> {
        let characteristic = self.characteristic(characteristic)?;
        self.device
            .write(characteristic, value, WriteType::WithResponse)
            .map_err(|e| Error::Bluetooth(e, "writing characteristic"))
    }

    fn subscribe(&mut self, characteristic: Uuid) -> Result<()> {
        while self.notifications.try_recv().is_ok() {}
        let characteristic = self.characteristic(characteristic)?;
        self.device
            .subscribe(characteristic)
            .map_err(|e| Error::Bluetooth(e, "subscribing"))
    }

    fn unsubscribe(&mut self, characteristic: Uuid) -> Result<()> {
        let characteristic = self.characteristic(characteristic)?;
        self.device
            .unsubscribe(characteristic)
            .map_err(|e| Error::Bluetooth(e, "unsubscribing"))
    }

    fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.notifications.recv_timeout(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(RecvTimeoutError::Timeout) if self.device.is_connected() => Ok(None),
            Err(_) => Err(Error::Disconnected),
        }
    }
}

impl<P: Peripheral + Display> Drop for BleTransport<P> {
    fn drop(&mut self) {
        if self.device.is_connected() {
            debug!("disconnecting from {}", self.device);
            self.device.disconnect().ok();
        }
    }
}

/// Connect to `address`, retrying up to `retry` times with a short jitter.
pub fn connect(
    central: &Adapter,
    address: &str,
    retry: u16,
) -> Result<BleTransport<impl Peripheral + Display>> {
    let addr: BDAddr = address
        .parse()
        .map_err(|_| Error::InvalidAddress(address.to_string()))?;
    let device = central.peripheral(addr).ok_or(Error::DeviceNotFound)?;

    let mut attempt = 0;
    loop {
        match device.connect() {
            Ok(_) => break,
            Err(e) if attempt < retry => {
                warn!("failed to connect to {}: {}", device, e);
                attempt += 1;
                debug!("{}-th try to connect to {} failed", attempt, device);
                thread::sleep(Duration::from_millis(rand::thread_rng().gen_range(10..50)));
            }
            Err(e) => return Err(Error::FailedToConnect(e, device.to_string())),
        }
    }
    debug!("connected to {}", device);

    BleTransport::new(device)
}

/// Turn adapter peripherals into discovered devices, keeping only those
/// with advertising reports newer than `before`, a map of address to
/// discovery count taken when the scan started.
///
/// CoreBluetooth never bumps `discovery_count`, so there every cached
/// peripheral is kept. `btleplug` 0.7 does not expose the advertisement
/// RSSI, so `rssi` is always `None`.
fn fresh_devices<I>(before: &HashMap<BDAddr, u32>, after: I) -> Vec<DiscoveredDevice>
where
    I: IntoIterator<Item = (BDAddr, PeripheralProperties)>,
{
    after
        .into_iter()
        .filter(|(address, properties)| {
            cfg!(target_os = "macos")
                || before
                    .get(address)
                    .map_or(true, |count| properties.discovery_count > *count)
        })
        .map(|(address, properties)| DiscoveredDevice {
            address: address.to_string(),
            service_data: properties.service_data,
            rssi: None,
        })
        .collect()
}

pub struct BleScanner<'a> {
    central: &'a Adapter,
}

impl<'a> BleScanner<'a> {
    pub fn new(central: &'a Adapter) -> Self {
        Self { central }
    }

    fn snapshot(&self) -> Vec<(BDAddr, PeripheralProperties)> {
        self.central
            .peripherals()
            .into_iter()
            .map(|peripheral| (peripheral.address(), peripheral.properties()))
            .collect()
    }
}

impl Scanner for BleScanner<'_> {
    fn scan(&mut self, duration: Duration) -> Result<Vec<DiscoveredDevice>> {
        let before: HashMap<BDAddr, u32> = self
            .snapshot()
            .into_iter()
            .map(|(address, properties)| (address, properties.discovery_count))
            .collect();
        self.central
            .start_scan()
            .map_err(|e| Error::Bluetooth(e, "starting scan"))?;
        debug!("listening for advertisements for {:?}", duration);
        thread::sleep(duration);

        let devices = fresh_devices(&before, self.snapshot());
        debug!("{} devices advertised during the scan", devices.len());
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::UUID_BROADCAST_SERVICE;

    fn properties(discovery_count: u32) -> PeripheralProperties {
        let mut properties = PeripheralProperties::default();
        properties.discovery_count = discovery_count;
        properties
            .service_data
            .insert(UUID_BROADCAST_SERVICE, vec![0xa4, 0xc1, 0x38]);
        properties
    }

    #[test]
    fn test_fresh_devices_carry_service_data_without_rssi() {
        let address: BDAddr = "A4:C1:38:01:02:03".parse().unwrap();
        let devices = fresh_devices(&HashMap::new(), vec![(address, properties(1))]);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "A4:C1:38:01:02:03");
        assert_eq!(devices[0].service_data[&UUID_BROADCAST_SERVICE], vec![0xa4, 0xc1, 0x38]);
        assert_eq!(devices[0].rssi, None);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_fresh_devices_drop_quiet_peripherals() {
        let quiet: BDAddr = "A4:C1:38:01:02:03".parse().unwrap();
        let active: BDAddr = "A4:C1:38:04:05:06".parse().unwrap();
        let mut before = HashMap::new();
        before.insert(quiet, 4);
        before.insert(active, 4);

        let devices = fresh_devices(&before, vec![(quiet, properties(4)), (active, properties(5))]);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "A4:C1:38:04:05:06");
    }
}
