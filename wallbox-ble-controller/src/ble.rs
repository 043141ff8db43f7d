//! btleplug backend
//!
//! Scans for chargers and opens sessions to one of them, identified by its
//! Bluetooth address or advertised name. Pairing is left to the platform
//! stack (BlueZ pairs on demand when an encrypted characteristic is used).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use futures::stream::BoxStream;
use log::*;
use tokio::sync::mpsc;
use uuid::Uuid;

use wallbox_proto::ble::{RX_CHAR_UUID, SERVICE_UUID, TX_CHAR_UUID, is_charger_name};

use crate::TransportError;
use crate::transport::{Connector, Link, Session};

const NOTIFICATION_QUEUE: usize = 64;

/// A peripheral seen during a scan
#[derive(Debug, Clone, serde::Serialize)]
pub struct DiscoveredCharger {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_wallbox: bool,
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(TransportError::NoAdapter)
}

/// Scan for BLE devices
///
/// Returns everything seen; chargers have `is_wallbox = true`.
pub async fn scan(duration: Duration) -> Result<Vec<DiscoveredCharger>, TransportError> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let devices = discovered(&adapter).await;
    after_scan(devices, adapter.stop_scan()).await
}

async fn discovered(adapter: &Adapter) -> Result<Vec<DiscoveredCharger>, TransportError> {
    let mut devices = Vec::new();

    for peripheral in adapter.peripherals().await? {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let address = peripheral.address().to_string();
            let rssi = props.rssi;
            let is_wallbox = is_charger_name(&name) || props.services.contains(&SERVICE_UUID);

            devices.push(DiscoveredCharger { name, address, rssi, is_wallbox });
        }
    }
    Ok(devices)
}

/// Stop scanning, then hand back the result of the work done while
/// scanning. The scan is stopped even when that work failed, and its error
/// wins over a failure to stop.
async fn after_scan<T, S>(work: Result<T, TransportError>, stop: S) -> Result<T, TransportError>
where
    S: Future<Output = Result<(), btleplug::Error>>,
{
    let stopped = stop.await;
    let value = work?;
    stopped?;
    Ok(value)
}

async fn matches_target(peripheral: &Peripheral, target: &str) -> Result<bool, TransportError> {
    if peripheral.address().to_string().eq_ignore_ascii_case(target) {
        return Ok(true);
    }
    let name = peripheral.properties().await?.and_then(|p| p.local_name);
    Ok(name.as_deref() == Some(target))
}

async fn find_peripheral(adapter: &Adapter, target: &str) -> Result<Option<Peripheral>, TransportError> {
    for peripheral in adapter.peripherals().await? {
        if matches_target(&peripheral, target).await? {
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic, TransportError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or(TransportError::CharacteristicNotFound(uuid))
}

/// Connects to one charger through the system's default adapter
pub struct BtleConnector {
    target: String,
    scan_timeout: Duration,
}

impl BtleConnector {
    /// `target` is a Bluetooth address (`AA:BB:CC:DD:EE:FF`) or the
    /// advertised name (`WB123456`)
    pub fn new(target: impl Into<String>, scan_timeout: Duration) -> Self {
        Self { target: target.into(), scan_timeout }
    }

    async fn locate(&self, adapter: &Adapter) -> Result<Peripheral, TransportError> {
        if let Some(peripheral) = find_peripheral(adapter, &self.target).await? {
            return Ok(peripheral);
        }

        debug!("{} not known to the adapter yet, scanning", self.target);
        adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(self.scan_timeout).await;
        let found = find_peripheral(adapter, &self.target).await;
        after_scan(found, adapter.stop_scan())
            .await?
            .ok_or_else(|| TransportError::DeviceNotFound(self.target.clone()))
    }
}

#[async_trait]
impl Connector for BtleConnector {
    fn target(&self) -> &str {
        &self.target
    }

    async fn connect(&self) -> Result<Session, TransportError> {
        let adapter = get_adapter().await?;
        let peripheral = self.locate(&adapter).await?;

        // subscribe before connecting so an immediate drop is not missed
        let events = adapter.events().await?;
        peripheral.connect().await?;

        match open_session(&peripheral, events).await {
            Ok(session) => Ok(session),
            Err(e) => {
                if let Err(err) = peripheral.disconnect().await {
                    warn!("Failed to disconnect after setup error: {err}");
                }
                Err(e)
            }
        }
    }
}

async fn open_session(
    peripheral: &Peripheral,
    events: BoxStream<'static, CentralEvent>,
) -> Result<Session, TransportError> {
    peripheral.discover_services().await?;

    let rx_char = find_characteristic(peripheral, RX_CHAR_UUID)?;
    let tx_char = find_characteristic(peripheral, TX_CHAR_UUID)?;

    peripheral.subscribe(&tx_char).await?;
    let notifications = peripheral.notifications().await?;

    let connected = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);
    tokio::spawn(pump(peripheral.id(), notifications, events, tx, connected.clone()));

    let link = BtleLink { peripheral: peripheral.clone(), rx_char, connected };
    Ok(Session { link: Arc::new(link), notifications: rx })
}

/// Forward TX notifications until the charger disconnects or the session
/// is dropped. Dropping `tx` on exit closes the session's chunk stream.
async fn pump(
    id: PeripheralId,
    mut notifications: BoxStream<'static, ValueNotification>,
    mut events: BoxStream<'static, CentralEvent>,
    tx: mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            notification = notifications.next() => match notification {
                Some(n) if n.uuid == TX_CHAR_UUID => {
                    if tx.send(n.value).await.is_err() {
                        break;
                    }
                }
                Some(_) => {}
                None => break,
            },
            event = events.next() => match event {
                Some(CentralEvent::DeviceDisconnected(peer)) if peer == id => break,
                Some(_) => {}
                None => break,
            },
            _ = tx.closed() => break,
        }
    }
    connected.store(false, Ordering::SeqCst);
}

struct BtleLink {
    peripheral: Peripheral,
    rx_char: Characteristic,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl Link for BtleLink {
    async fn write(&self, frame: &[u8], with_response: bool) -> Result<(), TransportError> {
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral.write(&self.rx_char, frame, write_type).await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
