//! btleplug-backed implementations of the [`Transport`] and [`Discovery`]
//! traits, plus the task that routes GATT notifications into a session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::constants::{INFO_SERVICE, SCAN_POLL_DELAY};
use crate::error::TransportError;
use crate::session::Session;
use crate::transport::{DiscoveredDevice, Discovery, Transport};
use crate::types::PeripheralIdentity;

/// One wand peripheral as seen by btleplug.
pub struct BlePeripheral {
    peripheral: Peripheral,
}

impl BlePeripheral {
    pub fn new(peripheral: Peripheral) -> BlePeripheral {
        BlePeripheral { peripheral }
    }

    fn characteristic(&self, characteristic: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(TransportError::MissingCharacteristic(characteristic))
    }
}

#[async_trait]
impl Transport for BlePeripheral {
    async fn connect(&self) -> Result<(), TransportError> {
        self.peripheral.connect().await?;
        // Characteristic lookup is empty until services are discovered.
        self.peripheral.discover_services().await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn read_characteristic(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn write_characteristic(
        &self,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral
            .write(&characteristic, payload, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn start_notify(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral.subscribe(&characteristic).await?;
        Ok(())
    }

    async fn stop_notify(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral.unsubscribe(&characteristic).await?;
        Ok(())
    }
}

/// Routes the peripheral's notification stream into
/// [`Session::handle_notification`] until `cancel` fires or the stream
/// ends. Spawn once per connected session.
pub fn spawn_notification_router(
    session: Arc<Session<BlePeripheral>>,
    cancel: CancellationToken,
) -> JoinHandle<Result<(), TransportError>> {
    let peripheral = session.transport().peripheral.clone();

    spawn(async move {
        let mut notifications = peripheral.notifications().await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                notification = notifications.next() => {
                    match notification {
                        Some(data) => session.handle_notification(data.uuid, &data.value),
                        None => break,
                    }
                }
            }
        }

        Ok(())
    })
}

/// Scans the system's adapters for peripherals advertising the wand's
/// info service.
pub struct BleDiscovery {
    manager: Manager,
}

impl BleDiscovery {
    pub async fn new() -> Result<BleDiscovery, TransportError> {
        Ok(BleDiscovery {
            manager: Manager::new().await?,
        })
    }
}

#[async_trait]
impl Discovery for BleDiscovery {
    type Transport = BlePeripheral;

    async fn discover(
        &self,
        timeout: Duration,
    ) -> Result<BoxStream<'static, DiscoveredDevice<BlePeripheral>>, TransportError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(TransportError::NoAdapter);
        }

        let filter = ScanFilter {
            services: vec![INFO_SERVICE],
        };
        for adapter in &adapters {
            info!(
                "Scanning using adapter {}...",
                adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string())
            );
            adapter.start_scan(filter.clone()).await?;
        }

        let (sender, receiver) = mpsc::channel(64);
        spawn(pump_discoveries(adapters, timeout, sender));

        Ok(receiver.boxed())
    }
}

async fn pump_discoveries(
    adapters: Vec<Adapter>,
    window: Duration,
    mut sender: mpsc::Sender<DiscoveredDevice<BlePeripheral>>,
) {
    let deadline = sleep(window);
    tokio::pin!(deadline);
    let mut seen: HashSet<String> = HashSet::new();

    'scan: loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = sleep(Duration::from_millis(SCAN_POLL_DELAY)) => {
                for adapter in &adapters {
                    let peripherals = match adapter.peripherals().await {
                        Ok(v) => v,
                        Err(err) => {
                            warn!("Failed to query BLE adapter for peripherals: {}", err);
                            continue;
                        },
                    };

                    for peripheral in peripherals {
                        match peripheral.properties().await {
                            Err(err) => {
                                warn!("Could not query peripheral for properties: {:?}", err);
                            },
                            Ok(None) => {},
                            Ok(Some(properties)) => {
                                let address = properties.address.to_string();
                                if !seen.insert(address.clone()) {
                                    continue;
                                }

                                let device = DiscoveredDevice {
                                    identity: PeripheralIdentity {
                                        name: properties.local_name,
                                        address,
                                    },
                                    transport: BlePeripheral::new(peripheral),
                                };
                                if sender.send(device).await.is_err() {
                                    // Receiver dropped; the scan was abandoned.
                                    break 'scan;
                                }
                            },
                        }
                    }
                }
            }
        }
    }

    for adapter in &adapters {
        if let Err(err) = adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", err);
        }
    }
}
