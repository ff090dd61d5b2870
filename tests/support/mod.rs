//! Scripted stand-ins for the BLE stack, shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use uuid::Uuid;

use kano_wand::{DiscoveredDevice, Discovery, PeripheralIdentity, Transport, TransportError};

/// Records every transport call; reads are served from scripted values.
#[derive(Default)]
pub struct MockTransport {
    readings: Mutex<HashMap<Uuid, Vec<u8>>>,
    read_counts: Mutex<HashMap<Uuid, usize>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    starts: Mutex<Vec<Uuid>>,
    stops: Mutex<Vec<Uuid>>,
    pub fail_connect: bool,
    pub hang_connect: bool,
    pub fail_write: bool,
    read_delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport::default()
    }

    pub fn failing_connect() -> MockTransport {
        MockTransport {
            fail_connect: true,
            ..MockTransport::default()
        }
    }

    pub fn hanging_connect() -> MockTransport {
        MockTransport {
            hang_connect: true,
            ..MockTransport::default()
        }
    }

    pub fn failing_write() -> MockTransport {
        MockTransport {
            fail_write: true,
            ..MockTransport::default()
        }
    }

    pub fn with_reading(self, characteristic: Uuid, value: &[u8]) -> MockTransport {
        self.readings
            .lock()
            .unwrap()
            .insert(characteristic, value.to_vec());
        self
    }

    /// Makes every read suspend for `delay` before completing, so tests
    /// can interleave other session operations with an in-flight read.
    pub fn with_read_delay(mut self, delay: Duration) -> MockTransport {
        self.read_delay = Some(delay);
        self
    }

    pub fn read_count(&self, characteristic: Uuid) -> usize {
        *self
            .read_counts
            .lock()
            .unwrap()
            .get(&characteristic)
            .unwrap_or(&0)
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn start_notify_calls(&self) -> Vec<Uuid> {
        self.starts.lock().unwrap().clone()
    }

    pub fn stop_notify_calls(&self) -> Vec<Uuid> {
        self.stops.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.hang_connect {
            futures::future::pending::<()>().await;
        }
        if self.fail_connect {
            return Err(TransportError::Other("connect refused".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_characteristic(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        *self
            .read_counts
            .lock()
            .unwrap()
            .entry(characteristic)
            .or_insert(0) += 1;
        self.readings
            .lock()
            .unwrap()
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| TransportError::Other(format!("no scripted value for {characteristic}")))
    }

    async fn write_characteristic(
        &self,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if self.fail_write {
            return Err(TransportError::Other("write refused".into()));
        }
        self.writes
            .lock()
            .unwrap()
            .push((characteristic, payload.to_vec()));
        Ok(())
    }

    async fn start_notify(&self, characteristic: Uuid) -> Result<(), TransportError> {
        self.starts.lock().unwrap().push(characteristic);
        Ok(())
    }

    async fn stop_notify(&self, characteristic: Uuid) -> Result<(), TransportError> {
        self.stops.lock().unwrap().push(characteristic);
        Ok(())
    }
}

pub fn identity(name: &str, address: &str) -> PeripheralIdentity {
    PeripheralIdentity {
        name: Some(name.to_string()),
        address: address.to_string(),
    }
}

pub fn device(name: &str, address: &str, transport: MockTransport) -> DiscoveredDevice<MockTransport> {
    DiscoveredDevice {
        identity: identity(name, address),
        transport,
    }
}

/// Hands out a fixed device list as the discovery stream. With
/// `pending_tail` the stream stays open after the scripted devices, so
/// only cancellation (or the scan window) ends the scan.
pub struct MockDiscovery {
    devices: Mutex<Option<Vec<DiscoveredDevice<MockTransport>>>>,
    pending_tail: bool,
}

impl MockDiscovery {
    pub fn new(devices: Vec<DiscoveredDevice<MockTransport>>) -> MockDiscovery {
        MockDiscovery {
            devices: Mutex::new(Some(devices)),
            pending_tail: false,
        }
    }

    pub fn with_pending_tail(mut self) -> MockDiscovery {
        self.pending_tail = true;
        self
    }
}

#[async_trait]
impl Discovery for MockDiscovery {
    type Transport = MockTransport;

    async fn discover(
        &self,
        _timeout: Duration,
    ) -> Result<BoxStream<'static, DiscoveredDevice<MockTransport>>, TransportError> {
        let devices = self.devices.lock().unwrap().take().unwrap_or_default();
        let stream = futures::stream::iter(devices);

        if self.pending_tail {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }
}
