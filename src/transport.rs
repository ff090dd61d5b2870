//! The seam between the session core and the surrounding BLE stack.
//!
//! A [`Transport`] is one already-discovered peripheral the session can
//! talk to; a [`Discovery`] produces candidate peripherals during a scan
//! window. The btleplug implementations live in [`crate::ble`]; tests
//! substitute scripted doubles.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::TransportError;
use crate::types::PeripheralIdentity;

/// GATT operations against a single peripheral. All methods suspend for a
/// transport round trip; the session wraps every call in its configured
/// deadline.
///
/// Notification payloads do not flow through this trait: after
/// `start_notify`, the transport glue is responsible for feeding raw
/// values into [`Session::handle_notification`]
/// (see [`crate::ble::spawn_notification_router`]).
///
/// [`Session::handle_notification`]: crate::session::Session::handle_notification
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn read_characteristic(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError>;

    async fn write_characteristic(
        &self,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    async fn start_notify(&self, characteristic: Uuid) -> Result<(), TransportError>;

    async fn stop_notify(&self, characteristic: Uuid) -> Result<(), TransportError>;
}

/// A peripheral observed during discovery, ready to be wrapped in a
/// [`Session`](crate::session::Session).
pub struct DiscoveredDevice<T> {
    pub identity: PeripheralIdentity,
    pub transport: T,
}

/// Produces peripherals for one scan window. The returned stream is
/// finite: it ends when `timeout` elapses. Each call starts a fresh scan.
#[async_trait]
pub trait Discovery: Send + Sync {
    type Transport: Transport;

    async fn discover(
        &self,
        timeout: Duration,
    ) -> Result<BoxStream<'static, DiscoveredDevice<Self::Transport>>, TransportError>;
}
