//! One `Session` per logical wand: the connection state machine, the
//! memoized one-shot reads, the actuator writes, and the entry point for
//! asynchronous notification dispatch.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::timeout;
use uuid::Uuid;

use crate::codec;
use crate::constants::{
    HARDWARE_CHARACTERISTIC, KEEP_ALIVE_CHARACTERISTIC, LED_CHARACTERISTIC, OP_DEADLINE,
    ORGANIZATION_CHARACTERISTIC, QUATERNIONS_RESET_CHARACTERISTIC, SOFTWARE_CHARACTERISTIC,
    VIBRATOR_CHARACTERISTIC,
};
use crate::error::{TransportError, WandError};
use crate::registry::{ListenerId, Registry, SensorCallback};
use crate::transport::Transport;
use crate::types::{Color, ConnectionState, EventClass, Pattern, PeripheralIdentity, SensorEvent};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline applied to every suspending transport round trip.
    pub op_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            op_timeout: Duration::from_millis(OP_DEADLINE),
        }
    }
}

/// Values the wand exposes as read-once characteristics. Each is read at
/// most once per connection and memoized until disconnect.
#[derive(Default)]
struct CachedReadings {
    organization: Option<String>,
    software: Option<String>,
    hardware: Option<String>,
    battery: Option<u8>,
    button: Option<bool>,
    temperature: Option<i16>,
}

/// Handle to a single wand peripheral.
///
/// State-changing operations (connect, disconnect, on, off) serialize on
/// an internal async mutex. Cached reads and [`handle_notification`] stay
/// off that mutex, so notification delivery never blocks behind an
/// in-flight transport round trip and a listener may schedule its own
/// removal without deadlocking.
///
/// [`handle_notification`]: Session::handle_notification
pub struct Session<T: Transport> {
    identity: PeripheralIdentity,
    transport: T,
    config: SessionConfig,
    control: tokio::sync::Mutex<()>,
    state: Mutex<ConnectionState>,
    cache: Mutex<CachedReadings>,
    registry: Registry,
}

impl<T: Transport> Session<T> {
    pub fn new(identity: PeripheralIdentity, transport: T) -> Session<T> {
        Session::with_config(identity, transport, SessionConfig::default())
    }

    pub fn with_config(
        identity: PeripheralIdentity,
        transport: T,
        config: SessionConfig,
    ) -> Session<T> {
        Session {
            identity,
            transport,
            config,
            control: tokio::sync::Mutex::new(()),
            state: Mutex::new(ConnectionState::Disconnected),
            cache: Mutex::new(CachedReadings::default()),
            registry: Registry::new(),
        }
    }

    pub fn identity(&self) -> &PeripheralIdentity {
        &self.identity
    }

    pub fn name(&self) -> Option<&str> {
        self.identity.name.as_deref()
    }

    pub fn address(&self) -> &str {
        &self.identity.address
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Establishes the transport link. Valid only from `Disconnected`;
    /// ends `Connected` with a fresh reading cache, or back in
    /// `Disconnected` when the transport fails or the deadline elapses.
    pub async fn connect(&self) -> Result<(), WandError> {
        let _guard = self.control.lock().await;

        {
            let mut state = self.state.lock().unwrap();
            if *state != ConnectionState::Disconnected {
                return Err(WandError::InvalidState { state: *state });
            }
            *state = ConnectionState::Connecting;
        }

        info!("Connecting to {}...", self.identity);
        match timeout(self.config.op_timeout, self.transport.connect()).await {
            Ok(Ok(())) => {
                *self.cache.lock().unwrap() = CachedReadings::default();
                *self.state.lock().unwrap() = ConnectionState::Connected;
                info!("Connected to {}", self.identity);
                Ok(())
            }
            Ok(Err(source)) => {
                *self.state.lock().unwrap() = ConnectionState::Disconnected;
                Err(WandError::ConnectionFailed { source })
            }
            Err(_) => {
                *self.state.lock().unwrap() = ConnectionState::Disconnected;
                Err(WandError::TransportTimeout(self.config.op_timeout))
            }
        }
    }

    /// Tears the link down. Listener maps are dropped without transport
    /// unsubscribe calls (the link is going away) and the reading cache
    /// is cleared. A no-op when already disconnected.
    pub async fn disconnect(&self) -> Result<(), WandError> {
        let _guard = self.control.lock().await;

        if self.state() == ConnectionState::Disconnected {
            return Ok(());
        }

        self.registry.clear();
        *self.cache.lock().unwrap() = CachedReadings::default();

        let result = timeout(self.config.op_timeout, self.transport.disconnect()).await;
        *self.state.lock().unwrap() = ConnectionState::Disconnected;
        info!("Disconnected from {}", self.identity);

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => {
                // The session is torn down either way; nothing for the
                // caller to recover here.
                warn!("Transport disconnect from {} failed: {}", self.identity, source);
                Ok(())
            }
            Err(_) => Err(WandError::TransportTimeout(self.config.op_timeout)),
        }
    }

    // One-shot reads. Each hits the transport once per connection and is
    // served from the cache afterwards.

    pub async fn get_organization(&self) -> Result<String, WandError> {
        self.ensure_connected()?;
        if let Some(value) = self.cache.lock().unwrap().organization.clone() {
            return Ok(value);
        }
        let raw = self.read_characteristic(ORGANIZATION_CHARACTERISTIC).await?;
        let value = codec::decode_string(&raw);
        self.store_reading(|cache| cache.organization = Some(value.clone()));
        Ok(value)
    }

    pub async fn get_software_version(&self) -> Result<String, WandError> {
        self.ensure_connected()?;
        if let Some(value) = self.cache.lock().unwrap().software.clone() {
            return Ok(value);
        }
        let raw = self.read_characteristic(SOFTWARE_CHARACTERISTIC).await?;
        let value = codec::decode_string(&raw);
        self.store_reading(|cache| cache.software = Some(value.clone()));
        Ok(value)
    }

    pub async fn get_hardware_version(&self) -> Result<String, WandError> {
        self.ensure_connected()?;
        if let Some(value) = self.cache.lock().unwrap().hardware.clone() {
            return Ok(value);
        }
        let raw = self.read_characteristic(HARDWARE_CHARACTERISTIC).await?;
        let value = codec::decode_string(&raw);
        self.store_reading(|cache| cache.hardware = Some(value.clone()));
        Ok(value)
    }

    pub async fn get_battery(&self) -> Result<u8, WandError> {
        self.ensure_connected()?;
        if let Some(value) = self.cache.lock().unwrap().battery {
            return Ok(value);
        }
        let raw = self
            .read_characteristic(EventClass::Battery.characteristic())
            .await?;
        let value = codec::decode_battery(&raw)?;
        self.store_reading(|cache| cache.battery = Some(value));
        Ok(value)
    }

    pub async fn get_button(&self) -> Result<bool, WandError> {
        self.ensure_connected()?;
        if let Some(value) = self.cache.lock().unwrap().button {
            return Ok(value);
        }
        let raw = self
            .read_characteristic(EventClass::Button.characteristic())
            .await?;
        let value = codec::decode_button(&raw)?;
        self.store_reading(|cache| cache.button = Some(value));
        Ok(value)
    }

    pub async fn get_temperature(&self) -> Result<i16, WandError> {
        self.ensure_connected()?;
        if let Some(value) = self.cache.lock().unwrap().temperature {
            return Ok(value);
        }
        let raw = self
            .read_characteristic(EventClass::Temperature.characteristic())
            .await?;
        let value = codec::decode_temperature(&raw)?;
        self.store_reading(|cache| cache.temperature = Some(value));
        Ok(value)
    }

    // Actuators. Not retried on failure; retry policy belongs to the caller.

    pub async fn vibrate(&self, pattern: Pattern) -> Result<(), WandError> {
        self.vibrate_raw(pattern.into()).await
    }

    /// Sends a raw vibration code, for patterns the firmware understands
    /// but [`Pattern`] does not name.
    pub async fn vibrate_raw(&self, code: u8) -> Result<(), WandError> {
        debug!("Vibrating {} with code {}", self.identity, code);
        self.write_characteristic(VIBRATOR_CHARACTERISTIC, &codec::encode_vibration(code))
            .await
    }

    pub async fn set_led(&self, color: Color, on: bool) -> Result<(), WandError> {
        debug!("Setting LED of {} to {:?} (on: {})", self.identity, color, on);
        self.write_characteristic(LED_CHARACTERISTIC, &codec::encode_led(color, on))
            .await
    }

    pub async fn keep_alive(&self) -> Result<(), WandError> {
        self.write_characteristic(KEEP_ALIVE_CHARACTERISTIC, &[1]).await
    }

    /// Re-zeroes the orientation quaternions.
    pub async fn reset_orientation(&self) -> Result<(), WandError> {
        self.write_characteristic(QUATERNIONS_RESET_CHARACTERISTIC, &[1])
            .await
    }

    // Notifications.

    /// Registers a listener for an event class. The first listener of a
    /// class subscribes the transport.
    pub async fn on(
        &self,
        event: EventClass,
        callback: impl Fn(&SensorEvent) + Send + Sync + 'static,
    ) -> Result<ListenerId, WandError> {
        let _guard = self.control.lock().await;
        self.ensure_connected()?;
        self.registry
            .register(&self.transport, event, Arc::new(callback), self.config.op_timeout)
            .await
    }

    /// Removes a listener by id. With `persist` the transport
    /// subscription is kept even when this was the last listener.
    pub async fn off(&self, id: ListenerId, persist: bool) -> Result<bool, WandError> {
        let _guard = self.control.lock().await;
        self.registry
            .unregister(&self.transport, id, persist, self.config.op_timeout)
            .await
    }

    /// Installs the built-in hook for a class, invoked before user
    /// listeners on every dispatch. Survives reconnect cycles.
    pub fn set_hook(&self, event: EventClass, callback: SensorCallback) {
        self.registry.set_hook(event, callback);
    }

    /// Entry point for raw notification payloads from the transport glue.
    ///
    /// Safe to call concurrently with any other session operation.
    /// Unknown characteristics are ignored so newer firmware cannot break
    /// older clients; decode failures go to the log, never back to the
    /// transport.
    pub fn handle_notification(&self, characteristic: Uuid, data: &[u8]) {
        let Some(event) = EventClass::from_characteristic(characteristic) else {
            debug!("Ignoring notification for unknown characteristic {}", characteristic);
            return;
        };

        if let Err(err) = self.registry.dispatch(event, data) {
            warn!("Dropping undecodable {:?} notification from {}: {}", event, self.identity, err);
        }
    }

    /// Memoizes a completed one-shot read. Checked against the
    /// connection state under the cache lock, so a read that was still
    /// in flight when `disconnect` cleared the cache cannot repopulate
    /// it afterwards.
    fn store_reading(&self, store: impl FnOnce(&mut CachedReadings)) {
        let mut cache = self.cache.lock().unwrap();
        if *self.state.lock().unwrap() == ConnectionState::Connected {
            store(&mut cache);
        }
    }

    fn ensure_connected(&self) -> Result<(), WandError> {
        if self.state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(WandError::NotConnected)
        }
    }

    async fn read_characteristic(&self, characteristic: Uuid) -> Result<Vec<u8>, WandError> {
        self.ensure_connected()?;
        self.with_deadline(self.transport.read_characteristic(characteristic))
            .await?
            .map_err(|source| WandError::ReadFailed { source })
    }

    async fn write_characteristic(
        &self,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), WandError> {
        self.ensure_connected()?;
        self.with_deadline(self.transport.write_characteristic(characteristic, payload))
            .await?
            .map_err(|source| WandError::WriteFailed { source })
    }

    async fn with_deadline<O>(
        &self,
        fut: impl Future<Output = Result<O, TransportError>>,
    ) -> Result<Result<O, TransportError>, WandError> {
        timeout(self.config.op_timeout, fut)
            .await
            .map_err(|_| WandError::TransportTimeout(self.config.op_timeout))
    }
}
