//! Session manager for the Kano wand BLE peripheral.
//!
//! A [`Shop`] scans for wands and produces one [`Session`] per matching
//! peripheral. Sessions expose the wand's one-shot readings, actuators
//! (vibration, LED, orientation reset) and notification listeners for
//! the position, button, temperature and battery event classes. The BLE
//! stack sits behind the [`Transport`]/[`Discovery`] traits; the
//! btleplug implementation lives in [`ble`].

use std::env;

pub mod ble;
pub mod codec;
pub mod constants;
pub mod error;
pub mod registry;
pub mod session;
pub mod shop;
pub mod transport;
pub mod types;

pub use error::{CodecError, TransportError, WandError};
pub use registry::{ListenerId, Registry, SensorCallback};
pub use session::{Session, SessionConfig};
pub use shop::{Selector, Shop};
pub use transport::{DiscoveredDevice, Discovery, Transport};
pub use types::{
    Color, ConnectionState, EventClass, OrientationSample, Pattern, PeripheralIdentity,
    SensorEvent,
};

pub fn init_logging() {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}
