use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{ConnectionState, EventClass};

/// Failures originating in the BLE transport layer. These are always
/// wrapped in a [`WandError`] before reaching callers of the session API.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Error communicating with peripheral (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("Characteristic {0} is not available on this peripheral")]
    MissingCharacteristic(Uuid),

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed {what} payload: expected at least {expected} bytes, got {actual}")]
    MalformedPayload {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid color format: {0:?}")]
    InvalidColorFormat(String),
}

#[derive(Error, Debug)]
pub enum WandError {
    #[error("Operation is not valid while {state:?}")]
    InvalidState { state: ConnectionState },

    #[error("Wand is not connected")]
    NotConnected,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Failed to subscribe to {event:?} notifications: {source}")]
    SubscriptionFailed { event: EventClass, source: TransportError },

    #[error("Failed to write characteristic: {source}")]
    WriteFailed { source: TransportError },

    #[error("Failed to read characteristic: {source}")]
    ReadFailed { source: TransportError },

    #[error("Failed to connect to peripheral: {source}")]
    ConnectionFailed { source: TransportError },

    #[error("Transport operation timed out after {0:?}")]
    TransportTimeout(Duration),

    #[error("A name, prefix or mac address must be provided to find a wand")]
    NoSelectorProvided,

    #[error("Failed to scan for peripherals: {source}")]
    ScanFailed { source: TransportError },
}
