use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::{
    BATTERY_CHARACTERISTIC, QUATERNIONS_CHARACTERISTIC, TEMPERATURE_CHARACTERISTIC,
    USER_BUTTON_CHARACTERISTIC,
};
use crate::error::CodecError;

/// Connection lifecycle of a [`Session`](crate::session::Session).
/// Supports reconnect cycles; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Stable identity of a discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralIdentity {
    /// Advertised device name, when the advertisement carried one.
    pub name: Option<String>,
    /// Hardware address (MAC on Linux/Windows, platform UUID on macOS).
    pub address: String,
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// The fixed set of notification classes the wand emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Position,
    Button,
    Temperature,
    Battery,
}

impl EventClass {
    /// The GATT characteristic that carries notifications for this class.
    pub fn characteristic(self) -> Uuid {
        match self {
            EventClass::Position => QUATERNIONS_CHARACTERISTIC,
            EventClass::Button => USER_BUTTON_CHARACTERISTIC,
            EventClass::Temperature => TEMPERATURE_CHARACTERISTIC,
            EventClass::Battery => BATTERY_CHARACTERISTIC,
        }
    }

    /// Reverse lookup used when routing incoming notifications. Unknown
    /// characteristics yield `None` and are ignored by the session.
    pub fn from_characteristic(characteristic: Uuid) -> Option<EventClass> {
        match characteristic {
            c if c == QUATERNIONS_CHARACTERISTIC => Some(EventClass::Position),
            c if c == USER_BUTTON_CHARACTERISTIC => Some(EventClass::Button),
            c if c == TEMPERATURE_CHARACTERISTIC => Some(EventClass::Temperature),
            c if c == BATTERY_CHARACTERISTIC => Some(EventClass::Battery),
            _ => None,
        }
    }
}

/// One decoded orientation notification.
///
/// Components are nominally within [-1000, 1000] but the decoder does not
/// clamp; out-of-range values are passed through as the device sent them.
/// Field order is canonically (x, y, z, w) everywhere in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientationSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub w: i16,
}

/// A decoded notification payload, as handed to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorEvent {
    Position(OrientationSample),
    Button(bool),
    Temperature(i16),
    Battery(u8),
}

impl SensorEvent {
    pub fn class(&self) -> EventClass {
        match self {
            SensorEvent::Position(_) => EventClass::Position,
            SensorEvent::Button(_) => EventClass::Button,
            SensorEvent::Temperature(_) => EventClass::Temperature,
            SensorEvent::Battery(_) => EventClass::Battery,
        }
    }
}

/// Vibration patterns understood by the wand's vibrator characteristic.
/// Raw codes outside this set can be sent with
/// [`Session::vibrate_raw`](crate::session::Session::vibrate_raw).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Pattern {
    Regular = 1,
    Short = 2,
    Burst = 3,
    Long = 4,
    ShortLong = 5,
    ShortShort = 6,
    BigPause = 7,
}

impl From<Pattern> for u8 {
    fn from(pattern: Pattern) -> u8 {
        pattern as u8
    }
}

/// 24-bit RGB color for the wand's LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b }
    }

    /// Splits a packed 24-bit value (`0xRRGGBB`); bits above 24 are masked off.
    pub const fn from_rgb24(value: u32) -> Color {
        Color {
            r: ((value >> 16) & 0xFF) as u8,
            g: ((value >> 8) & 0xFF) as u8,
            b: (value & 0xFF) as u8,
        }
    }
}

impl From<u32> for Color {
    fn from(value: u32) -> Color {
        Color::from_rgb24(value)
    }
}

impl FromStr for Color {
    type Err = CodecError;

    /// Accepts `"#RRGGBB"`, `"0xRRGGBB"` or bare hex digits.
    fn from_str(s: &str) -> Result<Color, CodecError> {
        let digits = s
            .strip_prefix('#')
            .or_else(|| s.strip_prefix("0x"))
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if digits.is_empty() || digits.len() > 6 {
            return Err(CodecError::InvalidColorFormat(s.to_string()));
        }

        u32::from_str_radix(digits, 16)
            .map(Color::from_rgb24)
            .map_err(|_| CodecError::InvalidColorFormat(s.to_string()))
    }
}
