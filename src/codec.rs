//! Pure byte-level transforms for the wand's sensor and actuator payloads.
//! Nothing in here touches the transport; everything is deterministic.

use crate::error::CodecError;
use crate::types::{Color, EventClass, OrientationSample, SensorEvent};

fn read_i16_le(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Decodes an 8-byte orientation notification.
///
/// The wire layout is four little-endian 16-bit words in (y, x, w, z)
/// order; x and w are negated on the way in. Negation wraps on
/// `i16::MIN` and values are not clamped to the nominal ±1000 range.
pub fn decode_position(data: &[u8]) -> Result<OrientationSample, CodecError> {
    if data.len() < 8 {
        return Err(CodecError::MalformedPayload {
            what: "position",
            expected: 8,
            actual: data.len(),
        });
    }

    let y = read_i16_le(data, 0);
    let x = read_i16_le(data, 2).wrapping_neg();
    let w = read_i16_le(data, 4).wrapping_neg();
    let z = read_i16_le(data, 6);

    Ok(OrientationSample { x, y, z, w })
}

/// True iff the first byte is 1.
pub fn decode_button(data: &[u8]) -> Result<bool, CodecError> {
    match data.first() {
        Some(byte) => Ok(*byte == 1),
        None => Err(CodecError::MalformedPayload {
            what: "button",
            expected: 1,
            actual: 0,
        }),
    }
}

/// Little-endian signed 16-bit temperature.
pub fn decode_temperature(data: &[u8]) -> Result<i16, CodecError> {
    if data.len() < 2 {
        return Err(CodecError::MalformedPayload {
            what: "temperature",
            expected: 2,
            actual: data.len(),
        });
    }
    Ok(read_i16_le(data, 0))
}

/// Raw battery level byte.
pub fn decode_battery(data: &[u8]) -> Result<u8, CodecError> {
    match data.first() {
        Some(byte) => Ok(*byte),
        None => Err(CodecError::MalformedPayload {
            what: "battery",
            expected: 1,
            actual: 0,
        }),
    }
}

/// Decodes a notification payload for the given event class.
pub fn decode_event(class: EventClass, data: &[u8]) -> Result<SensorEvent, CodecError> {
    match class {
        EventClass::Position => decode_position(data).map(SensorEvent::Position),
        EventClass::Button => decode_button(data).map(SensorEvent::Button),
        EventClass::Temperature => decode_temperature(data).map(SensorEvent::Temperature),
        EventClass::Battery => decode_battery(data).map(SensorEvent::Battery),
    }
}

/// The info characteristics carry short ASCII strings; decode leniently.
pub fn decode_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches('\0')
        .to_string()
}

pub fn encode_vibration(code: u8) -> [u8; 1] {
    [code]
}

/// Encodes the LED payload: an on/off byte followed by the color packed
/// to RGB565, high byte first.
pub fn encode_led(color: Color, on: bool) -> [u8; 3] {
    let rgb16 = (((color.r & 0xF8) as u16) << 8)
        + (((color.g & 0xFC) as u16) << 3)
        + (((color.b & 0xF8) as u16) >> 3);

    [on as u8, (rgb16 >> 8) as u8, (rgb16 & 0xFF) as u8]
}
