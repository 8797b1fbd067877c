//! RSL10 sensor messages received from the BLE PMOD
//!
//! Each frame is one advertisement relayed by the PMOD as ASCII text:
//!
//! | offset | length | field                                            |
//! |--------|--------|--------------------------------------------------|
//! | 0      | 3      | message tag, `MSD`, `ESD` or `BAT`               |
//! | 3      | 2      | address type (ignored)                           |
//! | 5      | 12     | BLE address, least significant byte first        |
//! | 17     | 2      | payload version (ignored)                        |
//! | 19     | ..     | kind specific payload, see [`MessageKind`]       |
//! | len-3  | 3      | RSSI as signed decimal text                      |
//!
//! Numeric payload fields are hex text, little-endian, except the battery voltage.
use core::convert::TryFrom;
use core::fmt::{self, Write};
use core::str::FromStr;
use heapless::String;

pub mod codec;

use codec::CodecError;

/// Anything shorter cannot be a message of any kind
pub const MIN_FRAME_LENGTH: usize = 25;
pub const TAG_LENGTH: usize = 3;
pub const ADDRESS_OFFSET: usize = 5;
pub const ADDRESS_BYTES: usize = 6;
pub const PAYLOAD_OFFSET: usize = 19;
pub const RSSI_LENGTH: usize = 3;

/// `XX:XX:XX:XX:XX:XX`
pub const ADDRESS_STRING_LENGTH: usize = 3 * ADDRESS_BYTES - 1;
pub const ADDRESS_SEPARATOR: char = ':';

pub const STANDARD_GRAVITY: f32 = 9.81;
/// m/s² per LSB for a 1 g full scale range
const ACCEL_MS2_PER_LSB: f32 = STANDARD_GRAVITY / 32768.0;
const ORIENTATION_DIVISOR: f32 = 128.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseMessageError {
    TooShort(usize),
    UnknownTag([u8; TAG_LENGTH]),
    Truncated {
        kind: MessageKind,
        len: usize,
        required: usize,
    },
    MalformedAddress(CodecError),
    MalformedField(CodecError),
    InvalidAddressString,
}

impl From<CodecError> for ParseMessageError {
    fn from(e: CodecError) -> ParseMessageError {
        ParseMessageError::MalformedField(e)
    }
}

impl fmt::Display for ParseMessageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseMessageError::TooShort(len) => write!(
                f,
                "frame of {} bytes is shorter than {}",
                len, MIN_FRAME_LENGTH
            ),
            ParseMessageError::UnknownTag(tag) => write!(
                f,
                "unknown message tag {:?}",
                core::str::from_utf8(tag).unwrap_or("<binary>")
            ),
            ParseMessageError::Truncated {
                kind,
                len,
                required,
            } => write!(
                f,
                "{:?} frame of {} bytes, {} required",
                kind, len, required
            ),
            ParseMessageError::MalformedAddress(e) => write!(f, "malformed address: {}", e),
            ParseMessageError::MalformedField(e) => write!(f, "{}", e),
            ParseMessageError::InvalidAddressString => write!(f, "invalid address string"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `MSD`: settings byte, acceleration X/Y/Z (i16), orientation W/X/Y/Z (i8)
    Motion,
    /// `ESD`: temperature (u16), humidity (u16), pressure (u24), ambient light (u16)
    Environmental,
    /// `BAT`: battery voltage in mV, high byte first
    Battery,
}

impl MessageKind {
    pub fn tag(&self) -> &'static [u8; TAG_LENGTH] {
        match self {
            MessageKind::Motion => b"MSD",
            MessageKind::Environmental => b"ESD",
            MessageKind::Battery => b"BAT",
        }
    }

    /// Offset one past the last fixed payload field
    pub fn payload_end(&self) -> usize {
        match self {
            MessageKind::Motion => PAYLOAD_OFFSET + 2 + 3 * 4 + 4 * 2,
            MessageKind::Environmental => PAYLOAD_OFFSET + 4 + 4 + 6 + 4,
            MessageKind::Battery => PAYLOAD_OFFSET + 4,
        }
    }

    pub fn min_frame_length(&self) -> usize {
        self.payload_end() + RSSI_LENGTH
    }
}

impl TryFrom<&[u8]> for MessageKind {
    type Error = ParseMessageError;

    fn try_from(frame: &[u8]) -> Result<Self, Self::Error> {
        let mut tag = [0u8; TAG_LENGTH];
        match frame.get(0..TAG_LENGTH) {
            Some(t) => tag.copy_from_slice(t),
            None => return Err(ParseMessageError::TooShort(frame.len())),
        }
        match &tag {
            b"MSD" => Ok(MessageKind::Motion),
            b"ESD" => Ok(MessageKind::Environmental),
            b"BAT" => Ok(MessageKind::Battery),
            _ => Err(ParseMessageError::UnknownTag(tag)),
        }
    }
}

/// Canonical display form of a BLE address, used as the registry key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress(String<ADDRESS_STRING_LENGTH>);

impl DeviceAddress {
    /// `bytes` in display order, most significant first
    pub fn from_bytes(bytes: [u8; ADDRESS_BYTES]) -> Self {
        let mut s = String::new();
        for (i, b) in bytes.iter().enumerate() {
            // ADDRESS_STRING_LENGTH is exactly six pairs and five separators
            if i > 0 {
                let _ = s.push(ADDRESS_SEPARATOR);
            }
            let _ = write!(s, "{:02X}", b);
        }
        DeviceAddress(s)
    }

    /// `bytes` in the order they appear on the wire, least significant first
    pub fn from_transmitted(mut bytes: [u8; ADDRESS_BYTES]) -> Self {
        bytes.reverse();
        Self::from_bytes(bytes)
    }

    pub fn from_frame(frame: &[u8]) -> Result<Self, ParseMessageError> {
        let bytes = codec::hex_bytes::<ADDRESS_BYTES>(frame, ADDRESS_OFFSET)
            .map_err(ParseMessageError::MalformedAddress)?;
        Ok(Self::from_transmitted(bytes))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `01:23:45:67:89:ab` or `01-23-45-67-89-AB`
impl FromStr for DeviceAddress {
    type Err = ParseMessageError;

    fn from_str(s: &str) -> Result<Self, ParseMessageError> {
        let s = s.trim();
        if s.len() != ADDRESS_STRING_LENGTH {
            return Err(ParseMessageError::InvalidAddressString);
        }

        let mut bytes = [0u8; ADDRESS_BYTES];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for b in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or(ParseMessageError::InvalidAddressString)?;
            *b = codec::hex_u8(part.as_bytes(), 0)
                .ok()
                .filter(|_| part.len() == 2)
                .ok_or(ParseMessageError::InvalidAddressString)?;
        }
        if parts.next().is_some() {
            return Err(ParseMessageError::InvalidAddressString);
        }
        Ok(Self::from_bytes(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentalReading {
    /// °C
    pub temperature: f32,
    /// %RH
    pub humidity: f32,
    pub pressure: f32,
    /// not sent by current PMOD firmware, always 0
    pub ambient_light: u16,
}

/// Packed sensor configuration byte of a motion message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionSettings {
    pub sample_rate: u8,
    pub accel_range: u8,
    pub data_type: u8,
}

impl MotionSettings {
    /// Full scale of the accelerometer in g: 2, 4, 8 or 16
    pub fn accel_full_scale(&self) -> f32 {
        f32::from(2u8 << (self.accel_range & 0x03))
    }
}

impl From<u8> for MotionSettings {
    fn from(b: u8) -> Self {
        MotionSettings {
            sample_rate: b >> 4,
            accel_range: (b >> 2) & 0x03,
            data_type: b & 0x03,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionReading {
    pub settings: MotionSettings,
    /// X, Y, Z in g
    pub acceleration: [f32; 3],
    /// W, X, Y, Z
    pub orientation: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    /// V
    pub voltage: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Motion(MotionReading),
    Environmental(EnvironmentalReading),
    Battery(BatteryReading),
}

impl Reading {
    pub fn kind(&self) -> MessageKind {
        match self {
            Reading::Motion(_) => MessageKind::Motion,
            Reading::Environmental(_) => MessageKind::Environmental,
            Reading::Battery(_) => MessageKind::Battery,
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct SensorMessage {
    pub address: DeviceAddress,
    pub rssi: i16,
    pub reading: Reading,
}

impl SensorMessage {
    pub fn parse(frame: &[u8]) -> Result<Self, ParseMessageError> {
        let frame = match frame.split_last() {
            Some((b'\r', rest)) => rest,
            _ => frame,
        };
        if frame.len() < MIN_FRAME_LENGTH {
            return Err(ParseMessageError::TooShort(frame.len()));
        }

        let kind = MessageKind::try_from(frame)?;
        if frame.len() < kind.min_frame_length() {
            return Err(ParseMessageError::Truncated {
                kind,
                len: frame.len(),
                required: kind.min_frame_length(),
            });
        }

        let address = DeviceAddress::from_frame(frame)?;
        let rssi = codec::trailing_decimal_i16(frame, RSSI_LENGTH)?;
        let reading = match kind {
            MessageKind::Motion => Reading::Motion(parse_motion(frame)?),
            MessageKind::Environmental => Reading::Environmental(parse_environmental(frame)?),
            MessageKind::Battery => Reading::Battery(parse_battery(frame)?),
        };

        Ok(SensorMessage {
            address,
            rssi,
            reading,
        })
    }
}

impl TryFrom<&[u8]> for SensorMessage {
    type Error = ParseMessageError;

    fn try_from(frame: &[u8]) -> Result<Self, Self::Error> {
        SensorMessage::parse(frame)
    }
}

fn parse_environmental(frame: &[u8]) -> Result<EnvironmentalReading, CodecError> {
    let temperature = codec::hex_u16_le(frame, PAYLOAD_OFFSET)?;
    let humidity = codec::hex_u16_le(frame, PAYLOAD_OFFSET + 4)?;
    let pressure = codec::hex_u24_le(frame, PAYLOAD_OFFSET + 8)?;

    Ok(EnvironmentalReading {
        temperature: f32::from(temperature) / 100.0,
        humidity: f32::from(humidity) / 100.0,
        pressure: pressure as f32 / 100.0,
        ambient_light: 0,
    })
}

fn parse_motion(frame: &[u8]) -> Result<MotionReading, CodecError> {
    let settings = MotionSettings::from(codec::hex_u8(frame, PAYLOAD_OFFSET)?);
    let lsb_to_g = settings.accel_full_scale() * ACCEL_MS2_PER_LSB / STANDARD_GRAVITY;

    let mut acceleration = [0f32; 3];
    for (i, axis) in acceleration.iter_mut().enumerate() {
        let raw = codec::hex_i16_le(frame, PAYLOAD_OFFSET + 2 + 4 * i)?;
        *axis = f32::from(raw) * lsb_to_g;
    }

    let mut orientation = [0f32; 4];
    for (i, component) in orientation.iter_mut().enumerate() {
        let raw = codec::hex_i8(frame, PAYLOAD_OFFSET + 14 + 2 * i)?;
        *component = f32::from(raw) / ORIENTATION_DIVISOR;
    }

    Ok(MotionReading {
        settings,
        acceleration,
        orientation,
    })
}

fn parse_battery(frame: &[u8]) -> Result<BatteryReading, CodecError> {
    let millivolts = codec::hex_u16_be(frame, PAYLOAD_OFFSET)?;
    Ok(BatteryReading {
        voltage: f32::from(millivolts) / 1000.0,
    })
}
