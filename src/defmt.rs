use defmt::Formatter;

use crate::framer::Error as FramerError;
use crate::gateway::Error as GatewayError;
use crate::registry::{AuthorizationPolicy, RegistryError};
use crate::sensor::codec::CodecError;
use crate::sensor::{DeviceAddress, MessageKind, ParseMessageError};
use crate::telemetry::{DrainReport, TelemetryError};

impl defmt::Format for DeviceAddress {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(fmt, "{=str}", self.as_str())
    }
}

impl defmt::Format for MessageKind {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            MessageKind::Motion => defmt::write!(fmt, "Motion"),
            MessageKind::Environmental => defmt::write!(fmt, "Environmental"),
            MessageKind::Battery => defmt::write!(fmt, "Battery"),
        }
    }
}

impl defmt::Format for FramerError {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            FramerError::BufferFull { buffered, incoming } => defmt::write!(
                fmt,
                "BufferFull {{ buffered: {=usize}, incoming: {=usize} }}",
                buffered,
                incoming
            ),
            FramerError::FrameTooLong(len) => defmt::write!(fmt, "FrameTooLong({=usize})", len),
        }
    }
}

impl defmt::Format for CodecError {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            CodecError::OutOfBounds {
                offset,
                len,
                frame_len,
            } => defmt::write!(
                fmt,
                "OutOfBounds {{ offset: {=usize}, len: {=usize}, frame_len: {=usize} }}",
                offset,
                len,
                frame_len
            ),
            CodecError::MalformedHex(_) => defmt::write!(fmt, "MalformedHex"),
            CodecError::MalformedDecimal => defmt::write!(fmt, "MalformedDecimal"),
        }
    }
}

impl defmt::Format for ParseMessageError {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            ParseMessageError::TooShort(len) => defmt::write!(fmt, "TooShort({=usize})", len),
            ParseMessageError::UnknownTag(tag) => {
                defmt::write!(fmt, "UnknownTag({=[u8]})", &tag[..])
            }
            ParseMessageError::Truncated {
                kind,
                len,
                required,
            } => defmt::write!(
                fmt,
                "Truncated {{ kind: {}, len: {=usize}, required: {=usize} }}",
                kind,
                len,
                required
            ),
            ParseMessageError::MalformedAddress(e) => defmt::write!(fmt, "MalformedAddress({})", e),
            ParseMessageError::MalformedField(e) => defmt::write!(fmt, "MalformedField({})", e),
            ParseMessageError::InvalidAddressString => defmt::write!(fmt, "InvalidAddressString"),
        }
    }
}

impl defmt::Format for AuthorizationPolicy {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            AuthorizationPolicy::AllowAll => defmt::write!(fmt, "AllowAll"),
            AuthorizationPolicy::AllowList => defmt::write!(fmt, "AllowList"),
        }
    }
}

impl defmt::Format for RegistryError {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            RegistryError::Unauthorized(a) => defmt::write!(fmt, "Unauthorized({})", a),
            RegistryError::Full(a) => defmt::write!(fmt, "Full({})", a),
            RegistryError::AuthorizationListFull(a) => {
                defmt::write!(fmt, "AuthorizationListFull({})", a)
            }
            RegistryError::InvalidSlot(i) => defmt::write!(fmt, "InvalidSlot({=usize})", i),
        }
    }
}

impl defmt::Format for TelemetryError {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            TelemetryError::BufferTooSmall => defmt::write!(fmt, "BufferTooSmall"),
        }
    }
}

impl defmt::Format for DrainReport {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(
            fmt,
            "DrainReport {{ sent: {=usize}, failed: {=usize} }}",
            self.sent,
            self.failed
        )
    }
}

impl defmt::Format for GatewayError {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            GatewayError::Framing(e) => defmt::write!(fmt, "Framing({})", e),
            GatewayError::Parse(e) => defmt::write!(fmt, "Parse({})", e),
            GatewayError::Registry(e) => defmt::write!(fmt, "Registry({})", e),
        }
    }
}
