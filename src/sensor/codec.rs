//! Fixed-offset field readers for the ASCII frame
//!
//! Sensor values travel as hex text, two characters per byte, so `0xAB` arrives as the
//! characters `'A'`, `'B'`. Every reader takes the whole frame and a character offset and
//! checks bounds before touching the bytes.
use core::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// field `offset..offset + len` is past the end of a frame of `frame_len` characters
    OutOfBounds {
        offset: usize,
        len: usize,
        frame_len: usize,
    },
    MalformedHex(base16::DecodeError),
    MalformedDecimal,
}

impl From<base16::DecodeError> for CodecError {
    fn from(e: base16::DecodeError) -> CodecError {
        CodecError::MalformedHex(e)
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecError::OutOfBounds {
                offset,
                len,
                frame_len,
            } => write!(
                f,
                "field {}..{} out of bounds for {} byte frame",
                offset,
                offset.saturating_add(*len),
                frame_len
            ),
            CodecError::MalformedHex(e) => write!(f, "malformed hex field: {:?}", e),
            CodecError::MalformedDecimal => write!(f, "malformed decimal field"),
        }
    }
}

fn field(frame: &[u8], offset: usize, len: usize) -> Result<&[u8], CodecError> {
    offset
        .checked_add(len)
        .and_then(|end| frame.get(offset..end))
        .ok_or(CodecError::OutOfBounds {
            offset,
            len,
            frame_len: frame.len(),
        })
}

/// Decodes `N` bytes from `2 * N` hex characters starting at `offset`, in transmission order
pub fn hex_bytes<const N: usize>(frame: &[u8], offset: usize) -> Result<[u8; N], CodecError> {
    let mut out = [0u8; N];
    base16::decode_slice(field(frame, offset, 2 * N)?, &mut out)?;
    Ok(out)
}

pub fn hex_u8(frame: &[u8], offset: usize) -> Result<u8, CodecError> {
    let [b] = hex_bytes::<1>(frame, offset)?;
    Ok(b)
}

pub fn hex_i8(frame: &[u8], offset: usize) -> Result<i8, CodecError> {
    hex_u8(frame, offset).map(|b| b as i8)
}

pub fn hex_u16_le(frame: &[u8], offset: usize) -> Result<u16, CodecError> {
    hex_bytes::<2>(frame, offset).map(u16::from_le_bytes)
}

pub fn hex_i16_le(frame: &[u8], offset: usize) -> Result<i16, CodecError> {
    hex_bytes::<2>(frame, offset).map(i16::from_le_bytes)
}

/// First transmitted byte is the high byte
pub fn hex_u16_be(frame: &[u8], offset: usize) -> Result<u16, CodecError> {
    hex_bytes::<2>(frame, offset).map(u16::from_be_bytes)
}

pub fn hex_u24_le(frame: &[u8], offset: usize) -> Result<u32, CodecError> {
    let [b0, b1, b2] = hex_bytes::<3>(frame, offset)?;
    Ok(u32::from_le_bytes([b0, b1, b2, 0]))
}

/// Signed decimal text in the last `len` characters of the frame, surrounding blanks ignored
pub fn trailing_decimal_i16(frame: &[u8], len: usize) -> Result<i16, CodecError> {
    let offset = frame.len().checked_sub(len).ok_or(CodecError::OutOfBounds {
        offset: 0,
        len,
        frame_len: frame.len(),
    })?;
    let text = core::str::from_utf8(field(frame, offset, len)?)
        .map_err(|_| CodecError::MalformedDecimal)?;
    text.trim()
        .parse::<i16>()
        .map_err(|_| CodecError::MalformedDecimal)
}
