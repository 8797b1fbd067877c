//! Newline framing of the raw serial byte stream
//!
//! The BLE PMOD forwards one advertisement per line. A single UART read can carry several
//! lines, or only part of one, so bytes are accumulated in a fixed circular buffer and
//! complete frames are handed out one at a time by [`FrameReader::next_frame`].
//!
//! The buffer never grows: when a read would overflow it, everything buffered is purged
//! together with the offending chunk and reading starts again from a clean state.
use core::fmt;
use heapless::Vec;
use log::{debug, warn};

pub const FRAME_TERMINATOR: u8 = b'\n';
pub const DEFAULT_BUFFER_SIZE: usize = 512;
/// Longest frame that is copied out of the circular buffer
pub const MAX_FRAME_LENGTH: usize = 128;

pub type FrameVec = Vec<u8, MAX_FRAME_LENGTH>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// incoming chunk did not fit, buffer was purged
    BufferFull { buffered: usize, incoming: usize },
    /// frame of given length (terminator excluded) was consumed but not copied
    FrameTooLong(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BufferFull { buffered, incoming } => write!(
                f,
                "buffer full ({} buffered + {} incoming bytes), purged",
                buffered, incoming
            ),
            Error::FrameTooLong(len) => write!(
                f,
                "frame of {} bytes exceeds maximum of {}",
                len, MAX_FRAME_LENGTH
            ),
        }
    }
}

pub struct FrameReader<const BUFL: usize> {
    buf: [u8; BUFL],
    /// where the next incoming byte is stored
    write_idx: usize,
    /// first byte of the oldest unconsumed frame
    read_idx: usize,
    /// unconsumed bytes between `read_idx` and `write_idx`
    bytes_in_buffer: usize,
    /// bytes past `read_idx` already known not to contain a terminator
    scanned: usize,
}

impl<const BUFL: usize> FrameReader<BUFL> {
    pub fn new() -> Self {
        Self {
            buf: [0; BUFL],
            write_idx: 0,
            read_idx: 0,
            bytes_in_buffer: 0,
            scanned: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        BUFL
    }

    pub fn len(&self) -> usize {
        self.bytes_in_buffer
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_in_buffer == 0
    }

    /// Appends one chunk read from the serial port.
    ///
    /// On overflow the whole buffer is discarded (including `bytes`) and
    /// [`Error::BufferFull`] is returned; the reader is immediately usable again.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.bytes_in_buffer + bytes.len() > BUFL {
            let err = Error::BufferFull {
                buffered: self.bytes_in_buffer,
                incoming: bytes.len(),
            };
            warn!("{}", err);
            self.reset();
            return Err(err);
        }

        for b in bytes {
            self.buf[self.write_idx] = *b;
            self.write_idx = (self.write_idx + 1) % BUFL;
        }
        self.bytes_in_buffer += bytes.len();
        Ok(())
    }

    /// Extracts the next complete frame, terminator stripped.
    ///
    /// Returns `None` once only a partial frame (or nothing) is left; that tail stays
    /// buffered for the next [`push`](Self::push).
    pub fn next_frame(&mut self) -> Option<Result<FrameVec, Error>> {
        while self.scanned < self.bytes_in_buffer {
            let terminator_idx = (self.read_idx + self.scanned) % BUFL;
            if self.buf[terminator_idx] != FRAME_TERMINATOR {
                self.scanned += 1;
                continue;
            }

            let frame_len = self.scanned;
            let result = if frame_len > MAX_FRAME_LENGTH {
                Err(Error::FrameTooLong(frame_len))
            } else {
                let mut frame = FrameVec::new();
                for i in 0..frame_len {
                    // cannot fail, frame_len <= MAX_FRAME_LENGTH
                    let _ = frame.push(self.buf[(self.read_idx + i) % BUFL]);
                }
                Ok(frame)
            };

            debug!(
                "frame of {} bytes at {}..{}",
                frame_len, self.read_idx, terminator_idx
            );
            self.bytes_in_buffer -= frame_len + 1;
            self.read_idx = (terminator_idx + 1) % BUFL;
            self.scanned = 0;
            return Some(result);
        }
        None
    }

    pub fn reset(&mut self) {
        self.write_idx = 0;
        self.read_idx = 0;
        self.bytes_in_buffer = 0;
        self.scanned = 0;
    }
}

impl<const BUFL: usize> Default for FrameReader<BUFL> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{thread_rng, Rng};

    fn collect<const BUFL: usize>(reader: &mut FrameReader<BUFL>) -> std::vec::Vec<std::vec::Vec<u8>> {
        let mut frames = std::vec::Vec::new();
        while let Some(frame) = reader.next_frame() {
            frames.push(frame.unwrap().to_vec());
        }
        frames
    }

    #[test]
    fn test_no_bytes_yields_nothing() {
        let mut reader = FrameReader::<DEFAULT_BUFFER_SIZE>::new();
        reader.push(&[]).unwrap();
        assert!(reader.next_frame().is_none());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_partial_frame_is_retained() {
        let mut reader = FrameReader::<DEFAULT_BUFFER_SIZE>::new();
        reader.push(b"ESD00AB89").unwrap();
        assert!(reader.next_frame().is_none());
        assert_eq!(reader.len(), 9);

        reader.push(b"67452301\n").unwrap();
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(&frame[..], b"ESD00AB8967452301");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut reader = FrameReader::<DEFAULT_BUFFER_SIZE>::new();
        reader.push(b"first\nsecond\nthi").unwrap();
        assert_eq!(collect(&mut reader), vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(reader.len(), 3);
    }

    #[test]
    fn test_empty_frame() {
        let mut reader = FrameReader::<DEFAULT_BUFFER_SIZE>::new();
        reader.push(b"\n").unwrap();
        let frame = reader.next_frame().unwrap().unwrap();
        assert!(frame.is_empty());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_frame_wrapping_around_buffer_end() {
        let mut reader = FrameReader::<16>::new();
        reader.push(b"0123456789\n").unwrap();
        assert_eq!(collect(&mut reader), vec![b"0123456789".to_vec()]);

        // write cursor is at 11, this frame wraps past index 15
        reader.push(b"abcdefghij\n").unwrap();
        assert_eq!(collect(&mut reader), vec![b"abcdefghij".to_vec()]);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_buffer_exactly_full() {
        let mut reader = FrameReader::<8>::new();
        reader.push(b"abcdefg\n").unwrap();
        assert_eq!(reader.len(), 8);
        assert_eq!(collect(&mut reader), vec![b"abcdefg".to_vec()]);
    }

    #[test]
    fn test_overflow_purges_everything() {
        let mut reader = FrameReader::<16>::new();
        reader.push(b"0123456789").unwrap();
        let err = reader.push(b"abcdefghij");
        assert_eq!(
            err,
            Err(Error::BufferFull {
                buffered: 10,
                incoming: 10
            })
        );
        assert!(reader.is_empty());
        assert!(reader.next_frame().is_none());

        reader.push(b"valid\n").unwrap();
        assert_eq!(collect(&mut reader), vec![b"valid".to_vec()]);
    }

    #[test]
    fn test_single_chunk_larger_than_capacity() {
        let mut reader = FrameReader::<DEFAULT_BUFFER_SIZE>::new();
        let big = [b'A'; DEFAULT_BUFFER_SIZE + 1];
        assert!(reader.push(&big).is_err());
        assert!(reader.is_empty());

        reader.push(b"after\n").unwrap();
        assert_eq!(collect(&mut reader), vec![b"after".to_vec()]);
    }

    #[test]
    fn test_oversized_frame_is_consumed_and_reported() {
        let mut reader = FrameReader::<DEFAULT_BUFFER_SIZE>::new();
        let mut input = std::vec::Vec::new();
        input.extend_from_slice(&[b'X'; MAX_FRAME_LENGTH + 1]);
        input.push(b'\n');
        input.extend_from_slice(b"next\n");
        reader.push(&input).unwrap();

        assert_eq!(
            reader.next_frame(),
            Some(Err(Error::FrameTooLong(MAX_FRAME_LENGTH + 1)))
        );
        assert_eq!(&reader.next_frame().unwrap().unwrap()[..], b"next");
        assert!(reader.next_frame().is_none());
    }

    #[test]
    fn test_reset() {
        let mut reader = FrameReader::<DEFAULT_BUFFER_SIZE>::new();
        reader.push(b"dangling").unwrap();
        reader.reset();
        assert!(reader.is_empty());
        reader.push(b"line\n").unwrap();
        assert_eq!(collect(&mut reader), vec![b"line".to_vec()]);
    }

    #[test]
    fn test_chunking_does_not_change_frames() {
        let mut stream = std::vec::Vec::new();
        for i in 0..40 {
            stream.extend_from_slice(format!("ESD00AB89674523{:02}00CC094F12B8069BFFFF -50\n", i).as_bytes());
        }

        let mut whole = FrameReader::<4096>::new();
        whole.push(&stream).unwrap();
        let expected = collect(&mut whole);
        assert_eq!(expected.len(), 40);

        let mut rng = thread_rng();
        for _ in 0..20 {
            let mut reader = FrameReader::<DEFAULT_BUFFER_SIZE>::new();
            let mut frames = std::vec::Vec::new();
            let mut start = 0;
            while start < stream.len() {
                let end = (start + rng.gen_range(1, 64)).min(stream.len());
                reader.push(&stream[start..end]).unwrap();
                frames.extend(collect(&mut reader));
                start = end;
            }
            assert_eq!(frames, expected);
            assert!(reader.is_empty());
        }
    }
}
