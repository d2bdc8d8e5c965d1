//! Length-prefixed message framing.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  opaque payload  |
//! +----------------+------------------+
//! ```
//!
//! The functions here are pure; [`FrameReader`] and [`FrameWriter`] apply
//! them to blocking streams. The server drives the same codec over async
//! sockets.

use std::io::{self, Read, Write};

use framecast_core::Encodable;

use crate::LENGTH_PREFIX_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Number of bytes to read before anything else: the length prefix.
pub fn begin_decode() -> usize {
    LENGTH_PREFIX_SIZE
}

/// Encodes a payload length into its big-endian prefix.
///
/// Fails if `len` exceeds `max`.
pub fn encode_length(len: usize, max: u32) -> ProtocolResult<[u8; LENGTH_PREFIX_SIZE]> {
    match u32::try_from(len) {
        Ok(len) if len <= max => Ok(len.to_be_bytes()),
        _ => Err(ProtocolError::FrameTooLarge {
            size: len as u64,
            max,
        }),
    }
}

/// Decodes a length prefix, rejecting lengths above `max` before any
/// allocation happens.
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE], max: u32) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(prefix);
    if len > max {
        return Err(ProtocolError::FrameTooLarge {
            size: u64::from(len),
            max,
        });
    }
    Ok(len as usize)
}

/// Frames a payload: length prefix followed by the payload bytes.
///
/// # Example
///
/// ```rust
/// use framecast_protocol::encode_frame;
///
/// let bytes = encode_frame(b"ack", 1024).unwrap();
/// assert_eq!(bytes, [0, 0, 0, 3, b'a', b'c', b'k']);
/// ```
pub fn encode_frame(payload: &[u8], max: u32) -> ProtocolResult<Vec<u8>> {
    let prefix = encode_length(payload.len(), max)?;
    let mut buffer = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buffer.extend_from_slice(&prefix);
    buffer.extend_from_slice(payload);
    Ok(buffer)
}

/// Extracts the payload of one complete frame held in `data`.
///
/// Trailing bytes after the frame are ignored.
pub fn decode_frame(data: &[u8], max: u32) -> ProtocolResult<&[u8]> {
    let Some(prefix) = data.first_chunk::<LENGTH_PREFIX_SIZE>() else {
        return Err(ProtocolError::IncompleteFrame {
            expected: LENGTH_PREFIX_SIZE,
            received: data.len(),
        });
    };

    let len = decode_length(*prefix, max)?;
    let end = LENGTH_PREFIX_SIZE + len;
    if data.len() < end {
        return Err(ProtocolError::IncompleteFrame {
            expected: end,
            received: data.len(),
        });
    }

    Ok(&data[LENGTH_PREFIX_SIZE..end])
}

/// Reads frames from a blocking byte stream.
pub struct FrameReader<R> {
    reader: R,
    max_frame_size: u32,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, max_frame_size: u32) -> Self {
        Self {
            reader,
            max_frame_size,
        }
    }

    /// Reads one frame payload.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly before a length prefix.
    /// A stream ending inside a frame is an error. Short reads are retried
    /// until the whole payload has arrived.
    pub fn read_frame(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let mut filled = 0;
        while filled < prefix.len() {
            match self.reader.read(&mut prefix[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        let len = decode_length(prefix, self.max_frame_size)?;
        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload)?;
        Ok(Some(payload))
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }
}

/// Writes frames to a blocking byte stream.
pub struct FrameWriter<W> {
    writer: W,
    max_frame_size: u32,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W, max_frame_size: u32) -> Self {
        Self {
            writer,
            max_frame_size,
        }
    }

    /// Writes one frame: the full prefix, then the full payload, then flushes.
    pub fn write_frame(&mut self, payload: &[u8]) -> ProtocolResult<()> {
        let prefix = encode_length(payload.len(), self.max_frame_size)?;
        self.writer.write_all(&prefix)?;
        self.writer.write_all(payload)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Serializes and writes a message.
    pub fn write_message(&mut self, message: &dyn Encodable) -> ProtocolResult<()> {
        self.write_frame(&message.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_MAX_FRAME_SIZE;
    use std::io::Cursor;

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn begin_decode_reads_prefix_first() {
        assert_eq!(begin_decode(), 4);
    }

    #[test]
    fn encode_prefix_is_big_endian() {
        let bytes = encode_frame(&[0xAB; 258], DEFAULT_MAX_FRAME_SIZE).unwrap();
        assert_eq!(&bytes[..4], &[0, 0, 1, 2]);
        assert_eq!(bytes.len(), 262);
    }

    #[test]
    fn roundtrip_across_sizes() {
        for len in [0usize, 1, 3, 4, 5, 255, 256, 65_537] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let bytes = encode_frame(&payload, DEFAULT_MAX_FRAME_SIZE).unwrap();
            assert_eq!(decode_frame(&bytes, DEFAULT_MAX_FRAME_SIZE).unwrap(), &payload[..]);
        }
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let result = encode_frame(&[0u8; 11], 10);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { size: 11, max: 10 })
        ));
    }

    #[test]
    fn decode_length_rejects_huge_prefix() {
        let result = decode_length([0xFF; 4], DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { size: 0xFFFF_FFFF, .. })
        ));
    }

    #[test]
    fn decode_incomplete_prefix() {
        let result = decode_frame(&[0, 0], DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteFrame { expected: 4, received: 2 })
        ));
    }

    #[test]
    fn decode_incomplete_payload() {
        let mut data = vec![0, 0, 0, 100];
        data.extend_from_slice(&[0u8; 10]);
        let result = decode_frame(&data, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteFrame { expected: 104, received: 14 })
        ));
    }

    #[test]
    fn reader_handles_multiple_frames_and_eof() {
        let mut bytes = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut bytes, DEFAULT_MAX_FRAME_SIZE);
            writer.write_frame(b"first").unwrap();
            writer.write_frame(b"").unwrap();
            writer.write_message(&b"third".to_vec()).unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(bytes), DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(reader.read_frame().unwrap().unwrap(), b"first");
        assert_eq!(reader.read_frame().unwrap().unwrap(), b"");
        assert_eq!(reader.read_frame().unwrap().unwrap(), b"third");
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn reader_accumulates_short_reads() {
        let bytes = encode_frame(b"hogehoge", DEFAULT_MAX_FRAME_SIZE).unwrap();
        let trickle = Trickle {
            data: Cursor::new(bytes),
            chunk: 1,
        };

        let mut reader = FrameReader::new(trickle, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(reader.read_frame().unwrap().unwrap(), b"hogehoge");
    }

    #[test]
    fn reader_reports_truncated_frame() {
        let mut bytes = encode_frame(b"hogehoge", DEFAULT_MAX_FRAME_SIZE).unwrap();
        bytes.truncate(7);

        let mut reader = FrameReader::new(Cursor::new(bytes), DEFAULT_MAX_FRAME_SIZE);
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_eof());
    }

    #[test]
    fn reader_reports_truncated_prefix() {
        let mut reader = FrameReader::new(Cursor::new(vec![0u8, 0]), DEFAULT_MAX_FRAME_SIZE);
        assert!(reader.read_frame().unwrap_err().is_eof());
    }

    #[test]
    fn reader_rejects_oversized_without_reading_payload() {
        let mut reader = FrameReader::new(Cursor::new(vec![0xFF; 4]), DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(
            reader.read_frame(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }
}
