//! Length-prefixed frame codec for framecast.
//!
//! Every message on the wire is one frame:
//! - 4 bytes: payload length (u32, big-endian)
//! - N bytes: opaque payload
//!
//! There is no envelope, checksum or type tag. Telling message types apart
//! is left to the payload encoding (see [`framecast_core::MessageFactory`]).
//!
//! # Example
//!
//! ```rust
//! use framecast_protocol::{decode_frame, encode_frame, DEFAULT_MAX_FRAME_SIZE};
//!
//! let bytes = encode_frame(b"hogehoge", DEFAULT_MAX_FRAME_SIZE).unwrap();
//! assert_eq!(&bytes[..4], &[0, 0, 0, 8]);
//! assert_eq!(decode_frame(&bytes, DEFAULT_MAX_FRAME_SIZE).unwrap(), b"hogehoge");
//! ```

mod error;
mod framing;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{
    FrameReader, FrameWriter, begin_decode, decode_frame, decode_length, encode_frame,
    encode_length,
};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Port used by the sample server and client when none is given.
pub const DEFAULT_PORT: u16 = 1111;

/// Default upper bound on a single payload (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;
