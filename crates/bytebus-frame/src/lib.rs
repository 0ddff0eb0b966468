//! Length-prefixed message framing for bytebus stream transports.
//!
//! A bytebus channel maps to exactly one stream per subscriber, so frames
//! carry no routing metadata. Every message is framed with:
//! - A 2-byte magic number ("BB") for stream synchronization
//! - A 4-byte little-endian payload length
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
