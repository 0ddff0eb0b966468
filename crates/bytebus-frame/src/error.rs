/// Errors that can occur when encoding or decoding message frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream is not positioned at a frame boundary.
    #[error("invalid magic bytes at frame boundary")]
    InvalidMagic,

    /// The payload exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stream reached EOF, between frames or mid-frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred on the underlying stream.
    ///
    /// `WouldBlock`/`TimedOut` kinds surface here when the stream carries a
    /// timeout; callers that need non-blocking delivery treat them as a
    /// stalled peer.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
