use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the channel's publish resource.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the channel's publish resource.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming subscriber connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on a transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Another live publisher already owns this channel.
    #[error("channel {channel:?} already has a live publisher")]
    PublisherConflict { channel: String },

    /// The endpoint has been closed.
    #[error("endpoint closed")]
    Closed,

    /// A frame could not be encoded for the wire.
    #[error(transparent)]
    Frame(#[from] bytebus_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, TransportError>;
