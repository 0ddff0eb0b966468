use bytebus_transport::TransportError;

/// Errors that can occur on publisher and subscriber sockets.
///
/// A receive deadline elapsing is not an error; it is the `Ok(None)` result
/// of [`receive`](crate::SubscriberSocket::receive).
#[derive(Debug, thiserror::Error)]
pub enum SockError {
    /// The channel name is malformed. Raised synchronously at socket
    /// creation, never retried.
    #[error("invalid channel name {name:?}: {reason}")]
    InvalidChannelName { name: String, reason: &'static str },

    /// The channel's transport resource could not be acquired — typically a
    /// live publisher already owns it. The caller decides whether to retry.
    #[error("channel {name:?} unavailable: {reason}")]
    ChannelUnavailable { name: String, reason: String },

    /// Operation on a handle that has been closed. Also returned to a
    /// blocked `receive` when the handle is closed from another thread.
    #[error("handle closed")]
    HandleClosed,

    /// The transport failed. The handle stays usable for subsequent calls.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, SockError>;
