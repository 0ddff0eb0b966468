use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use crate::error::Result;

/// Resolved transport location of a channel.
///
/// Produced by the channel registry; interpreted by the transport. The
/// in-process transport keys on the name alone, the UDS transport on the
/// socket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAddress {
    name: String,
    path: PathBuf,
}

impl ChannelAddress {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// The channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The socket path backing this channel.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of a deadline-bounded receive on a subscribe endpoint.
#[derive(Debug)]
pub enum Recv {
    /// The next buffered message, in arrival order.
    Message(Bytes),
    /// The deadline elapsed with nothing available.
    TimedOut,
    /// The endpoint was closed.
    Closed,
}

/// A pub/sub delivery substrate for one process.
///
/// Implementations must be safe to share across threads; endpoints opened
/// from one transport instance on the same address observe each other.
pub trait Transport: Send + Sync {
    /// Register as the channel's publisher and acquire its publish resource.
    fn open_publisher(&self, addr: &ChannelAddress) -> Result<Arc<dyn PublishEndpoint>>;

    /// Register as a subscriber on the channel.
    ///
    /// Succeeds even when no publisher exists yet; delivery begins once the
    /// subscription settles (see [`SubscribeEndpoint::is_ready`]).
    fn open_subscriber(&self, addr: &ChannelAddress) -> Result<Arc<dyn SubscribeEndpoint>>;

    /// Transport name for diagnostics.
    fn name(&self) -> &'static str;
}

/// The publish side of a channel.
pub trait PublishEndpoint: Send + Sync {
    /// Hand one message to the transport for fan-out to currently attached
    /// subscribers. Returns once the message is enqueued locally; never
    /// blocks on slow or absent subscribers.
    fn send(&self, payload: &[u8]) -> Result<()>;

    /// Number of subscriber connections currently attached.
    fn subscriber_count(&self) -> usize;

    /// Release the publish resource. Idempotent.
    fn close(&self);
}

/// The subscribe side of a channel.
pub trait SubscribeEndpoint: Send + Sync {
    /// Wait for the next message, until `deadline` if one is given.
    fn recv_deadline(&self, deadline: Option<Instant>) -> Result<Recv>;

    /// Number of messages currently buffered on this endpoint.
    fn queued(&self) -> usize;

    /// Whether the subscription has settled and messages can arrive.
    fn is_ready(&self) -> bool;

    /// Unblock any in-progress receive and release resources. Idempotent.
    fn close(&self);
}
