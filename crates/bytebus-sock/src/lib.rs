//! Pub/sub sockets over named channels.
//!
//! One publisher per channel broadcasts opaque byte messages to any number
//! of subscribers, each with its own retention policy (keep everything, or
//! conflate to the latest) and receive deadline. This is the policy layer of
//! bytebus; delivery itself is a [`bytebus_transport::Transport`].
//!
//! ```no_run
//! use std::time::Duration;
//!
//! let publisher = bytebus_sock::pub_sock("telemetry")?;
//! let subscriber =
//!     bytebus_sock::sub_sock("telemetry", true, Some(Duration::from_millis(100)))?;
//!
//! publisher.wait_for_subscribers(1, Duration::from_secs(1));
//! publisher.send(b"reading-42")?;
//!
//! match subscriber.receive()? {
//!     Some(message) => println!("latest: {} bytes", message.len()),
//!     None => println!("nothing within the deadline"),
//! }
//! # Ok::<(), bytebus_sock::SockError>(())
//! ```

use std::time::Duration;

pub mod drain;
pub mod error;
pub mod publisher;
pub mod registry;
pub mod subscriber;

mod inbox;

pub use drain::drain_sock_raw;
pub use error::{Result, SockError};
pub use publisher::PublisherSocket;
pub use registry::{ChannelInfo, ChannelRegistry, MAX_NAME_LEN};
pub use subscriber::{SubOptions, SubscriberSocket};

/// Open the publish side of `name` on the process-wide default registry.
pub fn pub_sock(name: &str) -> Result<PublisherSocket> {
    PublisherSocket::open(ChannelRegistry::global(), name)
}

/// Open a subscription to `name` on the process-wide default registry, with
/// its own conflation flag and receive deadline.
pub fn sub_sock(name: &str, conflate: bool, timeout: Option<Duration>) -> Result<SubscriberSocket> {
    SubscriberSocket::open(
        ChannelRegistry::global(),
        name,
        SubOptions { conflate, timeout },
    )
}
