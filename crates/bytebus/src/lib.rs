//! Pub/sub IPC over named channels.
//!
//! bytebus broadcasts opaque byte messages from one publisher per channel to
//! any number of subscribers, each with its own conflation and receive-
//! deadline policy.
//!
//! # Crate Structure
//!
//! - [`frame`] — Length-prefixed message framing for stream transports
//! - [`transport`] — Delivery substrates (Unix domain sockets, in-process)
//! - [`sock`] — Publisher/subscriber sockets, channel registry, drain

/// Re-export frame types.
pub mod frame {
    pub use bytebus_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use bytebus_transport::*;
}

/// Re-export socket types.
pub mod sock {
    pub use bytebus_sock::*;
}

pub use bytebus_sock::{
    drain_sock_raw, pub_sock, sub_sock, ChannelRegistry, PublisherSocket, SockError, SubOptions,
    SubscriberSocket,
};
