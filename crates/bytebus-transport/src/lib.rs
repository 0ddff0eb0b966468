//! Transport endpoints for bytebus channels.
//!
//! A transport provides, per channel: publisher/subscriber registration, a
//! fan-out send primitive, a deadline-bounded receive primitive with a
//! buffered-count query, and a readiness signal. Anything satisfying the
//! traits in [`traits`] is substitutable; two implementations ship here:
//!
//! - [`UdsTransport`] — cross-process delivery over Unix domain sockets
//! - [`LocalTransport`] — in-process delivery with immediate registration,
//!   the reference semantics for tests

pub mod error;
pub mod local;
pub mod paths;
pub mod traits;

mod queue;

#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use local::LocalTransport;
pub use paths::{channel_socket_path, default_bus_dir};
pub use traits::{ChannelAddress, PublishEndpoint, Recv, SubscribeEndpoint, Transport};

#[cfg(unix)]
pub use stream::BusStream;
#[cfg(unix)]
pub use uds::UdsTransport;
