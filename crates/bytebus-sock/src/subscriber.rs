use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytebus_transport::{Recv, SubscribeEndpoint};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{Result, SockError};
use crate::inbox::Inbox;
use crate::registry::ChannelRegistry;

/// Per-subscriber retention and wait policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubOptions {
    /// Keep only the most recent unread message, discarding older unread
    /// ones. Default: keep everything in arrival order.
    pub conflate: bool,
    /// Deadline for each `receive` call. `None` blocks until a message
    /// arrives or the handle is closed.
    pub timeout: Option<Duration>,
}

impl SubOptions {
    /// Conflating subscription with no receive deadline.
    pub fn conflated() -> Self {
        Self {
            conflate: true,
            timeout: None,
        }
    }

    /// Non-conflating subscription with a per-receive deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            conflate: false,
            timeout: Some(timeout),
        }
    }
}

/// The subscribe side of a channel.
///
/// A delivery thread moves transport arrivals into the socket's inbox as
/// they land; `receive` and `drain` only ever consult the inbox, so the
/// configured timeout is honored regardless of what the transport is doing.
///
/// Connection settles asynchronously (`Disconnected → Connecting → Ready`);
/// a `receive` issued before [`is_ready`](SubscriberSocket::is_ready) simply
/// finds no message. Messages published before the settle are never
/// delivered — there is no historical replay.
pub struct SubscriberSocket {
    name: String,
    options: SubOptions,
    registry: Arc<ChannelRegistry>,
    endpoint: Arc<dyn SubscribeEndpoint>,
    inbox: Arc<Inbox>,
    delivery_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SubscriberSocket {
    /// Resolve `name` and register a subscription with its own retention
    /// state and wait policy.
    pub fn open(registry: &Arc<ChannelRegistry>, name: &str, options: SubOptions) -> Result<Self> {
        let addr = registry.resolve(name)?;
        registry.register_subscriber(name);

        let endpoint = match registry.transport().open_subscriber(&addr) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                registry.unregister_subscriber(name);
                return Err(err.into());
            }
        };

        let inbox = Arc::new(Inbox::new(options.conflate));
        let delivery_handle = {
            let endpoint = Arc::clone(&endpoint);
            let inbox = Arc::clone(&inbox);
            let channel = name.to_string();
            std::thread::spawn(move || run_delivery(&endpoint, &inbox, &channel))
        };

        debug!(
            channel = name,
            conflate = options.conflate,
            timeout_ms = options.timeout.map(|t| t.as_millis() as u64),
            "subscriber socket open"
        );

        Ok(Self {
            name: name.to_string(),
            options,
            registry: Arc::clone(registry),
            endpoint,
            inbox,
            delivery_handle: Mutex::new(Some(delivery_handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// Wait for the next message, up to this socket's configured timeout.
    ///
    /// - conflate on: the most recently arrived unconsumed message; anything
    ///   it overwrote is gone.
    /// - conflate off: strict arrival order, one message per call.
    ///
    /// `Ok(None)` exactly when the timeout elapses — an empty payload comes
    /// back as `Ok(Some(_))` with zero bytes. A blocked call returns
    /// `Err(HandleClosed)` if the handle is closed from another thread.
    pub fn receive(&self) -> Result<Option<Bytes>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SockError::HandleClosed);
        }
        self.inbox.recv(self.options.timeout)
    }

    /// Take every message currently resident without waiting, in arrival
    /// order. At most one element under conflation; empty when nothing has
    /// arrived.
    pub fn drain(&self) -> Result<Vec<Bytes>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SockError::HandleClosed);
        }
        self.inbox.drain()
    }

    /// Whether the subscription has settled and messages can arrive.
    pub fn is_ready(&self) -> bool {
        self.endpoint.is_ready()
    }

    /// Number of messages currently resident in the inbox.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Messages discarded by conflation so far.
    pub fn dropped(&self) -> u64 {
        self.inbox.dropped()
    }

    /// The channel this socket subscribes to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This socket's retention and wait policy.
    pub fn options(&self) -> SubOptions {
        self.options
    }

    /// Close the subscription. Idempotent, safe concurrently with an
    /// in-flight `receive` (which returns `Err(HandleClosed)` promptly),
    /// and never affects other subscribers or the publisher.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inbox.close();
        self.endpoint.close();
        if let Some(handle) = self
            .delivery_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = handle.join();
        }
        self.registry.unregister_subscriber(&self.name);
        debug!(channel = %self.name, "subscriber socket closed");
    }
}

impl Drop for SubscriberSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SubscriberSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSocket")
            .field("channel", &self.name)
            .field("conflate", &self.options.conflate)
            .field("timeout", &self.options.timeout)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn run_delivery(endpoint: &Arc<dyn SubscribeEndpoint>, inbox: &Inbox, channel: &str) {
    loop {
        match endpoint.recv_deadline(None) {
            Ok(Recv::Message(message)) => inbox.deliver(message),
            Ok(Recv::TimedOut) => continue,
            Ok(Recv::Closed) => break,
            Err(err) => {
                warn!(channel, %err, "delivery stopped");
                inbox.fail(err);
                break;
            }
        }
    }
}
