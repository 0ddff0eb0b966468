//! In-process transport.
//!
//! Simulates the bus entirely within one process: no sockets, no settle
//! latency. Subscriptions are registered immediately — once
//! `open_subscriber` returns, subsequent matching publishes are deliverable.
//! This makes it the reference implementation of the pub/sub contract;
//! other transports approximate these semantics as closely as their
//! substrate allows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::queue::RecvQueue;
use crate::traits::{ChannelAddress, PublishEndpoint, Recv, SubscribeEndpoint, Transport};

#[derive(Default)]
struct LocalChannel {
    publisher_live: bool,
    subscribers: Vec<Arc<RecvQueue>>,
}

#[derive(Default)]
struct LocalBus {
    channels: Mutex<HashMap<String, LocalChannel>>,
}

impl LocalBus {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, LocalChannel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process transport.
///
/// Endpoints opened from the same `LocalTransport` instance observe each
/// other; distinct instances are fully isolated buses.
#[derive(Default)]
pub struct LocalTransport {
    bus: Arc<LocalBus>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for LocalTransport {
    fn open_publisher(&self, addr: &ChannelAddress) -> Result<Arc<dyn PublishEndpoint>> {
        let mut channels = self.bus.lock();
        let channel = channels.entry(addr.name().to_string()).or_default();
        if channel.publisher_live {
            return Err(TransportError::PublisherConflict {
                channel: addr.name().to_string(),
            });
        }
        channel.publisher_live = true;
        debug!(channel = addr.name(), "local publisher registered");

        Ok(Arc::new(LocalPublisher {
            bus: Arc::clone(&self.bus),
            channel: addr.name().to_string(),
            closed: AtomicBool::new(false),
        }))
    }

    fn open_subscriber(&self, addr: &ChannelAddress) -> Result<Arc<dyn SubscribeEndpoint>> {
        let queue = Arc::new(RecvQueue::new());
        let mut channels = self.bus.lock();
        let channel = channels.entry(addr.name().to_string()).or_default();
        channel.subscribers.push(Arc::clone(&queue));
        debug!(channel = addr.name(), "local subscriber registered");

        Ok(Arc::new(LocalSubscriber {
            bus: Arc::clone(&self.bus),
            channel: addr.name().to_string(),
            queue,
            closed: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

struct LocalPublisher {
    bus: Arc<LocalBus>,
    channel: String,
    closed: AtomicBool,
}

impl PublishEndpoint for LocalPublisher {
    fn send(&self, payload: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let mut channels = self.bus.lock();
        if let Some(channel) = channels.get_mut(&self.channel) {
            let frame = Bytes::copy_from_slice(payload);
            // A push that fails hit a closed subscriber queue; prune it.
            channel.subscribers.retain(|queue| queue.push(frame.clone()));
        }
        Ok(())
    }

    fn subscriber_count(&self) -> usize {
        self.bus
            .lock()
            .get(&self.channel)
            .map(|channel| channel.subscribers.len())
            .unwrap_or(0)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut channels = self.bus.lock();
        if let Some(channel) = channels.get_mut(&self.channel) {
            channel.publisher_live = false;
        }
        debug!(channel = %self.channel, "local publisher closed");
    }
}

impl Drop for LocalPublisher {
    fn drop(&mut self) {
        self.close();
    }
}

struct LocalSubscriber {
    bus: Arc<LocalBus>,
    channel: String,
    queue: Arc<RecvQueue>,
    closed: AtomicBool,
}

impl SubscribeEndpoint for LocalSubscriber {
    fn recv_deadline(&self, deadline: Option<Instant>) -> Result<Recv> {
        Ok(self.queue.pop_deadline(deadline))
    }

    fn queued(&self) -> usize {
        self.queue.len()
    }

    fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.close();
        let mut channels = self.bus.lock();
        if let Some(channel) = channels.get_mut(&self.channel) {
            channel
                .subscribers
                .retain(|queue| !Arc::ptr_eq(queue, &self.queue));
        }
        debug!(channel = %self.channel, "local subscriber closed");
    }
}

impl Drop for LocalSubscriber {
    fn drop(&mut self) {
        self.close();
    }
}
