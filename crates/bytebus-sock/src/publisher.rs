use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytebus_transport::{PublishEndpoint, TransportError};
use tracing::debug;

use crate::error::{Result, SockError};
use crate::registry::ChannelRegistry;

/// The publish side of a channel: fire-and-forget broadcast to every
/// subscriber attached at send time.
///
/// At most one live publisher per channel; a second open fails with
/// [`SockError::ChannelUnavailable`]. Subscribers that connect after a send
/// do not see it — callers needing delivery synchronize on
/// [`wait_for_subscribers`](PublisherSocket::wait_for_subscribers) before
/// sending.
pub struct PublisherSocket {
    name: String,
    registry: Arc<ChannelRegistry>,
    endpoint: Arc<dyn PublishEndpoint>,
    closed: AtomicBool,
}

impl PublisherSocket {
    /// Resolve `name` and acquire the channel's publish resource.
    pub fn open(registry: &Arc<ChannelRegistry>, name: &str) -> Result<Self> {
        let addr = registry.resolve(name)?;
        registry.register_publisher(name)?;

        let endpoint = match registry.transport().open_publisher(&addr) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                registry.unregister_publisher(name);
                return Err(map_open_error(name, err));
            }
        };

        debug!(
            channel = name,
            transport = registry.transport().name(),
            "publisher socket open"
        );

        Ok(Self {
            name: name.to_string(),
            registry: Arc::clone(registry),
            endpoint,
            closed: AtomicBool::new(false),
        })
    }

    /// Broadcast one message to all currently attached subscribers.
    ///
    /// Returns once the message is handed to the transport; never waits for
    /// subscriber acknowledgment, and a slow subscriber is disconnected
    /// rather than back-pressuring this call.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SockError::HandleClosed);
        }
        self.endpoint.send(payload).map_err(Into::into)
    }

    /// Number of subscribers currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.endpoint.subscriber_count()
    }

    /// Wait until at least `count` subscribers are attached.
    ///
    /// Subscriber connection settles asynchronously; this is the reliable
    /// way to know a subsequent `send` will reach them. Returns false if
    /// `timeout` elapses first.
    pub fn wait_for_subscribers(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.subscriber_count() < count {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }

    /// The channel this socket publishes on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the channel's publish resource. Idempotent; subsequent sends
    /// fail with [`SockError::HandleClosed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.endpoint.close();
        self.registry.unregister_publisher(&self.name);
        debug!(channel = %self.name, "publisher socket closed");
    }
}

impl Drop for PublisherSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PublisherSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherSocket")
            .field("channel", &self.name)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn map_open_error(name: &str, err: TransportError) -> SockError {
    match err {
        TransportError::PublisherConflict { .. }
        | TransportError::Bind { .. }
        | TransportError::PathTooLong { .. } => SockError::ChannelUnavailable {
            name: name.to_string(),
            reason: err.to_string(),
        },
        other => SockError::Transport(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_send_on_in_process_registry() {
        let registry = Arc::new(ChannelRegistry::in_process());
        let publisher = PublisherSocket::open(&registry, "announce").unwrap();
        publisher.send(b"no subscribers yet").unwrap();
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn invalid_name_fails_synchronously() {
        let registry = Arc::new(ChannelRegistry::in_process());
        let err = PublisherSocket::open(&registry, "no/slashes").unwrap_err();
        assert!(matches!(err, SockError::InvalidChannelName { .. }));
    }

    #[test]
    fn second_publisher_is_unavailable() {
        let registry = Arc::new(ChannelRegistry::in_process());
        let _first = PublisherSocket::open(&registry, "exclusive").unwrap();
        let err = PublisherSocket::open(&registry, "exclusive").unwrap_err();
        assert!(matches!(err, SockError::ChannelUnavailable { .. }));
    }

    #[test]
    fn close_is_idempotent_and_frees_the_channel() {
        let registry = Arc::new(ChannelRegistry::in_process());
        let publisher = PublisherSocket::open(&registry, "cycle").unwrap();
        publisher.close();
        publisher.close();
        assert!(matches!(
            publisher.send(b"x").unwrap_err(),
            SockError::HandleClosed
        ));

        PublisherSocket::open(&registry, "cycle").unwrap();
    }

    #[test]
    fn drop_releases_the_channel() {
        let registry = Arc::new(ChannelRegistry::in_process());
        {
            let _publisher = PublisherSocket::open(&registry, "scoped").unwrap();
        }
        PublisherSocket::open(&registry, "scoped").unwrap();
    }

    #[test]
    fn wait_for_subscribers_times_out_cleanly() {
        let registry = Arc::new(ChannelRegistry::in_process());
        let publisher = PublisherSocket::open(&registry, "lonely").unwrap();
        let start = Instant::now();
        assert!(!publisher.wait_for_subscribers(1, Duration::from_millis(30)));
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
