//! Unix-domain-socket transport.
//!
//! One publisher binds a listener at the channel's socket path and fans
//! every send out to the subscriber connections accepted so far. Each
//! subscriber runs a connect-retry thread, so a subscriber may be created
//! before its publisher exists and survives publisher restarts. Delivery to
//! a given subscriber starts only once its connection has been accepted —
//! the settle window callers observe via readiness/subscriber counts.

use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytebus_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::queue::RecvQueue;
use crate::stream::BusStream;
use crate::traits::{ChannelAddress, PublishEndpoint, Recv, SubscribeEndpoint, Transport};

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// How long one send may stall on a subscriber before that connection is
/// dropped. Eviction, not backpressure: the publisher never waits longer
/// than this on any subscriber.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Interval between connect attempts while a subscriber waits for its
/// publisher to appear.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Unix-domain-socket transport.
///
/// Stateless: every channel's resources hang off the socket path in its
/// [`ChannelAddress`], so any two processes resolving the same path reach
/// the same channel.
pub struct UdsTransport {
    config: FrameConfig,
    socket_mode: u32,
}

impl UdsTransport {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    pub fn new() -> Self {
        Self::with_config(FrameConfig {
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            ..FrameConfig::default()
        })
    }

    /// Create a transport with explicit frame configuration. The write
    /// timeout bounds how long a send may stall per subscriber.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            config,
            socket_mode: Self::DEFAULT_SOCKET_MODE,
        }
    }
}

impl Default for UdsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UdsTransport {
    fn open_publisher(&self, addr: &ChannelAddress) -> Result<Arc<dyn PublishEndpoint>> {
        Ok(Arc::new(UdsPublisher::bind(
            addr,
            self.config.clone(),
            self.socket_mode,
        )?))
    }

    fn open_subscriber(&self, addr: &ChannelAddress) -> Result<Arc<dyn SubscribeEndpoint>> {
        Ok(Arc::new(UdsSubscriber::open(addr, self.config.clone())))
    }

    fn name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

struct PubShared {
    conns: Mutex<Vec<FrameWriter<BusStream>>>,
    stopped: AtomicBool,
}

impl PubShared {
    fn conns(&self) -> MutexGuard<'_, Vec<FrameWriter<BusStream>>> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct UdsPublisher {
    channel: String,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
    config: FrameConfig,
    shared: Arc<PubShared>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl UdsPublisher {
    fn bind(addr: &ChannelAddress, config: FrameConfig, mode: u32) -> Result<Self> {
        let path = addr.path().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: MAX_PATH_LEN,
            });
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
        }

        reclaim_stale_socket(&path, addr.name())?;

        let listener = UnixListener::bind(&path).map_err(|e| match e.kind() {
            ErrorKind::AddrInUse => TransportError::PublisherConflict {
                channel: addr.name().to_string(),
            },
            _ => TransportError::Bind {
                path: path.clone(),
                source: e,
            },
        })?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            TransportError::Bind {
                path: path.clone(),
                source: e,
            }
        })?;
        let created_metadata =
            std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
        let created_inode = Some((created_metadata.dev(), created_metadata.ino()));

        info!(channel = addr.name(), ?path, "publisher listening");

        let shared = Arc::new(PubShared {
            conns: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });

        let accept_handle = {
            let shared = Arc::clone(&shared);
            let config = config.clone();
            let channel = addr.name().to_string();
            std::thread::spawn(move || run_acceptor(&listener, &shared, &config, &channel))
        };

        Ok(Self {
            channel: addr.name().to_string(),
            path,
            created_inode,
            config,
            shared,
            accept_handle: Mutex::new(Some(accept_handle)),
            closed: AtomicBool::new(false),
        })
    }
}

impl PublishEndpoint for UdsPublisher {
    fn send(&self, payload: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if payload.len() > self.config.max_payload_size {
            return Err(TransportError::Frame(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            }));
        }

        let channel = self.channel.as_str();
        let mut conns = self.shared.conns();
        conns.retain_mut(|writer| match writer.send(payload) {
            Ok(()) => true,
            Err(err) => {
                // Stalled or dead connection; the subscriber reconnects
                // with fresh state.
                debug!(channel, %err, "dropping subscriber connection");
                false
            }
        });
        Ok(())
    }

    fn subscriber_count(&self) -> usize {
        self.shared.conns().len()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.stopped.store(true, Ordering::Release);
        // Wake the acceptor; it observes `stopped` and exits.
        let _ = UnixStream::connect(&self.path);
        if let Some(handle) = self
            .accept_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = handle.join();
        }
        self.shared.conns().clear();
        remove_socket_if_ours(&self.path, self.created_inode);
        debug!(channel = %self.channel, "publisher closed");
    }
}

impl Drop for UdsPublisher {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_acceptor(listener: &UnixListener, shared: &PubShared, config: &FrameConfig, channel: &str) {
    loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                if shared.stopped.load(Ordering::Acquire) {
                    break;
                }
                let stream = BusStream::from_unix(stream);
                if let Err(err) = stream.set_write_timeout(config.write_timeout) {
                    warn!(channel, %err, "rejecting connection");
                    continue;
                }
                shared
                    .conns()
                    .push(FrameWriter::with_config(stream, config.clone()));
                debug!(channel, "subscriber attached");
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                if shared.stopped.load(Ordering::Acquire) {
                    break;
                }
                warn!(channel, %err, "accept failed");
            }
        }
    }
}

/// Remove a leftover socket file, but only if no publisher is listening
/// behind it. A live listener means a foreign publisher owns the channel.
fn reclaim_stale_socket(path: &Path, channel: &str) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let metadata = std::fs::symlink_metadata(path).map_err(|e| TransportError::Bind {
        path: path.to_path_buf(),
        source: e,
    })?;
    if !metadata.file_type().is_socket() {
        return Err(TransportError::Bind {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                ErrorKind::AlreadyExists,
                "existing path is not a unix socket",
            ),
        });
    }

    match UnixStream::connect(path) {
        Ok(_probe) => Err(TransportError::PublisherConflict {
            channel: channel.to_string(),
        }),
        Err(err) if err.kind() == ErrorKind::ConnectionRefused => {
            debug!(?path, "removing stale socket");
            std::fs::remove_file(path).map_err(|e| TransportError::Bind {
                path: path.to_path_buf(),
                source: e,
            })
        }
        Err(err) => Err(TransportError::Bind {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

/// Remove the socket file on teardown, unless the path identity changed
/// since bind (another process may have replaced it).
fn remove_socket_if_ours(path: &Path, created_inode: Option<(u64, u64)>) {
    let Some((expected_dev, expected_ino)) = created_inode else {
        return;
    };
    if let Ok(metadata) = std::fs::symlink_metadata(path) {
        if metadata.file_type().is_socket()
            && metadata.dev() == expected_dev
            && metadata.ino() == expected_ino
        {
            debug!(?path, "cleaning up socket file");
            let _ = std::fs::remove_file(path);
        } else {
            debug!(?path, "socket path identity changed; skipping cleanup");
        }
    }
}

struct SubShared {
    queue: RecvQueue,
    ready: AtomicBool,
    stopped: AtomicBool,
    stream: Mutex<Option<BusStream>>,
}

struct UdsSubscriber {
    channel: String,
    shared: Arc<SubShared>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl UdsSubscriber {
    fn open(addr: &ChannelAddress, config: FrameConfig) -> Self {
        let shared = Arc::new(SubShared {
            queue: RecvQueue::new(),
            ready: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stream: Mutex::new(None),
        });

        let reader_handle = {
            let shared = Arc::clone(&shared);
            let path = addr.path().to_path_buf();
            let channel = addr.name().to_string();
            std::thread::spawn(move || run_reader(&shared, &path, &config, &channel))
        };

        Self {
            channel: addr.name().to_string(),
            shared,
            reader_handle: Mutex::new(Some(reader_handle)),
            closed: AtomicBool::new(false),
        }
    }
}

impl SubscribeEndpoint for UdsSubscriber {
    fn recv_deadline(&self, deadline: Option<Instant>) -> Result<Recv> {
        Ok(self.shared.queue.pop_deadline(deadline))
    }

    fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.stopped.store(true, Ordering::Release);
        if let Some(stream) = self
            .shared
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = stream.shutdown();
        }
        self.shared.queue.close();
        if let Some(handle) = self
            .reader_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = handle.join();
        }
        debug!(channel = %self.channel, "subscriber closed");
    }
}

impl Drop for UdsSubscriber {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_reader(shared: &SubShared, path: &Path, config: &FrameConfig, channel: &str) {
    while !shared.stopped.load(Ordering::Acquire) {
        let stream = match UnixStream::connect(path) {
            Ok(stream) => BusStream::from_unix(stream),
            Err(_) => {
                // No publisher yet (or it went away); keep trying.
                std::thread::sleep(CONNECT_RETRY_INTERVAL);
                continue;
            }
        };

        let control = match stream.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                warn!(channel, %err, "failed to clone stream");
                continue;
            }
        };
        *shared
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(control);
        if shared.stopped.load(Ordering::Acquire) {
            // close() raced the connect; it may have missed the stream.
            let _ = stream.shutdown();
            break;
        }

        shared.ready.store(true, Ordering::Release);
        debug!(channel, "subscription settled");

        let mut reader = FrameReader::with_config(stream, config.clone());
        loop {
            match reader.read_message() {
                Ok(payload) => {
                    if !shared.queue.push(payload) {
                        return;
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    debug!(channel, "publisher went away; reconnecting");
                    break;
                }
                Err(err) => {
                    debug!(channel, %err, "stream error; reconnecting");
                    break;
                }
            }
        }

        shared.ready.store(false, Ordering::Release);
        *shared
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn bus_addr(dir: &tempfile::TempDir, name: &str) -> ChannelAddress {
        ChannelAddress::new(name, dir.path().join(format!("{name}.sock")))
    }

    #[test]
    fn publish_subscribe_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let transport = UdsTransport::new();
        let addr = bus_addr(&dir, "roundtrip");

        let publisher = transport.open_publisher(&addr).unwrap();
        let subscriber = transport.open_subscriber(&addr).unwrap();
        assert!(wait_for(
            || publisher.subscriber_count() == 1,
            Duration::from_secs(2)
        ));

        publisher.send(b"over-the-wire").unwrap();

        let outcome = subscriber
            .recv_deadline(Some(Instant::now() + Duration::from_secs(2)))
            .unwrap();
        assert!(matches!(outcome, Recv::Message(m) if m.as_ref() == b"over-the-wire"));
    }

    #[test]
    fn subscriber_may_exist_before_publisher() {
        let dir = tempfile::tempdir().unwrap();
        let transport = UdsTransport::new();
        let addr = bus_addr(&dir, "early-sub");

        let subscriber = transport.open_subscriber(&addr).unwrap();
        assert!(!subscriber.is_ready());

        let publisher = transport.open_publisher(&addr).unwrap();
        assert!(wait_for(
            || publisher.subscriber_count() == 1,
            Duration::from_secs(2)
        ));

        publisher.send(b"late-bloomer").unwrap();
        let outcome = subscriber
            .recv_deadline(Some(Instant::now() + Duration::from_secs(2)))
            .unwrap();
        assert!(matches!(outcome, Recv::Message(m) if m.as_ref() == b"late-bloomer"));
    }

    #[test]
    fn second_publisher_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let transport = UdsTransport::new();
        let addr = bus_addr(&dir, "solo");

        let _first = transport.open_publisher(&addr).unwrap();
        let err = transport.open_publisher(&addr).err().unwrap();
        assert!(matches!(err, TransportError::PublisherConflict { .. }));
    }

    #[test]
    fn stale_socket_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let addr = bus_addr(&dir, "stale");

        // A listener dropped without cleanup leaves a dead socket file.
        let dead = UnixListener::bind(addr.path()).unwrap();
        drop(dead);
        assert!(addr.path().exists());

        let transport = UdsTransport::new();
        let publisher = transport.open_publisher(&addr).unwrap();
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn bind_rejects_existing_non_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let addr = bus_addr(&dir, "not-a-socket");
        std::fs::write(addr.path(), b"regular-file").unwrap();

        let transport = UdsTransport::new();
        let err = transport.open_publisher(&addr).err().unwrap();
        assert!(matches!(err, TransportError::Bind { .. }));
    }

    #[test]
    fn path_too_long_is_rejected() {
        let long = "a".repeat(200);
        let addr = ChannelAddress::new("long", format!("/tmp/{long}.sock"));
        let transport = UdsTransport::new();
        let err = transport.open_publisher(&addr).err().unwrap();
        assert!(matches!(err, TransportError::PathTooLong { .. }));
    }

    #[test]
    fn close_removes_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = UdsTransport::new();
        let addr = bus_addr(&dir, "cleanup");

        let publisher = transport.open_publisher(&addr).unwrap();
        assert!(addr.path().exists());
        publisher.close();
        assert!(!addr.path().exists());
    }

    #[test]
    fn close_unblocks_pending_recv() {
        let dir = tempfile::tempdir().unwrap();
        let transport = UdsTransport::new();
        let addr = bus_addr(&dir, "unblock");

        let subscriber = transport.open_subscriber(&addr).unwrap();
        let waiter = {
            let subscriber = Arc::clone(&subscriber);
            std::thread::spawn(move || subscriber.recv_deadline(None))
        };

        std::thread::sleep(Duration::from_millis(30));
        subscriber.close();

        let outcome = waiter.join().expect("waiter thread should finish");
        assert!(matches!(outcome, Ok(Recv::Closed)));
    }

    #[test]
    fn subscriber_survives_publisher_restart() {
        let dir = tempfile::tempdir().unwrap();
        let transport = UdsTransport::new();
        let addr = bus_addr(&dir, "restart");

        let first = transport.open_publisher(&addr).unwrap();
        let subscriber = transport.open_subscriber(&addr).unwrap();
        assert!(wait_for(
            || first.subscriber_count() == 1,
            Duration::from_secs(2)
        ));
        first.send(b"before").unwrap();
        let outcome = subscriber
            .recv_deadline(Some(Instant::now() + Duration::from_secs(2)))
            .unwrap();
        assert!(matches!(outcome, Recv::Message(m) if m.as_ref() == b"before"));

        first.close();
        let second = transport.open_publisher(&addr).unwrap();
        assert!(wait_for(
            || second.subscriber_count() == 1,
            Duration::from_secs(5)
        ));

        second.send(b"after").unwrap();
        let outcome = subscriber
            .recv_deadline(Some(Instant::now() + Duration::from_secs(2)))
            .unwrap();
        assert!(matches!(outcome, Recv::Message(m) if m.as_ref() == b"after"));
    }
}
