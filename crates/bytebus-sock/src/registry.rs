use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use bytebus_transport::{channel_socket_path, default_bus_dir, ChannelAddress, Transport};
use tracing::debug;

use crate::error::{Result, SockError};

/// Longest accepted channel name, in bytes. Keeps the backing socket path
/// within platform limits for any reasonable bus directory.
pub const MAX_NAME_LEN: usize = 96;

#[derive(Default, Clone, Copy)]
struct ChannelCounts {
    publishers: usize,
    subscribers: usize,
}

/// Diagnostic snapshot of one channel's live handles in this process.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub name: String,
    pub publishers: usize,
    pub subscribers: usize,
}

/// Maps channel names to transport resources.
///
/// Resolution is a pure function of the name: within one registry, a name
/// always resolves to the same [`ChannelAddress`]. The registry also tracks
/// live publisher/subscriber counts per channel for diagnostics and fails a
/// second in-process publisher fast.
///
/// Sockets take the registry explicitly. [`ChannelRegistry::global`] offers
/// a process-wide default for the common case; tests and embedders build
/// their own (for example [`ChannelRegistry::in_process`]) for isolation.
pub struct ChannelRegistry {
    bus_dir: PathBuf,
    transport: Arc<dyn Transport>,
    channels: Mutex<HashMap<String, ChannelCounts>>,
}

impl ChannelRegistry {
    /// Create a registry over an explicit transport and bus directory.
    pub fn new(transport: Arc<dyn Transport>, bus_dir: impl Into<PathBuf>) -> Self {
        Self {
            bus_dir: bus_dir.into(),
            transport,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Registry over the platform default transport (Unix domain sockets
    /// where available, in-process delivery elsewhere) and the default bus
    /// directory.
    pub fn with_default_transport() -> Self {
        #[cfg(unix)]
        let transport: Arc<dyn Transport> = Arc::new(bytebus_transport::UdsTransport::new());
        #[cfg(not(unix))]
        let transport: Arc<dyn Transport> = Arc::new(bytebus_transport::LocalTransport::new());

        Self::new(transport, default_bus_dir())
    }

    /// Registry over an isolated in-process transport. Channels opened here
    /// never touch the filesystem and are invisible to other registries.
    pub fn in_process() -> Self {
        Self::new(
            Arc::new(bytebus_transport::LocalTransport::new()),
            default_bus_dir(),
        )
    }

    /// The process-wide default registry.
    pub fn global() -> &'static Arc<ChannelRegistry> {
        static GLOBAL: OnceLock<Arc<ChannelRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ChannelRegistry::with_default_transport()))
    }

    /// The directory backing this registry's channels.
    pub fn bus_dir(&self) -> &Path {
        &self.bus_dir
    }

    /// The transport this registry's sockets are built on.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Resolve a channel name to its transport address.
    ///
    /// Stable for the registry's lifetime; fails only on malformed names.
    pub fn resolve(&self, name: &str) -> Result<ChannelAddress> {
        validate_name(name)?;
        Ok(ChannelAddress::new(
            name,
            channel_socket_path(&self.bus_dir, name),
        ))
    }

    /// Live channel counts, sorted by name.
    pub fn snapshot(&self) -> Vec<ChannelInfo> {
        let channels = self.lock();
        let mut rows: Vec<ChannelInfo> = channels
            .iter()
            .map(|(name, counts)| ChannelInfo {
                name: name.clone(),
                publishers: counts.publishers,
                subscribers: counts.subscribers,
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChannelCounts>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register_publisher(&self, name: &str) -> Result<()> {
        let mut channels = self.lock();
        let counts = channels.entry(name.to_string()).or_default();
        if counts.publishers > 0 {
            return Err(SockError::ChannelUnavailable {
                name: name.to_string(),
                reason: "a publisher is already registered in this process".to_string(),
            });
        }
        counts.publishers += 1;
        debug!(channel = name, "publisher registered");
        Ok(())
    }

    pub(crate) fn unregister_publisher(&self, name: &str) {
        let mut channels = self.lock();
        if let Some(counts) = channels.get_mut(name) {
            counts.publishers = counts.publishers.saturating_sub(1);
            if counts.publishers == 0 && counts.subscribers == 0 {
                channels.remove(name);
            }
        }
    }

    pub(crate) fn register_subscriber(&self, name: &str) {
        let mut channels = self.lock();
        channels.entry(name.to_string()).or_default().subscribers += 1;
        debug!(channel = name, "subscriber registered");
    }

    pub(crate) fn unregister_subscriber(&self, name: &str) {
        let mut channels = self.lock();
        if let Some(counts) = channels.get_mut(name) {
            counts.subscribers = counts.subscribers.saturating_sub(1);
            if counts.publishers == 0 && counts.subscribers == 0 {
                channels.remove(name);
            }
        }
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("bus_dir", &self.bus_dir)
            .field("transport", &self.transport.name())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SockError::InvalidChannelName {
            name: name.to_string(),
            reason: "must not be empty",
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SockError::InvalidChannelName {
            name: name.to_string(),
            reason: "longer than 96 bytes",
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(SockError::InvalidChannelName {
            name: name.to_string(),
            reason: "contains characters outside [A-Za-z0-9._-]",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_stable_for_a_name() {
        let registry = ChannelRegistry::in_process();
        let first = registry.resolve("telemetry").unwrap();
        let second = registry.resolve("telemetry").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.name(), "telemetry");
    }

    #[test]
    fn rejects_empty_name() {
        let registry = ChannelRegistry::in_process();
        let err = registry.resolve("").unwrap_err();
        assert!(matches!(err, SockError::InvalidChannelName { .. }));
    }

    #[test]
    fn rejects_path_like_names() {
        let registry = ChannelRegistry::in_process();
        for name in ["../escape", "a/b", "with space", "nul\0byte"] {
            let err = registry.resolve(name).unwrap_err();
            assert!(matches!(err, SockError::InvalidChannelName { .. }), "{name:?}");
        }
    }

    #[test]
    fn rejects_overlong_name() {
        let registry = ChannelRegistry::in_process();
        let long = "x".repeat(MAX_NAME_LEN + 1);
        let err = registry.resolve(&long).unwrap_err();
        assert!(matches!(err, SockError::InvalidChannelName { .. }));
    }

    #[test]
    fn second_in_process_publisher_is_unavailable() {
        let registry = ChannelRegistry::in_process();
        registry.register_publisher("solo").unwrap();
        let err = registry.register_publisher("solo").unwrap_err();
        assert!(matches!(err, SockError::ChannelUnavailable { .. }));
    }

    #[test]
    fn unregister_frees_the_publisher_slot() {
        let registry = ChannelRegistry::in_process();
        registry.register_publisher("cycle").unwrap();
        registry.unregister_publisher("cycle");
        registry.register_publisher("cycle").unwrap();
    }

    #[test]
    fn snapshot_reports_live_counts() {
        let registry = ChannelRegistry::in_process();
        registry.register_publisher("metrics").unwrap();
        registry.register_subscriber("metrics");
        registry.register_subscriber("metrics");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "metrics");
        assert_eq!(snapshot[0].publishers, 1);
        assert_eq!(snapshot[0].subscribers, 2);
    }

    #[test]
    fn snapshot_drops_fully_released_channels() {
        let registry = ChannelRegistry::in_process();
        registry.register_subscriber("brief");
        registry.unregister_subscriber("brief");
        assert!(registry.snapshot().is_empty());
    }
}
