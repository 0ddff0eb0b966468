use std::path::{Path, PathBuf};

/// Default bus directory for this process's user.
///
/// `BYTEBUS_DIR` overrides the location; otherwise sockets live in a per-uid
/// directory under the system temp dir so unrelated users never collide.
pub fn default_bus_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("BYTEBUS_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let uid = unsafe { libc::geteuid() };
        std::env::temp_dir().join(format!("bytebus-{uid}"))
    }

    #[cfg(not(unix))]
    {
        std::env::temp_dir().join("bytebus")
    }
}

/// Socket path backing `name` under `base`.
pub fn channel_socket_path(base: &Path, name: &str) -> PathBuf {
    base.join(format!("{name}.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_is_stable_for_a_name() {
        let base = Path::new("/tmp/bus");
        assert_eq!(
            channel_socket_path(base, "telemetry"),
            channel_socket_path(base, "telemetry"),
        );
        assert_eq!(
            channel_socket_path(base, "telemetry"),
            PathBuf::from("/tmp/bus/telemetry.sock"),
        );
    }

    #[test]
    fn distinct_names_resolve_to_distinct_paths() {
        let base = Path::new("/tmp/bus");
        assert_ne!(
            channel_socket_path(base, "a"),
            channel_socket_path(base, "b"),
        );
    }
}
