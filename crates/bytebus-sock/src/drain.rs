use bytes::Bytes;

use crate::error::Result;
use crate::subscriber::SubscriberSocket;

/// Non-blocking bulk read of everything currently buffered on `sock`.
///
/// Returns resident messages in arrival order — the single conflated
/// message when conflation is enabled — and an empty sequence when nothing
/// is queued. Never waits for in-flight messages: what has not yet been
/// delivered to the socket at call time is left for a later call.
pub fn drain_sock_raw(sock: &SubscriberSocket) -> Result<Vec<Bytes>> {
    sock.drain()
}
