//! The per-subscriber retention cell.
//!
//! The delivery thread writes into the inbox; `receive`/`drain` consume from
//! it. The receive deadline is enforced here, against a monotonic deadline
//! taken at call entry, so transport jitter never stretches the wait.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytebus_transport::TransportError;
use bytes::Bytes;

use crate::error::{Result, SockError};

/// Retention policy for undelivered messages.
enum Retention {
    /// All arrivals, in order. Bounded only by transport buffering.
    Fifo(VecDeque<Bytes>),
    /// The most recent arrival; each new one overwrites an unconsumed
    /// predecessor. A single slot, not a size-1 queue — overwriting can
    /// never fail.
    Latest(Option<Bytes>),
}

impl Retention {
    fn take_next(&mut self) -> Option<Bytes> {
        match self {
            Retention::Fifo(queue) => queue.pop_front(),
            Retention::Latest(slot) => slot.take(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Retention::Fifo(queue) => queue.len(),
            Retention::Latest(slot) => usize::from(slot.is_some()),
        }
    }
}

struct InboxState {
    retention: Retention,
    closed: bool,
    dropped: u64,
    failure: Option<TransportError>,
}

pub(crate) struct Inbox {
    state: Mutex<InboxState>,
    available: Condvar,
}

impl Inbox {
    pub fn new(conflate: bool) -> Self {
        let retention = if conflate {
            Retention::Latest(None)
        } else {
            Retention::Fifo(VecDeque::new())
        };
        Self {
            state: Mutex::new(InboxState {
                retention,
                closed: false,
                dropped: 0,
                failure: None,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one arrival. Under conflation an unconsumed predecessor is
    /// silently replaced (counted, never surfaced).
    pub fn deliver(&self, message: Bytes) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        match &mut state.retention {
            Retention::Fifo(queue) => queue.push_back(message),
            Retention::Latest(slot) => {
                if slot.replace(message).is_some() {
                    state.dropped += 1;
                }
            }
        }
        self.available.notify_one();
    }

    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` exactly when the timeout elapses with nothing available —
    /// an empty payload arrives as `Ok(Some(message))` with zero bytes.
    /// `Err(HandleClosed)` when the inbox is closed, including while a call
    /// is blocked.
    pub fn recv(&self, timeout: Option<Duration>) -> Result<Option<Bytes>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(SockError::HandleClosed);
            }
            if let Some(err) = state.failure.take() {
                return Err(err.into());
            }
            if let Some(message) = state.retention.take_next() {
                return Ok(Some(message));
            }
            match deadline {
                None => {
                    state = self
                        .available
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    state = self
                        .available
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    /// Take everything currently resident, in arrival order, without
    /// waiting. At most one element under conflation.
    pub fn drain(&self) -> Result<Vec<Bytes>> {
        let mut state = self.lock();
        if state.closed {
            return Err(SockError::HandleClosed);
        }
        let mut drained = Vec::with_capacity(state.retention.len());
        while let Some(message) = state.retention.take_next() {
            drained.push(message);
        }
        Ok(drained)
    }

    /// Number of messages currently resident.
    pub fn len(&self) -> usize {
        self.lock().retention.len()
    }

    /// Messages discarded by conflation so far.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Record a transport failure. The next `recv` surfaces it once; the
    /// inbox stays usable afterwards.
    pub fn fail(&self, err: TransportError) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.failure = Some(err);
        self.available.notify_all();
    }

    /// Close and wake every blocked `recv`. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn fifo_preserves_arrival_order() {
        let inbox = Inbox::new(false);
        inbox.deliver(Bytes::from_static(b"a"));
        inbox.deliver(Bytes::from_static(b"b"));
        inbox.deliver(Bytes::from_static(b"c"));

        assert_eq!(inbox.recv(None).unwrap().unwrap().as_ref(), b"a");
        assert_eq!(inbox.recv(None).unwrap().unwrap().as_ref(), b"b");
        assert_eq!(inbox.recv(None).unwrap().unwrap().as_ref(), b"c");
        assert_eq!(inbox.len(), 0);
    }

    #[test]
    fn conflation_keeps_only_the_latest() {
        let inbox = Inbox::new(true);
        inbox.deliver(Bytes::from_static(b"old"));
        inbox.deliver(Bytes::from_static(b"older"));
        inbox.deliver(Bytes::from_static(b"newest"));

        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox.dropped(), 2);
        assert_eq!(inbox.recv(None).unwrap().unwrap().as_ref(), b"newest");
    }

    #[test]
    fn timeout_elapses_within_bound() {
        let inbox = Inbox::new(false);
        let start = Instant::now();
        let result = inbox.recv(Some(Duration::from_millis(57))).unwrap();
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(57));
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn zero_timeout_returns_resident_message() {
        let inbox = Inbox::new(false);
        inbox.deliver(Bytes::from_static(b"already-here"));
        let result = inbox.recv(Some(Duration::ZERO)).unwrap();
        assert_eq!(result.unwrap().as_ref(), b"already-here");
        assert!(inbox.recv(Some(Duration::ZERO)).unwrap().is_none());
    }

    #[test]
    fn empty_payload_is_not_a_timeout() {
        let inbox = Inbox::new(false);
        inbox.deliver(Bytes::new());
        let result = inbox.recv(Some(Duration::ZERO)).unwrap();
        assert!(matches!(result, Some(message) if message.is_empty()));
    }

    #[test]
    fn close_unblocks_waiting_recv() {
        let inbox = Arc::new(Inbox::new(false));
        let waiter = {
            let inbox = Arc::clone(&inbox);
            std::thread::spawn(move || inbox.recv(None))
        };

        std::thread::sleep(Duration::from_millis(20));
        inbox.close();

        let result = waiter.join().expect("waiter thread should finish");
        assert!(matches!(result, Err(SockError::HandleClosed)));
    }

    #[test]
    fn operations_after_close_report_closed() {
        let inbox = Inbox::new(true);
        inbox.close();
        assert!(matches!(inbox.recv(None), Err(SockError::HandleClosed)));
        assert!(matches!(inbox.drain(), Err(SockError::HandleClosed)));
    }

    #[test]
    fn failure_surfaces_once_then_recovers() {
        let inbox = Inbox::new(false);
        inbox.fail(TransportError::Closed);

        let first = inbox.recv(Some(Duration::ZERO));
        assert!(matches!(
            first,
            Err(SockError::Transport(TransportError::Closed))
        ));

        // The handle is not corrupted: the next call waits normally.
        let second = inbox.recv(Some(Duration::from_millis(10))).unwrap();
        assert!(second.is_none());

        inbox.deliver(Bytes::from_static(b"back"));
        assert_eq!(
            inbox.recv(Some(Duration::ZERO)).unwrap().unwrap().as_ref(),
            b"back"
        );
    }

    #[test]
    fn drain_takes_everything_resident() {
        let inbox = Inbox::new(false);
        for payload in [&b"1"[..], b"2", b"3"] {
            inbox.deliver(Bytes::copy_from_slice(payload));
        }

        let drained = inbox.drain().unwrap();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].as_ref(), b"1");
        assert_eq!(drained[2].as_ref(), b"3");
        assert!(inbox.drain().unwrap().is_empty());
    }

    #[test]
    fn drain_under_conflation_yields_at_most_one() {
        let inbox = Inbox::new(true);
        for payload in [&b"1"[..], b"2", b"3", b"4"] {
            inbox.deliver(Bytes::copy_from_slice(payload));
        }

        let drained = inbox.drain().unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].as_ref(), b"4");
    }
}
