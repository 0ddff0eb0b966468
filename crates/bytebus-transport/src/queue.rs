use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;

use crate::traits::Recv;

/// Bounded-wait FIFO shared between a delivery thread and a receiver.
///
/// This is the per-endpoint transport buffer: arrivals append, receivers pop
/// in order with an optional absolute deadline. Closing wakes every waiter.
pub(crate) struct RecvQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

struct QueueState {
    frames: VecDeque<Bytes>,
    closed: bool,
}

impl RecvQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one message. Returns false if the queue is closed (the message
    /// is discarded).
    pub fn push(&self, frame: Bytes) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.frames.push_back(frame);
        self.available.notify_one();
        true
    }

    /// Pop the next message in arrival order, waiting until `deadline`.
    ///
    /// Buffered messages are delivered even after close; `Recv::Closed` is
    /// only reported once the queue is both closed and empty.
    pub fn pop_deadline(&self, deadline: Option<Instant>) -> Recv {
        let mut state = self.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                return Recv::Message(frame);
            }
            if state.closed {
                return Recv::Closed;
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
                        return Recv::TimedOut;
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

    /// Number of messages currently buffered.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Close the queue and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn pops_in_arrival_order() {
        let queue = RecvQueue::new();
        assert!(queue.push(Bytes::from_static(b"a")));
        assert!(queue.push(Bytes::from_static(b"b")));
        assert_eq!(queue.len(), 2);

        assert!(matches!(queue.pop_deadline(None), Recv::Message(m) if m.as_ref() == b"a"));
        assert!(matches!(queue.pop_deadline(None), Recv::Message(m) if m.as_ref() == b"b"));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn deadline_elapses_with_nothing_available() {
        let queue = RecvQueue::new();
        let start = Instant::now();
        let outcome = queue.pop_deadline(Some(Instant::now() + Duration::from_millis(30)));
        assert!(matches!(outcome, Recv::TimedOut));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn expired_deadline_returns_immediately() {
        let queue = RecvQueue::new();
        let outcome = queue.pop_deadline(Some(Instant::now()));
        assert!(matches!(outcome, Recv::TimedOut));
    }

    #[test]
    fn close_unblocks_waiter() {
        let queue = Arc::new(RecvQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.pop_deadline(None))
        };

        std::thread::sleep(Duration::from_millis(20));
        queue.close();

        let outcome = waiter.join().expect("waiter thread should finish");
        assert!(matches!(outcome, Recv::Closed));
    }

    #[test]
    fn buffered_messages_survive_close() {
        let queue = RecvQueue::new();
        assert!(queue.push(Bytes::from_static(b"kept")));
        queue.close();

        assert!(matches!(queue.pop_deadline(None), Recv::Message(m) if m.as_ref() == b"kept"));
        assert!(matches!(queue.pop_deadline(None), Recv::Closed));
        assert!(!queue.push(Bytes::from_static(b"late")));
    }
}
