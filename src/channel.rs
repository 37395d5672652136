//! A thread-safe, closable FIFO of owned strings.
//!
//! One [`Channel`] per pipeline edge (`raw`, `proc`, `repr`, `error`). A
//! single mutex guards the queue and the closed flag; a condition variable
//! wakes blocked poppers on push or close.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct Inner {
    queue: VecDeque<String>,
    closed: bool,
}

/// An unbounded-in-practice FIFO queue of owned strings shared between a
/// producer and a consumer thread.
pub struct Channel {
    inner: Mutex<Inner>,
    not_empty: Condvar,
}

impl Channel {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Push a value onto the back of the queue and wake one waiter.
    ///
    /// A push after [`close`](Self::close) is a silent no-op (logged once
    /// at `warn`, not a panic): a straggling producer racing a shutdown
    /// must not bring the process down.
    pub fn push(&self, value: String) {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.closed {
            tracing::warn!("push on closed channel dropped");
            return;
        }
        guard.queue.push_back(value);
        self.not_empty.notify_one();
    }

    /// Block until an item is available or the channel is closed and
    /// drained. Returns `None` only once closed with nothing left to drain.
    pub fn pop(&self) -> Option<String> {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if let Some(v) = guard.queue.pop_front() {
                return Some(v);
            }
            if guard.closed {
                return None;
            }
            guard = match self.not_empty.wait_timeout(guard, Duration::from_millis(500)) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Non-blocking pop: returns immediately whether or not an item exists.
    pub fn try_pop(&self) -> Option<String> {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.queue.pop_front()
    }

    /// Mark the channel closed and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.closed = true;
        self.not_empty.notify_all();
    }

    /// O(n) snapshot of the current queue depth.
    pub fn len(&self) -> usize {
        let guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn push_then_pop_is_fifo() {
        let ch = Channel::new();
        ch.push("a".into());
        ch.push("b".into());
        assert_eq!(ch.pop().as_deref(), Some("a"));
        assert_eq!(ch.pop().as_deref(), Some("b"));
    }

    #[test]
    fn try_pop_does_not_block_when_empty() {
        let ch = Channel::new();
        assert_eq!(ch.try_pop(), None);
    }

    #[test]
    fn close_drains_then_returns_none() {
        let ch = Channel::new();
        ch.push("x".into());
        ch.close();
        assert_eq!(ch.pop().as_deref(), Some("x"));
        assert_eq!(ch.pop(), None);
    }

    #[test]
    fn close_wakes_blocked_poppers() {
        let ch = Arc::new(Channel::new());
        let ch2 = ch.clone();
        let handle = thread::spawn(move || ch2.pop());
        thread::sleep(Duration::from_millis(50));
        ch.close();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn push_after_close_is_a_silent_no_op() {
        let ch = Channel::new();
        ch.close();
        ch.push("late".into());
        assert_eq!(ch.pop(), None);
    }

    #[test]
    fn len_reflects_queue_depth() {
        let ch = Channel::new();
        assert_eq!(ch.len(), 0);
        ch.push("a".into());
        ch.push("b".into());
        assert_eq!(ch.len(), 2);
        ch.pop();
        assert_eq!(ch.len(), 1);
    }
}
