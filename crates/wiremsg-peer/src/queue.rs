use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A blocking, thread-safe double-ended queue.
///
/// Every operation takes the one internal lock. [`wait`](Self::wait) parks
/// the caller until the queue is non-empty or someone calls
/// [`wake`](Self::wake).
pub struct TsQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    // Bumped by `wake` so waiters can tell a signal from a spurious wakeup.
    wakeups: u64,
}

impl<T> TsQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                wakeups: 0,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_back(&self, item: T) {
        self.lock().items.push_back(item);
        self.ready.notify_one();
    }

    pub fn push_front(&self, item: T) {
        self.lock().items.push_front(item);
        self.ready.notify_one();
    }

    pub fn pop_front(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    pub fn pop_back(&self) -> Option<T> {
        self.lock().items.pop_back()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn clear(&self) {
        self.lock().items.clear();
    }

    /// Block until the queue is non-empty or [`wake`](Self::wake) is called.
    pub fn wait(&self) {
        let mut state = self.lock();
        let seen = state.wakeups;
        while state.items.is_empty() && state.wakeups == seen {
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait), but give up after `timeout`.
    ///
    /// Returns true if the queue holds at least one item on return.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        let seen = state.wakeups;
        while state.items.is_empty() && state.wakeups == seen {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        !state.items.is_empty()
    }

    /// Release every thread blocked in [`wait`](Self::wait).
    pub fn wake(&self) {
        self.lock().wakeups += 1;
        self.ready.notify_all();
    }
}

impl<T: Clone> TsQueue<T> {
    /// Clone of the item at the head, if any.
    pub fn front(&self) -> Option<T> {
        self.lock().items.front().cloned()
    }

    /// Clone of the item at the tail, if any.
    pub fn back(&self) -> Option<T> {
        self.lock().items.back().cloned()
    }
}

impl<T> Default for TsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TsQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsQueue").field("len", &self.len()).finish()
    }
}
