//! Bounded, drop-oldest output queue between the worker thread and a pull
//! (`read`) caller.
//!
//! Distinct from `proctap_platform::RingBuffer`: this queue is chunk-
//! granular (it holds whatever-sized `Vec<u8>` the converter produced per
//! iteration, not a byte-addressable ring) and blocks the reader up to a
//! timeout rather than never blocking.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::OUTPUT_QUEUE_CAPACITY;

struct State {
    chunks: VecDeque<Vec<u8>>,
    closed: bool,
}

/// Single-writer (worker thread), single-reader (caller thread) bounded
/// queue of output chunks.
pub struct OutputQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    capacity: usize,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::with_capacity(OUTPUT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State { chunks: VecDeque::new(), closed: false }),
            not_empty: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Worker side. Pushes `chunk`; if the queue is at capacity, drops the
    /// oldest chunk first. Never blocks. Returns `true` when a chunk was
    /// dropped to make room, so the caller can track sustained overflow for
    /// resource-exhausted reporting.
    pub fn push(&self, chunk: Vec<u8>) -> bool {
        if chunk.is_empty() {
            return false;
        }
        let mut state = self.state.lock();
        let dropped = if state.chunks.len() >= self.capacity {
            state.chunks.pop_front();
            true
        } else {
            false
        };
        state.chunks.push_back(chunk);
        self.not_empty.notify_one();
        dropped
    }

    /// Caller side. Pops the oldest chunk, waiting up to `timeout` if the
    /// queue is empty. Returns an empty `Vec` on timeout or once the queue
    /// is closed and drained.
    pub fn pop(&self, timeout: Duration) -> Vec<u8> {
        let mut state = self.state.lock();
        if state.chunks.is_empty() && !state.closed {
            let result = self.not_empty.wait_for(&mut state, timeout);
            if result.timed_out() && state.chunks.is_empty() {
                return Vec::new();
            }
        }
        state.chunks.pop_front().unwrap_or_default()
    }

    /// Marks the queue closed and wakes any blocked reader; subsequent
    /// `pop` calls drain remaining chunks, then return empty, without
    /// blocking further.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new()
    }
}
