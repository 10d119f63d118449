//! Thread-safe counter for enter sequence numbers.

use std::sync::atomic::{AtomicU32, Ordering};

/// A thread-safe, monotonically increasing counter for the sequence numbers
/// stamped on every `Enter` command.
///
/// The first call to [`next`](SequenceCounter::next) returns 1; clients tag
/// their subsequent info and clipboard reports with the last sequence they
/// were entered with, so stale reports can be discarded by comparison.
pub struct SequenceCounter {
    inner: AtomicU32,
}

impl SequenceCounter {
    /// Creates a new counter; [`current`](SequenceCounter::current) is 0 until
    /// the first increment.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Increments the counter and returns the new value.
    pub fn next(&self) -> u32 {
        self.inner.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Returns the most recently issued value without incrementing.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }

    /// Resets to 0.  Done when the primary screen is (re)opened.
    pub fn reset(&self) {
        self.inner.store(0, Ordering::Relaxed);
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
