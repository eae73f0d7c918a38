//! File-open accounting.
//!
//! Streaming reads are supposed to touch the disk only when the selected level
//! changes. [`IoCounter`] is handed to a reader so callers (and tests) can see
//! how many times the underlying file was actually opened.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared counter of file opens. Clones observe the same count.
#[derive(Clone, Debug, Default)]
pub struct IoCounter {
    opens: Arc<AtomicU64>,
}

impl IoCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one open.
    #[inline]
    pub fn record_open(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of opens recorded so far.
    #[inline]
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.opens.store(0, Ordering::Relaxed);
    }
}
