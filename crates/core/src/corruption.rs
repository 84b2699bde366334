//! Corruption accounting.
//!
//! Scans over damaged files skip the unreadable region and keep going. A bare
//! log line would hide that data was lost, so every structure also counts the
//! events it skipped and exposes the total to callers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic count of corruption events seen by one structure
#[derive(Debug, Default)]
pub struct CorruptionCounter {
    events: AtomicU64,
}

impl CorruptionCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one corruption event, returning the new total
    #[inline]
    pub fn record(&self) -> u64 {
        self.events.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Total events recorded so far
    #[inline]
    pub fn count(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }
}
