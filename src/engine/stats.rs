//! Per-engine instrumentation counters.
//!
//! The counters make the exactly-once guarantees observable: every completion
//! handle that is created is eventually freed, every registered callback fires,
//! and every self-owning guard is eventually released.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct EngineStats {
    completions_created: AtomicUsize,
    completions_freed: AtomicUsize,
    callbacks_fired: AtomicUsize,
    guards_adopted: AtomicUsize,
    guards_released: AtomicUsize,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub completions_created: usize,
    pub completions_freed: usize,
    pub callbacks_fired: usize,
    pub guards_adopted: usize,
    pub guards_released: usize,
}

impl StatsSnapshot {
    /// Completion handles that are still alive.
    pub fn outstanding(&self) -> usize {
        self.completions_created - self.completions_freed
    }

    /// Self-owning guards waiting for their operation to resolve.
    pub fn guards_active(&self) -> usize {
        self.guards_adopted - self.guards_released
    }
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        // Freed counters are read first so a concurrent free can never make
        // `outstanding` underflow.
        let completions_freed = self.completions_freed.load(Ordering::SeqCst);
        let guards_released = self.guards_released.load(Ordering::SeqCst);

        StatsSnapshot {
            completions_created: self.completions_created.load(Ordering::SeqCst),
            completions_freed,
            callbacks_fired: self.callbacks_fired.load(Ordering::SeqCst),
            guards_adopted: self.guards_adopted.load(Ordering::SeqCst),
            guards_released,
        }
    }

    pub(crate) fn completion_created(&self) {
        self.completions_created.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn completion_freed(&self) {
        self.completions_freed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn callback_fired(&self) {
        self.callbacks_fired.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn guard_adopted(&self) {
        self.guards_adopted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn guard_released(&self) {
        self.guards_released.fetch_add(1, Ordering::SeqCst);
    }
}
