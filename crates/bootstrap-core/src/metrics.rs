//! Global atomic counters for bootstrap observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a bootstrap.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    files_downloaded: AtomicU64,
    lag_probes: AtomicU64,
    patches_applied: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            files_downloaded: AtomicU64::new(0),
            lag_probes: AtomicU64::new(0),
            patches_applied: AtomicU64::new(0),
        }
    }

    /// Count one file download attempt (manifest or properties file).
    pub fn inc_downloads(&self) {
        self.files_downloaded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "files_downloaded", "counter incremented");
    }

    /// Count one repository-root probe made while checking for rollout lag.
    pub fn inc_lag_probes(&self) {
        self.lag_probes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "lag_probes", "counter incremented");
    }

    pub fn inc_patches(&self) {
        self.patches_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "patches_applied", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            files_downloaded = self.files_downloaded(),
            lag_probes = self.lag_probes(),
            patches_applied = self.patches_applied(),
        );
    }

    pub fn files_downloaded(&self) -> u64 {
        self.files_downloaded.load(Ordering::Relaxed)
    }

    pub fn lag_probes(&self) -> u64 {
        self.lag_probes.load(Ordering::Relaxed)
    }

    pub fn patches_applied(&self) -> u64 {
        self.patches_applied.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.files_downloaded.store(0, Ordering::Relaxed);
        self.lag_probes.store(0, Ordering::Relaxed);
        self.patches_applied.store(0, Ordering::Relaxed);
    }
}
