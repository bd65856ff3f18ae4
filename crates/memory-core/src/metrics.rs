//! Global atomic counters for agentmem.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when the CLI exits).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    events_appended: AtomicU64,
    append_retries: AtomicU64,
    records_extracted: AtomicU64,
    blocks_malformed: AtomicU64,
    retrievals: AtomicU64,
    retrievals_truncated: AtomicU64,
    events_swept: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_appended: AtomicU64::new(0),
            append_retries: AtomicU64::new(0),
            records_extracted: AtomicU64::new(0),
            blocks_malformed: AtomicU64::new(0),
            retrievals: AtomicU64::new(0),
            retrievals_truncated: AtomicU64::new(0),
            events_swept: AtomicU64::new(0),
        }
    }

    pub fn inc_events_appended(&self) {
        self.events_appended.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_appended", "counter incremented");
    }

    pub fn inc_append_retries(&self) {
        self.append_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "append_retries", "counter incremented");
    }

    pub fn add_records_extracted(&self, n: u64) {
        self.records_extracted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_blocks_malformed(&self) {
        self.blocks_malformed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "blocks_malformed", "counter incremented");
    }

    /// Count one retrieval call, and whether it came back truncated.
    pub fn record_retrieval(&self, truncated: bool) {
        self.retrievals.fetch_add(1, Ordering::Relaxed);
        if truncated {
            self.retrievals_truncated.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn add_events_swept(&self, n: u64) {
        self.events_swept.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            events_appended = self.events_appended(),
            append_retries = self.append_retries(),
            records_extracted = self.records_extracted(),
            blocks_malformed = self.blocks_malformed(),
            retrievals = self.retrievals(),
            retrievals_truncated = self.retrievals_truncated(),
            events_swept = self.events_swept(),
        );
    }

    pub fn events_appended(&self) -> u64 {
        self.events_appended.load(Ordering::Relaxed)
    }

    pub fn append_retries(&self) -> u64 {
        self.append_retries.load(Ordering::Relaxed)
    }

    pub fn records_extracted(&self) -> u64 {
        self.records_extracted.load(Ordering::Relaxed)
    }

    pub fn blocks_malformed(&self) -> u64 {
        self.blocks_malformed.load(Ordering::Relaxed)
    }

    pub fn retrievals(&self) -> u64 {
        self.retrievals.load(Ordering::Relaxed)
    }

    pub fn retrievals_truncated(&self) -> u64 {
        self.retrievals_truncated.load(Ordering::Relaxed)
    }

    pub fn events_swept(&self) -> u64 {
        self.events_swept.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for c in [
            &self.events_appended,
            &self.append_retries,
            &self.records_extracted,
            &self.blocks_malformed,
            &self.retrievals,
            &self.retrievals_truncated,
            &self.events_swept,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_events_appended();
        m.inc_events_appended();
        assert_eq!(m.events_appended(), 2);

        m.record_retrieval(false);
        m.record_retrieval(true);
        assert_eq!(m.retrievals(), 2);
        assert_eq!(m.retrievals_truncated(), 1);

        m.add_records_extracted(3);
        m.add_events_swept(4);
        assert_eq!(m.records_extracted(), 3);
        assert_eq!(m.events_swept(), 4);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_append_retries();
        m.inc_blocks_malformed();
        m.record_retrieval(true);
        m.reset();
        assert_eq!(m.append_retries(), 0);
        assert_eq!(m.blocks_malformed(), 0);
        assert_eq!(m.retrievals_truncated(), 0);
    }
}
