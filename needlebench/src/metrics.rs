use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters describing one benchmark run
#[derive(Debug, Clone)]
pub struct RunMetrics {
    measurements: Arc<AtomicU64>,
    faults: Arc<AtomicU64>,
    bytes_scanned: Arc<AtomicU64>,
    sources_loaded: Arc<AtomicU64>,
    sources_skipped: Arc<AtomicU64>,
    releases: Arc<AtomicU64>,
    release_failures: Arc<AtomicU64>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            measurements: Arc::new(AtomicU64::new(0)),
            faults: Arc::new(AtomicU64::new(0)),
            bytes_scanned: Arc::new(AtomicU64::new(0)),
            sources_loaded: Arc::new(AtomicU64::new(0)),
            sources_skipped: Arc::new(AtomicU64::new(0)),
            releases: Arc::new(AtomicU64::new(0)),
            release_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records one timed search over `bytes` bytes
    pub fn record_measurement(&self, bytes: u64, faulted: bool) {
        self.measurements.fetch_add(1, Ordering::Relaxed);
        let total = self.bytes_scanned.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if faulted {
            self.faults.fetch_add(1, Ordering::Relaxed);
        }
        debug!("Scanned {} bytes, total: {} bytes", bytes, total);
    }

    pub fn record_source(&self, loaded: bool) {
        if loaded {
            self.sources_loaded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sources_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_release(&self, ok: bool) {
        if ok {
            self.releases.fetch_add(1, Ordering::Relaxed);
        } else {
            self.release_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get_stats(&self) -> RunStats {
        RunStats {
            measurements: self.measurements.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            sources_loaded: self.sources_loaded.load(Ordering::Relaxed),
            sources_skipped: self.sources_skipped.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            release_failures: self.release_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Run stats:\n\
             Measurements: {} ({} faulted)\n\
             Bytes scanned: {}\n\
             Sources loaded/skipped: {}/{}\n\
             Strategies released/failed: {}/{}",
            stats.measurements,
            stats.faults,
            stats.bytes_scanned,
            stats.sources_loaded,
            stats.sources_skipped,
            stats.releases,
            stats.release_failures
        );
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`RunMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub measurements: u64,
    pub faults: u64,
    pub bytes_scanned: u64,
    pub sources_loaded: u64,
    pub sources_skipped: u64,
    pub releases: u64,
    pub release_failures: u64,
}
