//! Ingestion counters for liveness reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the ingestion path.
#[derive(Debug)]
pub struct IngestStats {
    /// Records applied to the window store
    records_ingested: AtomicU64,
    /// Records rejected as malformed
    records_rejected: AtomicU64,
    /// Samples handed to the sample logger
    samples_submitted: AtomicU64,
    started_at: DateTime<Utc>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            records_ingested: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            samples_submitted: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_ingested(&self) {
        self.records_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.records_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_submitted(&self) {
        self.samples_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestCounters {
        IngestCounters {
            records_ingested: self.records_ingested.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            samples_submitted: self.samples_submitted.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let c = self.snapshot();
        format!(
            "Ingestion Statistics:\n\
             - Records ingested: {}\n\
             - Records rejected: {}\n\
             - Samples submitted: {}\n\
             - Uptime: {} seconds",
            c.records_ingested, c.records_rejected, c.samples_submitted, c.uptime_secs
        )
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestCounters {
    pub records_ingested: u64,
    pub records_rejected: u64,
    pub samples_submitted: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}
