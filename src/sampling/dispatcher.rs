//! Fire-and-forget hand-off of samples to a background writer.
//!
//! `submit` never blocks: when the bounded queue is full the new sample is
//! dropped and counted. Sink failures are logged and counted on the writer
//! thread and never reach the caller.

use crate::sampling::writer::{Sample, SampleSink};
use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingStats {
    /// Samples accepted into the queue
    pub submitted: u64,
    /// Samples dropped because the queue was full or closed
    pub dropped: u64,
    /// Samples the sink accepted
    pub written: u64,
    /// Samples the sink rejected
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SamplingStats {
        SamplingStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Owns the sample queue and its writer thread.
pub struct SampleDispatcher {
    sender: RwLock<Option<Sender<Sample>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl SampleDispatcher {
    /// Start a writer thread draining into `sink`, buffering up to
    /// `capacity` samples.
    pub fn spawn<S: SampleSink + 'static>(mut sink: S, capacity: usize) -> Self {
        let (sender, receiver) = bounded::<Sample>(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);

        let worker = thread::Builder::new()
            .name("sample-writer".to_string())
            .spawn(move || {
                for sample in receiver.iter() {
                    match sink.log_sample(&sample) {
                        Ok(()) => {
                            worker_counters.written.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(zone_id = %sample.zone_id, "Failed to log sample: {}", e);
                        }
                    }
                }
                tracing::debug!("Sample writer exiting");
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Without a writer every submit is dropped; ingestion carries on.
                tracing::error!("Could not start sample writer thread: {}", e);
                None
            }
        };

        Self {
            sender: RwLock::new(worker.as_ref().map(|_| sender)),
            worker: Mutex::new(worker),
            counters,
        }
    }

    /// Queue a sample without blocking. Returns false if it was dropped.
    pub fn submit(&self, sample: Sample) -> bool {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match sender.try_send(sample) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(sample)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(zone_id = %sample.zone_id, "Sample queue full, dropping sample");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> SamplingStats {
        self.counters.snapshot()
    }

    /// Close the queue, let the writer drain what is already queued, and
    /// join it. Later submits are dropped.
    pub fn shutdown(&self) -> SamplingStats {
        self.sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Sample writer thread panicked");
            }
        }

        self.stats()
    }
}

impl Drop for SampleDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FeatureVector, RiskLabel};
    use crate::sampling::writer::SampleLogError;
    use crossbeam_channel::Receiver;

    fn sample() -> Sample {
        Sample::new(
            "Z1",
            FeatureVector {
                biomass_mean: 0.5,
                soil_mean: 0.3,
                biomass_trend: 0.0,
                animal_load_mean: 4.0,
                pressure_index: 6.67,
            },
            RiskLabel::Low,
        )
    }

    struct CollectingSink(Arc<Mutex<Vec<Sample>>>);

    impl SampleSink for CollectingSink {
        fn log_sample(&mut self, sample: &Sample) -> Result<(), SampleLogError> {
            self.0.lock().unwrap().push(sample.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl SampleSink for FailingSink {
        fn log_sample(&mut self, _sample: &Sample) -> Result<(), SampleLogError> {
            Err(SampleLogError::Io("disk full".to_string()))
        }
    }

    /// Blocks on every write until released.
    struct GatedSink(Receiver<()>);

    impl SampleSink for GatedSink {
        fn log_sample(&mut self, _sample: &Sample) -> Result<(), SampleLogError> {
            let _ = self.0.recv();
            Ok(())
        }
    }

    #[test]
    fn test_samples_reach_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = SampleDispatcher::spawn(CollectingSink(Arc::clone(&seen)), 16);

        for _ in 0..5 {
            assert!(dispatcher.submit(sample()));
        }
        let stats = dispatcher.shutdown();

        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.written, 5);
        assert_eq!(seen.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_sink_failures_are_counted_not_raised() {
        let dispatcher = SampleDispatcher::spawn(FailingSink, 16);
        for _ in 0..3 {
            dispatcher.submit(sample());
        }
        let stats = dispatcher.shutdown();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.written, 0);
    }

    #[test]
    fn test_full_queue_drops_new_samples() {
        let (release_tx, release_rx) = bounded(0);
        let dispatcher = SampleDispatcher::spawn(GatedSink(release_rx), 2);

        let accepted = (0..20).filter(|_| dispatcher.submit(sample())).count();
        let stats = dispatcher.stats();
        // One sample may be held by the blocked writer, two more queued.
        assert!(accepted <= 3, "accepted {accepted}");
        assert_eq!(stats.dropped, 20 - accepted as u64);

        drop(release_tx);
        dispatcher.shutdown();
    }

    #[test]
    fn test_submit_after_shutdown_is_dropped() {
        let dispatcher = SampleDispatcher::spawn(FailingSink, 4);
        dispatcher.shutdown();
        assert!(!dispatcher.submit(sample()));
        assert_eq!(dispatcher.stats().dropped, 1);
    }
}
