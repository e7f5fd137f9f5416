//! Single-threaded ingestion loop.
//!
//! Records are applied in arrival order by one dedicated thread. Producers
//! (file/stdin readers, the HTTP adapter, the simulator) only ever hold a
//! [`Sender`] and never touch the window store directly.

use crate::engine::ZoneEngine;
use crate::telemetry::TelemetryRecord;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub use crossbeam_channel::{bounded as ingest_channel, Sender};

/// Builder for the ingestion thread.
pub struct IngestLoop;

impl IngestLoop {
    /// Start consuming `receiver` on a thread named `ingest`.
    ///
    /// The loop checks the running flag every `poll_interval` while idle and
    /// ends once stopped or once every sender has been dropped.
    pub fn spawn(
        engine: Arc<ZoneEngine>,
        receiver: Receiver<TelemetryRecord>,
        poll_interval: Duration,
    ) -> std::io::Result<IngestHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("ingest".to_string())
            .spawn(move || run_loop(&engine, &receiver, &flag, poll_interval))?;

        Ok(IngestHandle {
            running,
            thread: Some(thread),
        })
    }
}

fn run_loop(
    engine: &ZoneEngine,
    receiver: &Receiver<TelemetryRecord>,
    running: &AtomicBool,
    poll_interval: Duration,
) -> u64 {
    let mut applied = 0u64;

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(poll_interval) {
            Ok(record) => {
                let zone_id = record.zone_id.clone();
                match engine.ingest(record) {
                    Ok(()) => applied += 1,
                    Err(e) => tracing::warn!(zone_id = %zone_id, "Rejected record: {}", e),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("All ingestion senders dropped");
                break;
            }
        }
    }

    tracing::info!(applied, "Ingestion loop stopped");
    applied
}

/// Handle to a running ingestion thread.
pub struct IngestHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<u64>>,
}

impl IngestHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the loop to stop after the record in hand, then wait for it.
    /// Returns the number of records applied.
    pub fn stop(mut self) -> u64 {
        self.running.store(false, Ordering::SeqCst);
        self.join_thread()
    }

    /// Wait for the loop to end on its own, i.e. once every sender is gone.
    pub fn join(mut self) -> u64 {
        self.join_thread()
    }

    fn join_thread(&mut self) -> u64 {
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(applied)) => applied,
            Some(Err(_)) => {
                tracing::error!("Ingestion thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for IngestHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_thread();
    }
}
