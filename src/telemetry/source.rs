//! Newline-delimited JSON ingestion adapter.
//!
//! Reads one telemetry record per line from a file or stdin and forwards the
//! well-formed ones into the ingestion channel. A bad line is logged and
//! skipped; it never stops the stream.

use crate::telemetry::types::{TelemetryError, TelemetryRecord};
use crossbeam_channel::{SendTimeoutError, Sender};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long a blocked send waits before re-checking the running flag.
const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Counters for a single source run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub lines: u64,
    pub accepted: u64,
    pub malformed: u64,
}

/// Reads JSON-lines telemetry into a channel.
pub struct JsonLinesSource<R> {
    reader: R,
    label: String,
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a JSON-lines file.
    pub fn open(path: &Path) -> Result<Self, TelemetryError> {
        let file = File::open(path).map_err(|e| TelemetryError::Io(format!("{path:?}: {e}")))?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

impl JsonLinesSource<io::StdinLock<'static>> {
    /// Read from the process stdin.
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), "stdin")
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader,
            label: label.into(),
        }
    }

    /// Pump records into `sender` until EOF, the running flag is cleared, or
    /// the receiving side hangs up.
    pub fn pump(
        self,
        sender: &Sender<TelemetryRecord>,
        running: &AtomicBool,
    ) -> Result<SourceStats, TelemetryError> {
        let mut stats = SourceStats::default();
        let label = self.label;

        for line in self.reader.lines() {
            if !running.load(Ordering::SeqCst) {
                tracing::info!(source = %label, "Source stopped before EOF");
                break;
            }

            let line = line.map_err(|e| TelemetryError::Io(e.to_string()))?;
            stats.lines += 1;

            if line.trim().is_empty() {
                continue;
            }

            let record = match TelemetryRecord::from_json(&line) {
                Ok(record) => record,
                Err(e) => {
                    stats.malformed += 1;
                    tracing::warn!(source = %label, line = stats.lines, "Skipping record: {}", e);
                    continue;
                }
            };

            if !send_while_running(sender, record, running) {
                tracing::info!(source = %label, "Ingestion channel closed, stopping source");
                break;
            }
            stats.accepted += 1;
        }

        tracing::info!(
            source = %label,
            lines = stats.lines,
            accepted = stats.accepted,
            malformed = stats.malformed,
            "Source finished"
        );

        Ok(stats)
    }
}

/// Blocking send that still honours the running flag. Returns false when the
/// record could not be delivered.
fn send_while_running(
    sender: &Sender<TelemetryRecord>,
    mut record: TelemetryRecord,
    running: &AtomicBool,
) -> bool {
    loop {
        match sender.send_timeout(record, SEND_RETRY_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Disconnected(_)) => return false,
            Err(SendTimeoutError::Timeout(r)) => {
                if !running.load(Ordering::SeqCst) {
                    return false;
                }
                record = r;
            }
        }
    }
}
