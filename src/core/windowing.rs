//! Per-zone bounded history of recent telemetry.
//!
//! Each zone keeps the last [`WINDOW_SIZE`] records in arrival order. The zone
//! map sits behind an `RwLock` that is only write-locked when a new zone
//! appears; every zone's ring has its own `Mutex`, so a reader on one zone
//! never waits on an update to another.

use crate::telemetry::TelemetryRecord;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Number of records a window holds before features can be computed.
pub const WINDOW_SIZE: usize = 10;

/// Ring buffer of the most recent records for one zone.
#[derive(Debug, Clone)]
pub struct ZoneWindow {
    records: VecDeque<TelemetryRecord>,
    /// Total records ever pushed into this window
    total_updates: u64,
}

impl ZoneWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            records: VecDeque::with_capacity(WINDOW_SIZE),
            total_updates: 0,
        }
    }

    /// Append a record, evicting the oldest one once at capacity.
    pub fn push(&mut self, record: TelemetryRecord) {
        if self.records.len() == WINDOW_SIZE {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.total_updates += 1;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() == WINDOW_SIZE
    }

    pub fn total_updates(&self) -> u64 {
        self.total_updates
    }

    /// Copy the window out if it is full.
    fn to_full(&self) -> Result<FullWindow, NotReady> {
        if !self.is_full() {
            return Err(NotReady::InsufficientHistory {
                have: self.records.len(),
                need: WINDOW_SIZE,
            });
        }
        Ok(FullWindow {
            records: self.records.iter().cloned().collect(),
        })
    }
}

impl Default for ZoneWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a zone window holding exactly [`WINDOW_SIZE`]
/// records, oldest first.
///
/// Only the [`WindowStore`] can build one, so holding a `FullWindow` is proof
/// the window was complete when it was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct FullWindow {
    records: Vec<TelemetryRecord>,
}

impl FullWindow {
    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    /// Oldest record in arrival order.
    pub fn first(&self) -> &TelemetryRecord {
        &self.records[0]
    }

    /// Most recent record in arrival order.
    pub fn last(&self) -> &TelemetryRecord {
        &self.records[WINDOW_SIZE - 1]
    }
}

/// Why a snapshot could not be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    /// No record has ever arrived for this zone
    UnknownZone,
    /// The zone exists but its window is not full yet
    InsufficientHistory { have: usize, need: usize },
}

impl std::fmt::Display for NotReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotReady::UnknownZone => write!(f, "unknown zone"),
            NotReady::InsufficientHistory { have, need } => {
                write!(f, "insufficient history ({have}/{need} records)")
            }
        }
    }
}

type SharedWindow = Arc<Mutex<ZoneWindow>>;

/// Owner of every zone window.
///
/// Safe to share between the single ingestion writer and any number of
/// concurrent readers. Windows are created lazily on the first record for a
/// zone and live for as long as the store does.
#[derive(Debug, Default)]
pub struct WindowStore {
    zones: RwLock<HashMap<String, SharedWindow>>,
}

impl WindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to its zone's window, creating the window if needed.
    pub fn update(&self, record: TelemetryRecord) {
        let window = self.window_for_update(&record.zone_id);
        lock_window(&window).push(record);
    }

    /// Copy the zone's window if it holds exactly [`WINDOW_SIZE`] records.
    ///
    /// Querying never creates a window.
    pub fn snapshot(&self, zone_id: &str) -> Result<FullWindow, NotReady> {
        let window = self.get(zone_id).ok_or(NotReady::UnknownZone)?;
        let guard = lock_window(&window);
        guard.to_full()
    }

    /// Number of zones that have received at least one record.
    pub fn zone_count(&self) -> usize {
        self.read_zones().len()
    }

    /// Known zone ids, sorted.
    pub fn zone_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_zones().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current number of records held for a zone, if known.
    pub fn window_len(&self, zone_id: &str) -> Option<usize> {
        self.get(zone_id).map(|w| lock_window(&w).len())
    }

    fn get(&self, zone_id: &str) -> Option<SharedWindow> {
        self.read_zones().get(zone_id).cloned()
    }

    fn window_for_update(&self, zone_id: &str) -> SharedWindow {
        if let Some(window) = self.get(zone_id) {
            return window;
        }

        let mut zones = self.zones.write().unwrap_or_else(PoisonError::into_inner);
        zones
            .entry(zone_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(zone_id, "Creating window for new zone");
                Arc::new(Mutex::new(ZoneWindow::new()))
            })
            .clone()
    }

    fn read_zones(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SharedWindow>> {
        self.zones.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A window push cannot leave the ring half-written, so a poisoned lock still
/// guards a consistent window.
fn lock_window(window: &SharedWindow) -> MutexGuard<'_, ZoneWindow> {
    window.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Metrics;

    fn record(zone: &str, biomass: f64) -> TelemetryRecord {
        TelemetryRecord::new(
            zone,
            Metrics {
                biomass,
                soil_moisture: 0.3,
                temperature: 20.0,
                animal_load: 5,
            },
        )
    }

    fn biomass_of(window: &FullWindow) -> Vec<f64> {
        window.records().iter().map(|r| r.metrics.biomass).collect()
    }

    #[test]
    fn test_window_eviction_is_fifo() {
        let mut window = ZoneWindow::new();
        for i in 0..(WINDOW_SIZE + 3) {
            window.push(record("Z1", i as f64));
        }

        assert_eq!(window.len(), WINDOW_SIZE);
        assert_eq!(window.total_updates(), (WINDOW_SIZE + 3) as u64);
        let full = window.to_full().unwrap();
        assert_eq!(full.first().metrics.biomass, 3.0);
        assert_eq!(full.last().metrics.biomass, (WINDOW_SIZE + 2) as f64);
    }

    #[test]
    fn test_snapshot_not_ready_until_full() {
        let store = WindowStore::new();

        for i in 0..(WINDOW_SIZE - 1) {
            store.update(record("Z1", i as f64));
            assert_eq!(
                store.snapshot("Z1"),
                Err(NotReady::InsufficientHistory {
                    have: i + 1,
                    need: WINDOW_SIZE
                })
            );
        }

        store.update(record("Z1", 9.0));
        let snapshot = store.snapshot("Z1").unwrap();
        assert_eq!(snapshot.records().len(), WINDOW_SIZE);
        assert_eq!(biomass_of(&snapshot), (0..10).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_snapshot_keeps_last_n_oldest_first() {
        let store = WindowStore::new();
        for i in 0..25 {
            store.update(record("Z1", i as f64));
        }

        let snapshot = store.snapshot("Z1").unwrap();
        assert_eq!(biomass_of(&snapshot), (15..25).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_out_of_order_timestamps_kept_in_arrival_order() {
        let store = WindowStore::new();
        let base = chrono::Utc::now();
        for i in 0..WINDOW_SIZE {
            let mut r = record("Z1", i as f64);
            // Later records carry earlier timestamps.
            r.ts = base - chrono::Duration::seconds(i as i64);
            store.update(r);
        }

        let snapshot = store.snapshot("Z1").unwrap();
        assert_eq!(snapshot.first().metrics.biomass, 0.0);
        assert_eq!(snapshot.last().metrics.biomass, 9.0);
    }

    #[test]
    fn test_unknown_zone_query_creates_nothing() {
        let store = WindowStore::new();
        assert_eq!(store.snapshot("ghost"), Err(NotReady::UnknownZone));
        assert_eq!(store.window_len("ghost"), None);
        assert_eq!(store.zone_count(), 0);
    }

    #[test]
    fn test_zone_count_and_ids() {
        let store = WindowStore::new();
        store.update(record("b", 1.0));
        store.update(record("a", 1.0));
        store.update(record("b", 2.0));

        assert_eq!(store.zone_count(), 2);
        assert_eq!(store.zone_ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.window_len("b"), Some(2));
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let store = WindowStore::new();
        for i in 0..WINDOW_SIZE {
            store.update(record("Z1", i as f64));
        }
        let before = store.snapshot("Z1").unwrap();
        store.update(record("Z1", 100.0));

        assert_eq!(before.last().metrics.biomass, 9.0);
        assert_eq!(store.snapshot("Z1").unwrap().last().metrics.biomass, 100.0);
    }
}
