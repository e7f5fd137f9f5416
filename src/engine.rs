//! Orchestration of window store, feature extraction and decision policy.
//!
//! ```text
//! record ──▶ WindowStore.update ──▶ (eager) snapshot ▶ features ▶ label ▶ SampleDispatcher
//!
//! query  ──▶ WindowStore.snapshot ▶ compute_features ▶ DecisionPolicy.decide ──▶ caller
//! ```
//!
//! Query results are recomputed on every call and never cached, so they
//! always reflect the window as it is at the time of the query.

use crate::core::{
    compute_features, DecisionPolicy, FeatureVector, RiskDecision, Unavailable, WindowStore,
};
use crate::sampling::{Sample, SampleDispatcher, SamplingStats};
use crate::stats::{IngestCounters, IngestStats};
use crate::telemetry::{TelemetryError, TelemetryRecord};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Features and decision for one zone, computed fresh.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneDecision {
    pub zone_id: String,
    pub features: FeatureVector,
    pub decision: RiskDecision,
}

/// Liveness report for the query surface.
#[derive(Debug, Clone, Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
    pub instance_id: Uuid,
    pub zone_count: usize,
    pub policy: &'static str,
    pub ingest: IngestCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingStats>,
}

/// Best-effort labelling of samples on the ingestion path.
struct EagerSampling {
    labeler: Arc<dyn DecisionPolicy>,
    dispatcher: SampleDispatcher,
}

/// Shared engine handle used by both the ingestion loop and query handlers.
pub struct ZoneEngine {
    store: Arc<WindowStore>,
    policy: Arc<dyn DecisionPolicy>,
    sampling: Option<EagerSampling>,
    stats: IngestStats,
    instance_id: Uuid,
}

impl ZoneEngine {
    /// Create an engine with an empty store answering queries with `policy`.
    pub fn new(policy: Arc<dyn DecisionPolicy>) -> Self {
        Self::with_store(Arc::new(WindowStore::new()), policy)
    }

    pub fn with_store(store: Arc<WindowStore>, policy: Arc<dyn DecisionPolicy>) -> Self {
        Self {
            store,
            policy,
            sampling: None,
            stats: IngestStats::new(),
            instance_id: Uuid::new_v4(),
        }
    }

    /// Label every full window on ingest with `labeler` and hand the sample
    /// to `dispatcher`.
    pub fn with_sampling(
        mut self,
        labeler: Arc<dyn DecisionPolicy>,
        dispatcher: SampleDispatcher,
    ) -> Self {
        tracing::info!(
            labeler = labeler.name(),
            scale = ?labeler.biomass_scale(),
            "Eager sample logging enabled"
        );
        if !labeler
            .biomass_scale()
            .is_compatible_with(self.policy.biomass_scale())
        {
            tracing::warn!(
                policy = self.policy.name(),
                labeler = labeler.name(),
                "Query and labelling policies expect different biomass scales"
            );
        }
        self.sampling = Some(EagerSampling {
            labeler,
            dispatcher,
        });
        self
    }

    pub fn store(&self) -> &Arc<WindowStore> {
        &self.store
    }

    pub fn policy(&self) -> &dyn DecisionPolicy {
        self.policy.as_ref()
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Apply one record. A record that fails validation is counted and
    /// rejected without touching any window.
    pub fn ingest(&self, record: TelemetryRecord) -> Result<(), TelemetryError> {
        if let Err(e) = record.validate() {
            self.stats.record_rejected();
            return Err(e);
        }

        let zone_id = record.zone_id.clone();
        self.store.update(record);
        self.stats.record_ingested();

        if let Some(sampling) = &self.sampling {
            self.sample_zone(&zone_id, sampling);
        }
        Ok(())
    }

    fn sample_zone(&self, zone_id: &str, sampling: &EagerSampling) {
        let Ok(window) = self.store.snapshot(zone_id) else {
            return;
        };
        let features = compute_features(&window);

        match sampling.labeler.decide(Some(&features)) {
            Ok(decision) => {
                tracing::debug!(zone_id, label = %decision.label, "Labelled window");
                if sampling
                    .dispatcher
                    .submit(Sample::new(zone_id, features, decision.label))
                {
                    self.stats.record_sample_submitted();
                }
            }
            Err(reason) => {
                tracing::debug!(zone_id, "Skipping sample: {}", reason);
            }
        }
    }

    /// Current features for a zone.
    pub fn features(&self, zone_id: &str) -> Result<FeatureVector, Unavailable> {
        let window = self.store.snapshot(zone_id)?;
        Ok(compute_features(&window))
    }

    /// Current features and decision for a zone.
    pub fn decision(&self, zone_id: &str) -> Result<ZoneDecision, Unavailable> {
        let features = self.features(zone_id)?;
        let decision = self.policy.decide(Some(&features))?;
        Ok(ZoneDecision {
            zone_id: zone_id.to_string(),
            features,
            decision,
        })
    }

    pub fn zone_ids(&self) -> Vec<String> {
        self.store.zone_ids()
    }

    pub fn liveness(&self) -> Liveness {
        Liveness {
            status: "healthy",
            version: crate::VERSION,
            instance_id: self.instance_id,
            zone_count: self.store.zone_count(),
            policy: self.policy.name(),
            ingest: self.stats.snapshot(),
            sampling: self.sampling.as_ref().map(|s| s.dispatcher.stats()),
        }
    }

    pub fn ingest_summary(&self) -> String {
        self.stats.summary()
    }

    /// Drain and stop the sample writer, if any.
    pub fn shutdown_sampling(&self) -> Option<SamplingStats> {
        self.sampling.as_ref().map(|s| s.dispatcher.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        DecisionCode, NotReady, RiskLabel, ScoredPolicy, ThresholdPolicy, WINDOW_SIZE,
    };
    use crate::sampling::{SampleLogError, SampleSink};
    use crate::telemetry::Metrics;
    use std::sync::Mutex;

    fn record(zone: &str, biomass: f64) -> TelemetryRecord {
        TelemetryRecord::new(
            zone,
            Metrics {
                biomass,
                soil_moisture: 0.35,
                temperature: 22.0,
                animal_load: 8,
            },
        )
    }

    fn threshold_engine() -> ZoneEngine {
        ZoneEngine::new(Arc::new(ThresholdPolicy::default()))
    }

    struct CollectingSink(Arc<Mutex<Vec<Sample>>>);

    impl SampleSink for CollectingSink {
        fn log_sample(&mut self, sample: &Sample) -> Result<(), SampleLogError> {
            self.0.lock().unwrap().push(sample.clone());
            Ok(())
        }
    }

    #[test]
    fn test_declining_zone_alerts() {
        let engine = threshold_engine();
        for b in [10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0] {
            engine.ingest(record("Z1", b)).unwrap();
        }

        let result = engine.decision("Z1").unwrap();
        assert!((result.features.biomass_mean - 5.5).abs() < 1e-9);
        assert!((result.features.biomass_trend + 9.0).abs() < 1e-9);
        assert_eq!(result.decision.decision_code, Some(DecisionCode::AlertDegrading));
        assert_eq!(result.decision.label, RiskLabel::Medium);
    }

    #[test]
    fn test_nine_records_unavailable() {
        let engine = threshold_engine();
        for _ in 0..(WINDOW_SIZE - 1) {
            engine.ingest(record("Z1", 20.0)).unwrap();
        }
        assert_eq!(
            engine.features("Z1"),
            Err(Unavailable::NotReady(NotReady::InsufficientHistory {
                have: 9,
                need: WINDOW_SIZE
            }))
        );
    }

    #[test]
    fn test_stable_zone_no_action() {
        let engine = threshold_engine();
        for _ in 0..WINDOW_SIZE {
            engine.ingest(record("Z1", 20.0)).unwrap();
        }
        let result = engine.decision("Z1").unwrap();
        assert_eq!(result.decision.decision_code, Some(DecisionCode::NoAction));
        assert_eq!(result.decision.label, RiskLabel::Low);
    }

    #[test]
    fn test_unknown_zone_has_no_side_effects() {
        let engine = threshold_engine();
        assert!(matches!(
            engine.decision("ghost"),
            Err(Unavailable::NotReady(NotReady::UnknownZone))
        ));
        assert_eq!(engine.liveness().zone_count, 0);
    }

    #[test]
    fn test_malformed_record_rejected_and_counted() {
        let engine = threshold_engine();
        assert!(engine.ingest(record("", 1.0)).is_err());
        assert!(engine.ingest(record("Z1", -1.0)).is_err());
        engine.ingest(record("Z1", 1.0)).unwrap();

        let live = engine.liveness();
        assert_eq!(live.zone_count, 1);
        assert_eq!(live.ingest.records_rejected, 2);
        assert_eq!(live.ingest.records_ingested, 1);
    }

    #[test]
    fn test_eager_sampling_labels_full_windows() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = SampleDispatcher::spawn(CollectingSink(Arc::clone(&seen)), 64);
        let engine = ZoneEngine::new(Arc::new(ThresholdPolicy::default()))
            .with_sampling(Arc::new(ScoredPolicy::new()), dispatcher);

        for i in 0..(WINDOW_SIZE + 2) {
            engine.ingest(record("Z1", 0.2 + i as f64 * 0.01)).unwrap();
        }
        let stats = engine.shutdown_sampling().unwrap();

        // One sample per update once the window is full.
        assert_eq!(stats.written, 3);
        let samples = seen.lock().unwrap();
        assert!(samples.iter().all(|s| s.zone_id == "Z1"));
        assert_eq!(engine.liveness().ingest.samples_submitted, 3);
    }

    #[test]
    fn test_queries_are_recomputed() {
        let engine = threshold_engine();
        for _ in 0..WINDOW_SIZE {
            engine.ingest(record("Z1", 20.0)).unwrap();
        }
        assert_eq!(engine.decision("Z1").unwrap().decision.label, RiskLabel::Low);

        for _ in 0..WINDOW_SIZE {
            engine.ingest(record("Z1", 1.0)).unwrap();
        }
        assert_eq!(engine.decision("Z1").unwrap().decision.label, RiskLabel::High);
    }
}
