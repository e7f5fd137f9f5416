//! PastureFlow Intelligence - per-zone pasture telemetry aggregation and
//! grazing risk decisions.
//!
//! Sensors report biomass, soil moisture, temperature and animal load per
//! pasture zone. The engine keeps the last [`WINDOW_SIZE`] records of every
//! zone, derives a small feature vector from a full window, and runs it
//! through a pluggable decision policy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        PastureFlow Engine                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │  Telemetry  │──▶│   Ingest    │──▶│ WindowStore │             │
//! │  │ (jsonl/http)│   │  (1 thread) │   │ (10/zone)   │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │                           │                 │                    │
//! │                           ▼                 ▼                    │
//! │                    ┌─────────────┐   ┌─────────────┐             │
//! │                    │  Sampling   │◀──│  Features   │──▶ Policy   │
//! │                    │ (csv, async)│   │  (compute)  │   (A/B/ML)  │
//! │                    └─────────────┘   └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use pastureflow_intelligence::core::ThresholdPolicy;
//! use pastureflow_intelligence::telemetry::{Metrics, TelemetryRecord};
//! use pastureflow_intelligence::ZoneEngine;
//! use std::sync::Arc;
//!
//! let engine = ZoneEngine::new(Arc::new(ThresholdPolicy::default()));
//! for biomass in [10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0] {
//!     let metrics = Metrics { biomass, soil_moisture: 0.3, temperature: 22.0, animal_load: 4 };
//!     engine.ingest(TelemetryRecord::new("Z1", metrics)).unwrap();
//! }
//!
//! let result = engine.decision("Z1").unwrap();
//! assert_eq!(result.decision.label.as_str(), "MEDIUM");
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod ingest;
pub mod model;
pub mod sampling;
pub mod stats;
pub mod telemetry;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{
    compute_features, DecisionPolicy, FeatureVector, PolicyKind, RiskDecision, RiskLabel,
    Unavailable, WindowStore, WINDOW_SIZE,
};
pub use engine::{Liveness, ZoneDecision, ZoneEngine};
pub use ingest::{IngestHandle, IngestLoop};
pub use model::{ForestModel, RiskModel};
pub use sampling::{CsvSampleWriter, SampleDispatcher};
pub use telemetry::{TelemetryError, TelemetryRecord};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
