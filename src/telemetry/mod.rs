//! Telemetry records and the adapters that feed them into the engine.
//!
//! The core assumes well-typed input: everything here validates before a
//! record reaches the ingestion channel.

pub mod simulator;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use simulator::{PastureZone, Simulator, SimulatorConfig, ZoneSpec};
pub use source::{JsonLinesSource, SourceStats};
pub use types::{Metrics, TelemetryError, TelemetryRecord, QUALITY_OK};
