//! Telemetry record types delivered by the ingestion adapters.
//!
//! Records are immutable once constructed; the window store only ever
//! clones them into snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quality tag emitted by healthy sensors.
pub const QUALITY_OK: &str = "OK";

/// Raw sensor readings for one zone at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Standing biomass (absolute or 0-1 normalized, depending on the feed)
    pub biomass: f64,
    /// Volumetric soil moisture
    pub soil_moisture: f64,
    /// Air temperature in Celsius
    pub temperature: f64,
    /// Number of grazing animals in the zone
    pub animal_load: u32,
}

/// One telemetry event for a single zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Event time as reported by the sensor
    #[serde(alias = "timestamp")]
    pub ts: DateTime<Utc>,
    /// Zone this reading belongs to
    pub zone_id: String,
    /// Sensor readings
    pub metrics: Metrics,
    /// Free-form quality tag (OK, NOISY, PARTIAL, CORRUPT, ...)
    pub quality: String,
}

impl TelemetryRecord {
    /// Create a record stamped with the current time and an OK quality tag.
    pub fn new(zone_id: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            ts: Utc::now(),
            zone_id: zone_id.into(),
            metrics,
            quality: QUALITY_OK.to_string(),
        }
    }

    /// Check the invariants the window store relies on.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.zone_id.trim().is_empty() {
            return Err(TelemetryError::MalformedInput(
                "zone_id must not be empty".to_string(),
            ));
        }

        let m = &self.metrics;
        if !m.biomass.is_finite() || m.biomass < 0.0 {
            return Err(TelemetryError::MalformedInput(format!(
                "biomass must be a finite value >= 0 (got {})",
                m.biomass
            )));
        }
        if !m.soil_moisture.is_finite() {
            return Err(TelemetryError::MalformedInput(
                "soil_moisture must be finite".to_string(),
            ));
        }
        if !m.temperature.is_finite() {
            return Err(TelemetryError::MalformedInput(
                "temperature must be finite".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse and validate a single JSON-encoded record.
    pub fn from_json(line: &str) -> Result<Self, TelemetryError> {
        let record: TelemetryRecord = serde_json::from_str(line)
            .map_err(|e| TelemetryError::MalformedInput(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }
}

/// Errors raised while turning raw input into telemetry records.
#[derive(Debug)]
pub enum TelemetryError {
    /// Record failed to parse or violates a field invariant
    MalformedInput(String),
    /// Underlying reader failed
    Io(String),
}

impl std::fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryError::MalformedInput(e) => write!(f, "Malformed telemetry: {e}"),
            TelemetryError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for TelemetryError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(biomass: f64) -> Metrics {
        Metrics {
            biomass,
            soil_moisture: 0.4,
            temperature: 21.0,
            animal_load: 12,
        }
    }

    #[test]
    fn test_parse_sensor_payload() {
        let line = r#"{
            "ts": "2024-05-01T10:00:00Z",
            "zone_id": "Z1",
            "metrics": {"biomass": 0.62, "soil_moisture": 0.31, "temperature": 24.5, "animal_load": 40},
            "quality": "NOISY"
        }"#;

        let record = TelemetryRecord::from_json(line).unwrap();
        assert_eq!(record.zone_id, "Z1");
        assert_eq!(record.metrics.animal_load, 40);
        assert_eq!(record.quality, "NOISY");
    }

    #[test]
    fn test_timestamp_alias() {
        let line = r#"{"timestamp": "2024-05-01T10:00:00Z", "zone_id": "Z1",
            "metrics": {"biomass": 1.0, "soil_moisture": 0.3, "temperature": 20.0, "animal_load": 0},
            "quality": "OK"}"#;
        assert!(TelemetryRecord::from_json(line).is_ok());
    }

    #[test]
    fn test_rejects_negative_animal_load() {
        let line = r#"{"ts": "2024-05-01T10:00:00Z", "zone_id": "Z1",
            "metrics": {"biomass": 1.0, "soil_moisture": 0.3, "temperature": 20.0, "animal_load": -3},
            "quality": "OK"}"#;
        assert!(matches!(
            TelemetryRecord::from_json(line),
            Err(TelemetryError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_validate_invariants() {
        assert!(TelemetryRecord::new("Z1", metrics(0.0)).validate().is_ok());
        assert!(TelemetryRecord::new("", metrics(1.0)).validate().is_err());
        assert!(TelemetryRecord::new("  ", metrics(1.0)).validate().is_err());
        assert!(TelemetryRecord::new("Z1", metrics(-0.1)).validate().is_err());
        assert!(TelemetryRecord::new("Z1", metrics(f64::NAN)).validate().is_err());
    }
}
