//! Append-only CSV log of labelled feature samples for offline retraining.

use crate::core::{FeatureVector, RiskLabel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;

/// One labelled training sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub zone_id: String,
    pub features: FeatureVector,
    pub risk_label: RiskLabel,
}

impl Sample {
    pub fn new(zone_id: impl Into<String>, features: FeatureVector, risk_label: RiskLabel) -> Self {
        Self {
            timestamp: Utc::now(),
            zone_id: zone_id.into(),
            features,
            risk_label,
        }
    }
}

/// Column layout of the training CSV.
#[derive(Serialize)]
struct SampleRow<'a> {
    timestamp: DateTime<Utc>,
    zone_id: &'a str,
    biomass_mean: f64,
    biomass_trend: f64,
    soil_mean: f64,
    animal_load_mean: f64,
    pressure_index: f64,
    risk_label: &'a str,
}

impl<'a> From<&'a Sample> for SampleRow<'a> {
    fn from(s: &'a Sample) -> Self {
        Self {
            timestamp: s.timestamp,
            zone_id: &s.zone_id,
            biomass_mean: s.features.biomass_mean,
            biomass_trend: s.features.biomass_trend,
            soil_mean: s.features.soil_mean,
            animal_load_mean: s.features.animal_load_mean,
            pressure_index: s.features.pressure_index,
            risk_label: s.risk_label.as_str(),
        }
    }
}

/// Destination for training samples.
pub trait SampleSink: Send {
    fn log_sample(&mut self, sample: &Sample) -> Result<(), SampleLogError>;
}

/// Appends samples to a CSV file, writing the header only for a new file.
pub struct CsvSampleWriter {
    writer: csv::Writer<std::fs::File>,
}

impl CsvSampleWriter {
    /// Open (or create) the sample log at `path`.
    pub fn open(path: &Path) -> Result<Self, SampleLogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SampleLogError::Io(e.to_string()))?;
            }
        }

        let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SampleLogError::Io(format!("{path:?}: {e}")))?;

        tracing::info!(path = ?path, new_file = needs_header, "Opened sample log");

        Ok(Self {
            writer: csv::WriterBuilder::new()
                .has_headers(needs_header)
                .from_writer(file),
        })
    }
}

impl SampleSink for CsvSampleWriter {
    fn log_sample(&mut self, sample: &Sample) -> Result<(), SampleLogError> {
        self.writer
            .serialize(SampleRow::from(sample))
            .map_err(|e| SampleLogError::Write(e.to_string()))?;
        // Flush per row so a crash loses at most the row in flight.
        self.writer
            .flush()
            .map_err(|e| SampleLogError::Io(e.to_string()))
    }
}

/// Sample logging errors. Never propagated past the dispatcher.
#[derive(Debug)]
pub enum SampleLogError {
    Io(String),
    Write(String),
}

impl std::fmt::Display for SampleLogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleLogError::Io(e) => write!(f, "Sample log IO error: {e}"),
            SampleLogError::Write(e) => write!(f, "Sample log write error: {e}"),
        }
    }
}

impl std::error::Error for SampleLogError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(zone: &str, label: RiskLabel) -> Sample {
        Sample::new(
            zone,
            FeatureVector {
                biomass_mean: 0.4,
                soil_mean: 0.3,
                biomass_trend: -0.02,
                animal_load_mean: 12.0,
                pressure_index: 24.0,
            },
            label,
        )
    }

    #[test]
    fn test_header_written_once_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples").join("training_data.csv");

        let mut writer = CsvSampleWriter::open(&path).unwrap();
        writer.log_sample(&sample("Z1", RiskLabel::High)).unwrap();
        drop(writer);

        let mut writer = CsvSampleWriter::open(&path).unwrap();
        writer
            .log_sample(&sample("Z2", RiskLabel::Class("grazed".into())))
            .unwrap();
        drop(writer);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "timestamp,zone_id,biomass_mean,biomass_trend,soil_mean,animal_load_mean,pressure_index,risk_label"
        );
        assert!(lines[1].contains(",Z1,0.4,-0.02,0.3,12.0,24.0,HIGH"));
        assert!(lines[2].ends_with(",grazed"));
    }
}
