//! Configuration for the PastureFlow engine.

use crate::core::PolicyKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port for the query surface (0 for random)
    pub listen_port: u16,

    /// Policy answering decision queries
    pub policy: PolicyKind,

    /// Policy labelling training samples on ingest
    pub labeling_policy: PolicyKind,

    /// Exported tree ensemble used by the model policy
    pub model_path: Option<PathBuf>,

    /// CSV file receiving labelled samples
    pub sample_log_path: PathBuf,

    /// Samples buffered before new ones are dropped
    pub sample_queue_capacity: usize,

    /// Whether to label and log a sample on every ingest with a full window
    pub eager_sampling: bool,

    /// Records buffered between producers and the ingestion thread
    pub ingest_queue_capacity: usize,

    /// How often the idle ingestion loop checks for shutdown
    #[serde(with = "duration_serde")]
    pub ingest_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::data_dir();

        Self {
            listen_port: 8000,
            policy: PolicyKind::Scored,
            labeling_policy: PolicyKind::Scored,
            model_path: None,
            sample_log_path: data_dir.join("training_data.csv"),
            sample_queue_capacity: 1024,
            eager_sampling: true,
            ingest_queue_capacity: 4096,
            ingest_poll_interval: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse a configuration document. Missing fields take their defaults.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pastureflow")
            .join("config.json")
    }

    fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pastureflow")
    }

    /// Reject settings that cannot work together. With eager sampling on,
    /// the query and labelling policies read the same feed and must agree on
    /// its biomass scale.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let query = self.policy.biomass_scale();
        let labeling = self.labeling_policy.biomass_scale();
        if self.eager_sampling && !query.is_compatible_with(labeling) {
            return Err(ConfigError::InvalidValue(format!(
                "policy '{}' expects {:?} biomass but labeling_policy '{}' expects {:?}",
                self.policy, query, self.labeling_policy, labeling
            )));
        }
        Ok(())
    }

    /// Ensure the sample log directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.sample_log_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidValue(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.policy, PolicyKind::Scored);
        assert_eq!(config.labeling_policy, PolicyKind::Scored);
        assert!(config.eager_sampling);
        assert!(config.validate().is_ok());
        assert_eq!(config.ingest_poll_interval, Duration::from_millis(100));
        assert!(config.sample_log_path.ends_with("training_data.csv"));
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = Config::from_json(
            r#"{"policy": "model", "model_path": "/models/forest.json", "ingest_poll_interval": 250}"#,
        )
        .unwrap();
        assert_eq!(config.policy, PolicyKind::Model);
        assert_eq!(config.model_path, Some(PathBuf::from("/models/forest.json")));
        assert_eq!(config.ingest_poll_interval, Duration::from_millis(250));
        assert_eq!(config.listen_port, 8000);
    }

    #[test]
    fn test_mixed_biomass_scales_rejected() {
        let config = Config::from_json(r#"{"policy": "threshold"}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        // Without eager labelling the scales never meet.
        let config =
            Config::from_json(r#"{"policy": "threshold", "eager_sampling": false}"#).unwrap();
        assert!(config.validate().is_ok());

        let config = Config::from_json(
            r#"{"policy": "threshold", "labeling_policy": "threshold"}"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());

        let config = Config::from_json(r#"{"policy": "model"}"#).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let err = Config::from_json(r#"{"policy": "astrology"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
