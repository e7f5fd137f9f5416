//! Externally trained risk classifiers.
//!
//! The decision layer only needs a scoring function from the fixed-order
//! feature vector to a class label. Training happens offline; the model is
//! loaded once at startup and treated as opaque afterwards.

pub mod forest;

pub use forest::{DecisionTree, ForestModel, TreeNode};

use crate::core::features::MODEL_INPUT_LEN;

/// Scoring capability of a trained classifier.
pub trait RiskModel: Send + Sync {
    /// Predict a class label for
    /// `[biomass_mean, biomass_trend, soil_mean, animal_load_mean, pressure_index]`.
    fn predict(&self, input: &[f64; MODEL_INPUT_LEN]) -> Result<String, ModelError>;

    /// Human-readable identity for logs.
    fn describe(&self) -> String;
}

/// Model loading and scoring errors.
#[derive(Debug)]
pub enum ModelError {
    /// Model file could not be read
    Io(String),
    /// Model file is not valid JSON for the expected format
    Parse(String),
    /// Model structure is inconsistent
    Invalid(String),
    /// Scoring failed for one input
    Prediction(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::Io(e) => write!(f, "Model IO error: {e}"),
            ModelError::Parse(e) => write!(f, "Model parse error: {e}"),
            ModelError::Invalid(e) => write!(f, "Invalid model: {e}"),
            ModelError::Prediction(e) => write!(f, "Prediction failed: {e}"),
        }
    }
}

impl std::error::Error for ModelError {}
