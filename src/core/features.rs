//! Feature extraction from full zone windows.
//!
//! Pure and deterministic: the same window always yields the same vector.

use crate::core::windowing::FullWindow;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Added to the biomass mean before dividing, so an empty pasture does not
/// produce an infinite pressure index.
pub const PRESSURE_EPSILON: f64 = 0.1;

/// Number of values in [`FeatureVector::to_model_input`].
pub const MODEL_INPUT_LEN: usize = 5;

/// Summary features derived from one full window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Unweighted mean biomass across the window
    pub biomass_mean: f64,
    /// Unweighted mean soil moisture
    pub soil_mean: f64,
    /// Newest biomass minus oldest biomass, in arrival order
    pub biomass_trend: f64,
    /// Unweighted mean animal load
    pub animal_load_mean: f64,
    /// Grazing pressure: animals per unit of available biomass
    pub pressure_index: f64,
}

impl FeatureVector {
    /// Fixed-order numeric vector handed to trained classifiers:
    /// `[biomass_mean, biomass_trend, soil_mean, animal_load_mean, pressure_index]`.
    pub fn to_model_input(&self) -> [f64; MODEL_INPUT_LEN] {
        [
            self.biomass_mean,
            self.biomass_trend,
            self.soil_mean,
            self.animal_load_mean,
            self.pressure_index,
        ]
    }
}

/// Compute the feature vector for a full window.
pub fn compute_features(window: &FullWindow) -> FeatureVector {
    let records = window.records();

    let biomass_mean = records.iter().map(|r| r.metrics.biomass).mean();
    let soil_mean = records.iter().map(|r| r.metrics.soil_moisture).mean();
    let animal_load_mean = records.iter().map(|r| r.metrics.animal_load as f64).mean();
    let biomass_trend = window.last().metrics.biomass - window.first().metrics.biomass;

    FeatureVector {
        biomass_mean,
        soil_mean,
        biomass_trend,
        animal_load_mean,
        pressure_index: animal_load_mean / (biomass_mean + PRESSURE_EPSILON),
    }
}
