//! Core aggregation and decision layer.
//!
//! This module contains:
//! - The per-zone window store
//! - Feature extraction from full windows
//! - Pluggable risk decision policies

pub mod features;
pub mod policy;
pub mod windowing;

// Re-export commonly used types
pub use features::{compute_features, FeatureVector, MODEL_INPUT_LEN, PRESSURE_EPSILON};
pub use policy::{
    build_policy, BiomassScale, DecisionCode, DecisionPolicy, ModelPolicy, PolicyKind,
    RiskDecision, RiskLabel, ScoredPolicy, ThresholdPolicy, Unavailable,
};
pub use windowing::{FullWindow, NotReady, WindowStore, ZoneWindow, WINDOW_SIZE};
