//! Risk decision policies.
//!
//! Three interchangeable implementations share [`DecisionPolicy`]:
//!
//! - [`ThresholdPolicy`]: coarse rules over absolute biomass units
//! - [`ScoredPolicy`]: tiered score over 0-1 normalized biomass
//! - [`ModelPolicy`]: delegates to an externally trained classifier
//!
//! The two rule policies read `biomass_mean` on different scales. They are
//! kept as separate, explicitly scaled variants; pick the one matching the
//! feed and do not mix them.

use crate::core::features::FeatureVector;
use crate::core::windowing::NotReady;
use crate::model::{ForestModel, ModelError, RiskModel};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Risk level, either one of the rule labels or a classifier's own class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
    /// Class name returned verbatim by a trained model
    Class(String),
}

impl RiskLabel {
    pub fn as_str(&self) -> &str {
        match self {
            RiskLabel::Low => "LOW",
            RiskLabel::Medium => "MEDIUM",
            RiskLabel::High => "HIGH",
            RiskLabel::Class(c) => c,
        }
    }
}

impl From<String> for RiskLabel {
    fn from(s: String) -> Self {
        match s.as_str() {
            "LOW" => RiskLabel::Low,
            "MEDIUM" => RiskLabel::Medium,
            "HIGH" => RiskLabel::High,
            _ => RiskLabel::Class(s),
        }
    }
}

impl From<RiskLabel> for String {
    fn from(label: RiskLabel) -> Self {
        match label {
            RiskLabel::Class(c) => c,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended action attached to a rule decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionCode {
    RotatePasture,
    AlertDegrading,
    NoAction,
}

impl DecisionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionCode::RotatePasture => "ROTATE_PASTURE",
            DecisionCode::AlertDegrading => "ALERT_DEGRADING",
            DecisionCode::NoAction => "NO_ACTION",
        }
    }
}

impl std::fmt::Display for DecisionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a policy evaluation. Built fresh for every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub label: RiskLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_code: Option<DecisionCode>,
}

impl RiskDecision {
    fn coded(code: DecisionCode, label: RiskLabel) -> Self {
        Self {
            label,
            decision_code: Some(code),
        }
    }

    fn label_only(label: RiskLabel) -> Self {
        Self {
            label,
            decision_code: None,
        }
    }
}

/// Explicit "no result" marker returned instead of a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// Window store could not produce a full window
    NotReady(NotReady),
    /// Policy was asked to decide without features
    NoFeatures,
    /// Classifier failed on this call
    ModelFailure(String),
}

impl Unavailable {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Unavailable::NotReady(NotReady::UnknownZone) => "UNKNOWN_ZONE",
            Unavailable::NotReady(NotReady::InsufficientHistory { .. }) => "INSUFFICIENT_HISTORY",
            Unavailable::NoFeatures => "NO_FEATURES",
            Unavailable::ModelFailure(_) => "MODEL_UNAVAILABLE",
        }
    }
}

impl From<NotReady> for Unavailable {
    fn from(reason: NotReady) -> Self {
        Unavailable::NotReady(reason)
    }
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::NotReady(reason) => write!(f, "No data available: {reason}"),
            Unavailable::NoFeatures => write!(f, "No data available: no features"),
            Unavailable::ModelFailure(e) => write!(f, "Model unavailable: {e}"),
        }
    }
}

/// Scale a policy expects `biomass_mean` to be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiomassScale {
    /// Raw biomass units
    Absolute,
    /// Fraction of carrying capacity, 0-1
    Normalized,
    /// Whatever the classifier was trained on
    ModelDefined,
}

impl BiomassScale {
    /// Whether `biomass_mean` is plausible on this scale. Absolute feeds are
    /// expected to sit above 1; a window averaging inside 0-1 usually means a
    /// normalized feed.
    pub fn accepts(self, biomass_mean: f64) -> bool {
        match self {
            BiomassScale::Absolute => biomass_mean > 1.0,
            BiomassScale::Normalized => (0.0..=1.0).contains(&biomass_mean),
            BiomassScale::ModelDefined => true,
        }
    }

    /// Two policies can share a feed when they read biomass the same way.
    pub fn is_compatible_with(self, other: BiomassScale) -> bool {
        self == other || self == BiomassScale::ModelDefined || other == BiomassScale::ModelDefined
    }
}

/// Warns the first time a policy sees biomass on the wrong scale.
#[derive(Debug, Default)]
struct ScaleCheck {
    warned: AtomicBool,
}

impl ScaleCheck {
    /// Returns true only for the call that emitted the warning.
    fn observe(&self, policy: &'static str, scale: BiomassScale, biomass_mean: f64) -> bool {
        if scale.accepts(biomass_mean) || self.warned.swap(true, Ordering::Relaxed) {
            return false;
        }
        tracing::warn!(
            policy,
            ?scale,
            biomass_mean,
            "Biomass looks like the wrong scale for this policy; later mismatches are not reported"
        );
        true
    }
}

/// Maps a feature vector to a risk decision.
pub trait DecisionPolicy: Send + Sync {
    /// Short name used in logs and liveness output.
    fn name(&self) -> &'static str;

    /// Scale this policy's thresholds assume.
    fn biomass_scale(&self) -> BiomassScale;

    /// Decide on the given features. `None` means the zone has no features
    /// yet and always yields [`Unavailable::NoFeatures`].
    fn decide(&self, features: Option<&FeatureVector>) -> Result<RiskDecision, Unavailable>;
}

/// Coarse rules over absolute biomass, first match wins.
#[derive(Debug)]
pub struct ThresholdPolicy {
    pub rotate_below_biomass: f64,
    pub alert_below_trend: f64,
    scale_check: ScaleCheck,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            rotate_below_biomass: 5.0,
            alert_below_trend: -1.0,
            scale_check: ScaleCheck::default(),
        }
    }
}

impl DecisionPolicy for ThresholdPolicy {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn biomass_scale(&self) -> BiomassScale {
        BiomassScale::Absolute
    }

    fn decide(&self, features: Option<&FeatureVector>) -> Result<RiskDecision, Unavailable> {
        let f = features.ok_or(Unavailable::NoFeatures)?;
        self.scale_check
            .observe(self.name(), self.biomass_scale(), f.biomass_mean);

        if f.biomass_mean < self.rotate_below_biomass {
            return Ok(RiskDecision::coded(DecisionCode::RotatePasture, RiskLabel::High));
        }
        if f.biomass_trend < self.alert_below_trend {
            return Ok(RiskDecision::coded(DecisionCode::AlertDegrading, RiskLabel::Medium));
        }
        Ok(RiskDecision::coded(DecisionCode::NoAction, RiskLabel::Low))
    }
}

/// Additive score over normalized biomass, trend and grazing pressure.
///
/// Each signal contributes 0, 1 or 2 points; 5+ is HIGH, 3-4 MEDIUM.
#[derive(Debug, Default)]
pub struct ScoredPolicy {
    scale_check: ScaleCheck,
}

impl ScoredPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total score for a feature vector.
    pub fn score(f: &FeatureVector) -> u8 {
        let biomass = tier_below(f.biomass_mean, 0.25, 0.45);
        let trend = tier_below(f.biomass_trend, -0.02, -0.01);
        let pressure = if f.pressure_index > 15.0 {
            2
        } else if f.pressure_index > 8.0 {
            1
        } else {
            0
        };
        biomass + trend + pressure
    }
}

/// 2 points below `severe`, 1 below `mild`, else 0.
fn tier_below(value: f64, severe: f64, mild: f64) -> u8 {
    if value < severe {
        2
    } else if value < mild {
        1
    } else {
        0
    }
}

impl DecisionPolicy for ScoredPolicy {
    fn name(&self) -> &'static str {
        "scored"
    }

    fn biomass_scale(&self) -> BiomassScale {
        BiomassScale::Normalized
    }

    fn decide(&self, features: Option<&FeatureVector>) -> Result<RiskDecision, Unavailable> {
        let f = features.ok_or(Unavailable::NoFeatures)?;

        self.scale_check
            .observe(self.name(), self.biomass_scale(), f.biomass_mean);

        let label = match Self::score(f) {
            s if s >= 5 => RiskLabel::High,
            s if s >= 3 => RiskLabel::Medium,
            _ => RiskLabel::Low,
        };
        Ok(RiskDecision::label_only(label))
    }
}

/// Defers to an externally trained classifier.
pub struct ModelPolicy<M> {
    model: M,
}

impl<M: RiskModel> ModelPolicy<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M: RiskModel> DecisionPolicy for ModelPolicy<M> {
    fn name(&self) -> &'static str {
        "model"
    }

    fn biomass_scale(&self) -> BiomassScale {
        BiomassScale::ModelDefined
    }

    fn decide(&self, features: Option<&FeatureVector>) -> Result<RiskDecision, Unavailable> {
        let f = features.ok_or(Unavailable::NoFeatures)?;

        match self.model.predict(&f.to_model_input()) {
            Ok(class) => Ok(RiskDecision::label_only(RiskLabel::from(class))),
            Err(e) => {
                tracing::warn!(model = %self.model.describe(), "Prediction failed: {}", e);
                Err(Unavailable::ModelFailure(e.to_string()))
            }
        }
    }
}

/// Selectable policy variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Threshold,
    Scored,
    Model,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyKind::Threshold => write!(f, "threshold"),
            PolicyKind::Scored => write!(f, "scored"),
            PolicyKind::Model => write!(f, "model"),
        }
    }
}

impl PolicyKind {
    /// Biomass scale the built policy will expect.
    pub fn biomass_scale(self) -> BiomassScale {
        match self {
            PolicyKind::Threshold => BiomassScale::Absolute,
            PolicyKind::Scored => BiomassScale::Normalized,
            PolicyKind::Model => BiomassScale::ModelDefined,
        }
    }
}

/// Build a policy. The model variant loads its classifier here, so a missing
/// or broken model fails at startup rather than on the first query.
pub fn build_policy(
    kind: PolicyKind,
    model_path: Option<&Path>,
) -> Result<Arc<dyn DecisionPolicy>, ModelError> {
    let policy: Arc<dyn DecisionPolicy> = match kind {
        PolicyKind::Threshold => Arc::new(ThresholdPolicy::default()),
        PolicyKind::Scored => Arc::new(ScoredPolicy::new()),
        PolicyKind::Model => {
            let path = model_path.ok_or_else(|| {
                ModelError::Invalid("model policy selected but no model_path configured".to_string())
            })?;
            let model = ForestModel::load(path)?;
            tracing::info!(model = %model.describe(), "Loaded risk model");
            Arc::new(ModelPolicy::new(model))
        }
    };
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(biomass_mean: f64, biomass_trend: f64, pressure_index: f64) -> FeatureVector {
        FeatureVector {
            biomass_mean,
            soil_mean: 0.3,
            biomass_trend,
            animal_load_mean: 10.0,
            pressure_index,
        }
    }

    struct FixedModel(Result<&'static str, ()>);

    impl RiskModel for FixedModel {
        fn predict(&self, _input: &[f64; 5]) -> Result<String, ModelError> {
            self.0
                .map(str::to_string)
                .map_err(|_| ModelError::Prediction("boom".to_string()))
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn test_threshold_priority_order() {
        let policy = ThresholdPolicy::default();

        let d = policy.decide(Some(&features(4.9, -5.0, 0.0))).unwrap();
        assert_eq!(d.decision_code, Some(DecisionCode::RotatePasture));
        assert_eq!(d.label, RiskLabel::High);

        let d = policy.decide(Some(&features(5.5, -9.0, 0.0))).unwrap();
        assert_eq!(d.decision_code, Some(DecisionCode::AlertDegrading));
        assert_eq!(d.label, RiskLabel::Medium);

        let d = policy.decide(Some(&features(20.0, 0.0, 0.0))).unwrap();
        assert_eq!(d.decision_code, Some(DecisionCode::NoAction));
        assert_eq!(d.label, RiskLabel::Low);
    }

    #[test]
    fn test_threshold_boundaries_do_not_trigger() {
        let policy = ThresholdPolicy::default();
        let d = policy.decide(Some(&features(5.0, -1.0, 0.0))).unwrap();
        assert_eq!(d.decision_code, Some(DecisionCode::NoAction));
        assert_eq!(d.label, RiskLabel::Low);
    }

    #[test]
    fn test_scored_tiers() {
        assert_eq!(ScoredPolicy::score(&features(0.2, -0.03, 16.0)), 6);
        assert_eq!(ScoredPolicy::score(&features(0.3, -0.015, 9.0)), 3);
        assert_eq!(ScoredPolicy::score(&features(0.5, 0.0, 2.0)), 0);
        // Boundaries: strict comparisons on every tier.
        assert_eq!(ScoredPolicy::score(&features(0.45, -0.01, 8.0)), 0);
        assert_eq!(ScoredPolicy::score(&features(0.25, -0.02, 15.0)), 3);
    }

    #[test]
    fn test_scored_labels() {
        let policy = ScoredPolicy::new();
        let label = |f: FeatureVector| policy.decide(Some(&f)).unwrap().label;

        assert_eq!(label(features(0.2, -0.03, 9.0)), RiskLabel::High);
        assert_eq!(label(features(0.2, -0.015, 2.0)), RiskLabel::Medium);
        assert_eq!(label(features(0.3, 0.0, 2.0)), RiskLabel::Low);
        assert_eq!(policy.decide(Some(&features(0.3, 0.0, 2.0))).unwrap().decision_code, None);
    }

    #[test]
    fn test_every_policy_handles_missing_features() {
        let policies: Vec<Box<dyn DecisionPolicy>> = vec![
            Box::new(ThresholdPolicy::default()),
            Box::new(ScoredPolicy::new()),
            Box::new(ModelPolicy::new(FixedModel(Ok("HIGH")))),
        ];
        for policy in policies {
            assert_eq!(policy.decide(None), Err(Unavailable::NoFeatures), "{}", policy.name());
        }
    }

    #[test]
    fn test_model_label_passes_through() {
        let policy = ModelPolicy::new(FixedModel(Ok("overgrazed")));
        let d = policy.decide(Some(&features(0.3, 0.0, 1.0))).unwrap();
        assert_eq!(d.label, RiskLabel::Class("overgrazed".to_string()));

        let policy = ModelPolicy::new(FixedModel(Ok("MEDIUM")));
        let d = policy.decide(Some(&features(0.3, 0.0, 1.0))).unwrap();
        assert_eq!(d.label, RiskLabel::Medium);
    }

    #[test]
    fn test_model_failure_degrades_to_unavailable() {
        let policy = ModelPolicy::new(FixedModel(Err(())));
        let result = policy.decide(Some(&features(0.3, 0.0, 1.0)));
        assert!(matches!(result, Err(Unavailable::ModelFailure(_))));
    }

    #[test]
    fn test_model_policy_requires_path() {
        assert!(build_policy(PolicyKind::Model, None).is_err());
        assert_eq!(build_policy(PolicyKind::Scored, None).unwrap().name(), "scored");
    }

    #[test]
    fn test_model_policy_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forest.json");
        std::fs::write(
            &path,
            r#"{"name": "pressure-stump", "trees": [{"nodes": [
                {"feature": 4, "threshold": 15.0, "left": 1, "right": 2},
                {"label": "LOW"},
                {"label": "HIGH"}
            ]}]}"#,
        )
        .unwrap();

        let policy = build_policy(PolicyKind::Model, Some(&path)).unwrap();
        assert_eq!(policy.name(), "model");
        assert_eq!(policy.biomass_scale(), BiomassScale::ModelDefined);

        let d = policy.decide(Some(&features(0.3, 0.0, 20.0))).unwrap();
        assert_eq!(d.label, RiskLabel::High);
        let d = policy.decide(Some(&features(0.3, 0.0, 2.0))).unwrap();
        assert_eq!(d.label, RiskLabel::Low);
    }

    #[test]
    fn test_missing_model_file_fails_at_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        assert!(matches!(ForestModel::load(&path), Err(ModelError::Io(_))));
        assert!(matches!(
            build_policy(PolicyKind::Model, Some(&path)),
            Err(ModelError::Io(_))
        ));
    }

    #[test]
    fn test_scale_mismatch_reported_once() {
        let threshold = ThresholdPolicy::default();
        assert!(!threshold.scale_check.observe("threshold", BiomassScale::Absolute, 12.0));
        assert!(threshold.scale_check.observe("threshold", BiomassScale::Absolute, 0.4));
        assert!(!threshold.scale_check.observe("threshold", BiomassScale::Absolute, 0.4));

        // Deciding still works after the warning fired.
        let scored = ScoredPolicy::new();
        for _ in 0..3 {
            let d = scored.decide(Some(&features(20.0, 0.0, 2.0))).unwrap();
            assert_eq!(d.label, RiskLabel::Low);
        }
        assert!(scored.scale_check.warned.load(Ordering::Relaxed));
        assert!(!scored.scale_check.observe("scored", BiomassScale::Normalized, 30.0));
    }

    #[test]
    fn test_scale_compatibility() {
        assert!(BiomassScale::Normalized.accepts(0.0));
        assert!(!BiomassScale::Normalized.accepts(1.5));
        assert!(BiomassScale::Absolute.accepts(5.5));
        assert!(!BiomassScale::Absolute.accepts(0.8));

        let scale = |k: PolicyKind| k.biomass_scale();
        assert!(!scale(PolicyKind::Threshold).is_compatible_with(scale(PolicyKind::Scored)));
        assert!(scale(PolicyKind::Scored).is_compatible_with(scale(PolicyKind::Scored)));
        assert!(scale(PolicyKind::Model).is_compatible_with(scale(PolicyKind::Threshold)));
        assert!(scale(PolicyKind::Scored).is_compatible_with(scale(PolicyKind::Model)));
    }

    #[test]
    fn test_decision_serialization() {
        let d = RiskDecision::coded(DecisionCode::RotatePasture, RiskLabel::High);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["label"], "HIGH");
        assert_eq!(json["decision_code"], "ROTATE_PASTURE");

        let d = RiskDecision::label_only(RiskLabel::Class("grazed".to_string()));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["label"], "grazed");
        assert!(json.get("decision_code").is_none());
    }
}
