//! Tree-ensemble classifier loaded from a JSON export.
//!
//! The offline trainer exports each tree as a flat node array. Split nodes
//! send `x[feature] <= threshold` to `left`, everything else to `right`;
//! leaves carry a class label. The ensemble predicts by majority vote, ties
//! going to the lexicographically smallest label.

use crate::core::features::MODEL_INPUT_LEN;
use crate::model::{ModelError, RiskModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One node of an exported decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        /// Index into the model input vector
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        label: String,
    },
}

/// A single decision tree; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Walk from the root to a leaf.
    fn classify(&self, input: &[f64; MODEL_INPUT_LEN]) -> &str {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { label } => return label,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if input[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Children must point strictly forward so traversal always terminates.
    fn validate(&self, tree_index: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::Invalid(format!("tree {tree_index} has no nodes")));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                if *feature >= MODEL_INPUT_LEN {
                    return Err(ModelError::Invalid(format!(
                        "tree {tree_index} node {i}: feature index {feature} out of range"
                    )));
                }
                if !threshold.is_finite() {
                    return Err(ModelError::Invalid(format!(
                        "tree {tree_index} node {i}: threshold is not finite"
                    )));
                }
                for child in [*left, *right] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(ModelError::Invalid(format!(
                            "tree {tree_index} node {i}: child index {child} is invalid"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Majority-vote ensemble of decision trees.
///
/// Fields are private and deserialization goes through [`RawForest`], so a
/// model can only exist in validated form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawForest")]
pub struct ForestModel {
    name: String,
    trees: Vec<DecisionTree>,
}

/// Unchecked shape of the JSON export.
#[derive(Deserialize)]
struct RawForest {
    #[serde(default = "default_model_name")]
    name: String,
    trees: Vec<DecisionTree>,
}

fn default_model_name() -> String {
    "risk-forest".to_string()
}

impl TryFrom<RawForest> for ForestModel {
    type Error = ModelError;

    fn try_from(raw: RawForest) -> Result<Self, Self::Error> {
        ForestModel::new(raw.name, raw.trees)
    }
}

impl ForestModel {
    /// Build a model from trees, validating their structure.
    pub fn new(name: impl Into<String>, trees: Vec<DecisionTree>) -> Result<Self, ModelError> {
        let model = Self {
            name: name.into(),
            trees,
        };
        model.validate()?;
        Ok(model)
    }

    /// Load and validate a model exported as JSON.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Io(format!("{path:?}: {e}")))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let raw: RawForest =
            serde_json::from_str(json).map_err(|e| ModelError::Parse(e.to_string()))?;
        ForestModel::try_from(raw)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Invalid("forest has no trees".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(i)?;
        }
        Ok(())
    }
}

impl RiskModel for ForestModel {
    fn predict(&self, input: &[f64; MODEL_INPUT_LEN]) -> Result<String, ModelError> {
        if input.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::Prediction(format!(
                "non-finite model input: {input:?}"
            )));
        }

        let mut votes: BTreeMap<&str, usize> = BTreeMap::new();
        for tree in &self.trees {
            *votes.entry(tree.classify(input)).or_insert(0) += 1;
        }

        // BTreeMap iterates in label order, so the first maximum wins ties.
        let mut best: Option<(&str, usize)> = None;
        for (label, count) in votes {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((label, count));
            }
        }

        best.map(|(label, _)| label.to_string())
            .ok_or_else(|| ModelError::Prediction("forest produced no votes".to_string()))
    }

    fn describe(&self) -> String {
        format!("{} ({} trees)", self.name, self.trees.len())
    }
}
