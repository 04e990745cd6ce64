//! Hybrid score combination
//!
//! The hybrid probability is the plain weighted sum of the two sub-model
//! probabilities. Weights are validated when configuration loads, so no
//! renormalization happens here.

use super::{confidence, decide, ModelScore};
use crate::config::EnsembleWeights;
use crate::models::{InferenceResult, ModelKind};
use serde_json::json;
use std::collections::BTreeMap;

/// Combines tree and sequence scores into one decision
#[derive(Debug, Clone)]
pub struct EnsembleCombiner {
    weights: EnsembleWeights,
    threshold: f64,
    name: String,
    version: String,
}

impl EnsembleCombiner {
    pub fn new(weights: EnsembleWeights, threshold: f64) -> Self {
        Self {
            weights,
            threshold,
            name: "Hybrid Ensemble".to_string(),
            version: "v2".to_string(),
        }
    }

    /// Use the name and version recorded in loaded metadata
    pub fn with_identity(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.name = name.into();
        self.version = version.into();
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    /// Weighted hybrid probability
    pub fn hybrid_probability(&self, tree: f64, sequence: f64) -> f64 {
        tree * self.weights.tree() + sequence * self.weights.sequence()
    }

    pub fn combine(&self, tree: &ModelScore, sequence: &ModelScore) -> InferenceResult {
        let probability = self.hybrid_probability(tree.probability, sequence.probability);

        let mut metadata = BTreeMap::new();
        metadata.insert("model_type".to_string(), json!(ModelKind::Hybrid));
        metadata.insert("xgb_probability".to_string(), json!(tree.probability));
        metadata.insert("lstm_probability".to_string(), json!(sequence.probability));
        metadata.insert("xgb_weight".to_string(), json!(self.weights.tree()));
        metadata.insert("lstm_weight".to_string(), json!(self.weights.sequence()));
        metadata.insert("threshold".to_string(), json!(self.threshold));

        let features_used = tree
            .features_used
            .iter()
            .chain(&sequence.features_used)
            .cloned()
            .collect();

        InferenceResult {
            prediction: decide(probability, self.threshold),
            probability,
            confidence: confidence(probability),
            model_name: self.name.clone(),
            model_version: self.version.clone(),
            inference_time: 0.0,
            features_used,
            metadata,
        }
    }
}
