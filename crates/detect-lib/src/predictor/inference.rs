//! Single-model inference
//!
//! Forward passes are CPU-bound, so each one runs on the blocking pool and
//! holds a worker permit for its duration.

use super::{confidence, decide, Model, ModelInput, SequenceEncoder, TabularEncoder};
use crate::artifacts::ArtifactSet;
use crate::error::{DetectError, Result};
use crate::models::{InferenceResult, ModelKind, ModelMetadata};
use crate::observability::ServiceMetrics;
use crate::session::FeatureBundle;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::debug;

/// Features reported for the sequence model
pub const SEQUENCE_FEATURES: [&str; 2] = ["action_sequence", "sequence_length"];

/// Output of one model's forward pass
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScore {
    pub kind: ModelKind,
    /// Positive-class probability in [0, 1]
    pub probability: f64,
    pub features_used: Vec<String>,
    /// Width of the encoded input
    pub input_size: usize,
}

impl ModelScore {
    /// Single-model result under `threshold`
    pub fn into_result(self, metadata: &ModelMetadata, threshold: f64) -> InferenceResult {
        let mut extra = BTreeMap::new();
        extra.insert("model_type".to_string(), json!(self.kind));
        InferenceResult {
            prediction: decide(self.probability, threshold),
            probability: self.probability,
            confidence: confidence(self.probability),
            model_name: metadata.name.clone(),
            model_version: metadata.version.clone(),
            inference_time: 0.0,
            features_used: self.features_used,
            metadata: extra,
        }
    }
}

/// Runs forward passes against one loaded artifact set
#[derive(Clone)]
pub struct InferenceEngine {
    artifacts: Arc<ArtifactSet>,
    workers: Arc<Semaphore>,
    metrics: ServiceMetrics,
}

impl InferenceEngine {
    pub fn new(artifacts: Arc<ArtifactSet>, workers: Arc<Semaphore>) -> Self {
        Self {
            artifacts,
            workers,
            metrics: ServiceMetrics::new(),
        }
    }

    /// Score `bundle` with the primary model of `kind`
    pub async fn run(&self, kind: ModelKind, bundle: &FeatureBundle) -> Result<ModelScore> {
        match kind {
            ModelKind::TreeEnsemble => {
                let tree = self
                    .artifacts
                    .tree
                    .as_ref()
                    .ok_or_else(|| DetectError::inference(kind, "model not loaded"))?;
                let encoder = TabularEncoder::new(tree);
                let input = encoder
                    .encode(bundle)
                    .map_err(|e| DetectError::inference(kind, e))?;
                let input_size = input.values.len();
                let probability = self.score(kind, tree.model.clone(), input).await?;
                Ok(ModelScore {
                    kind,
                    probability,
                    features_used: encoder.columns().to_vec(),
                    input_size,
                })
            }
            ModelKind::Sequence => {
                let sequence = self
                    .artifacts
                    .sequence
                    .as_ref()
                    .ok_or_else(|| DetectError::inference(kind, "model not loaded"))?;
                let input = SequenceEncoder::new(sequence)
                    .encode(bundle)
                    .map_err(|e| DetectError::inference(kind, e))?;
                let input_size = input.values.len();
                let probability = self.score(kind, sequence.model.clone(), input).await?;
                Ok(ModelScore {
                    kind,
                    probability,
                    features_used: SEQUENCE_FEATURES.iter().map(|f| f.to_string()).collect(),
                    input_size,
                })
            }
            ModelKind::Hybrid => Err(DetectError::inference(
                kind,
                "hybrid has no forward pass of its own",
            )),
        }
    }

    async fn score(&self, kind: ModelKind, model: Arc<dyn Model>, input: ModelInput) -> Result<f64> {
        let _permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DetectError::inference(kind, "inference worker pool closed"))?;

        let start = Instant::now();
        let raw = tokio::task::spawn_blocking(move || model.score(&input))
            .await
            .map_err(|e| DetectError::inference(kind, format!("inference task failed: {}", e)))?
            .map_err(|e| DetectError::inference(kind, format!("{:#}", e)))?;
        let elapsed = start.elapsed().as_secs_f64();
        self.metrics.observe_inference_latency(kind, elapsed);

        let probability = raw as f64;
        if !probability.is_finite() {
            return Err(DetectError::inference(kind, "model produced a non-finite probability"));
        }
        if !(0.0..=1.0).contains(&probability) {
            return Err(DetectError::inference(
                kind,
                format!("probability {} outside [0, 1]", probability),
            ));
        }

        debug!(model = %kind, probability = probability, elapsed_us = (elapsed * 1e6) as u64, "Forward pass completed");
        Ok(probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{SequenceArtifacts, TreeArtifacts};
    use crate::models::QualityMetrics;
    use crate::session::FEATURE_SCHEMA_VERSION;

    struct Constant(f32);

    impl Model for Constant {
        fn score(&self, _input: &ModelInput) -> anyhow::Result<f32> {
            Ok(self.0)
        }
    }

    struct Broken;

    impl Model for Broken {
        fn score(&self, _input: &ModelInput) -> anyhow::Result<f32> {
            anyhow::bail!("shape mismatch")
        }
    }

    fn engine(tree: Arc<dyn Model>, sequence: Option<Arc<dyn Model>>) -> InferenceEngine {
        let set = ArtifactSet {
            tree: Some(TreeArtifacts {
                model: tree,
                scaler: None,
                label_encoder: None,
                vectorizer: None,
                user_stats: None,
            }),
            sequence: sequence.map(|model| SequenceArtifacts {
                model,
                vocabulary: None,
                metadata: None,
            }),
            ..Default::default()
        };
        InferenceEngine::new(Arc::new(set), Arc::new(Semaphore::new(2)))
    }

    fn bundle() -> FeatureBundle {
        FeatureBundle {
            schema_version: FEATURE_SCHEMA_VERSION.to_string(),
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            role: None,
            request_id: None,
            tabular: BTreeMap::from([("event_count".to_string(), 2.0)]),
            action_counts: BTreeMap::from([("logon".to_string(), 2)]),
            actions: vec!["logon".to_string(), "logon".to_string()],
        }
    }

    #[tokio::test]
    async fn test_tree_score() {
        let score = engine(Arc::new(Constant(0.7)), None)
            .run(ModelKind::TreeEnsemble, &bundle())
            .await
            .unwrap();
        assert!((score.probability - 0.7).abs() < 1e-6);
        assert_eq!(score.input_size, 10);
        assert_eq!(score.features_used[0], "event_count");
    }

    #[tokio::test]
    async fn test_sequence_score() {
        let score = engine(Arc::new(Constant(0.7)), Some(Arc::new(Constant(0.25))))
            .run(ModelKind::Sequence, &bundle())
            .await
            .unwrap();
        assert_eq!(score.probability, 0.25);
        assert_eq!(score.input_size, crate::artifacts::DEFAULT_MAX_SEQUENCE_LENGTH);
        assert_eq!(score.features_used, vec!["action_sequence", "sequence_length"]);
    }

    #[tokio::test]
    async fn test_nan_is_inference_error() {
        let err = engine(Arc::new(Constant(f32::NAN)), None)
            .run(ModelKind::TreeEnsemble, &bundle())
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::Inference { kind: ModelKind::TreeEnsemble, .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_is_inference_error() {
        let err = engine(Arc::new(Constant(1.5)), None)
            .run(ModelKind::TreeEnsemble, &bundle())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
    }

    #[tokio::test]
    async fn test_model_failure_is_wrapped() {
        let err = engine(Arc::new(Broken), None)
            .run(ModelKind::TreeEnsemble, &bundle())
            .await
            .unwrap_err();
        match err {
            DetectError::Inference { kind, reason } => {
                assert_eq!(kind, ModelKind::TreeEnsemble);
                assert!(reason.contains("shape mismatch"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_model_is_inference_error() {
        let err = engine(Arc::new(Constant(0.1)), None)
            .run(ModelKind::Sequence, &bundle())
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::Inference { kind: ModelKind::Sequence, .. }));
    }

    #[test]
    fn test_single_model_result() {
        let metadata = ModelMetadata {
            name: "XGBoost".to_string(),
            version: "v4".to_string(),
            model_type: ModelKind::TreeEnsemble,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            metrics: QualityMetrics::default(),
            features: vec![],
            description: None,
            checksum: None,
        };
        let score = ModelScore {
            kind: ModelKind::TreeEnsemble,
            probability: 0.5,
            features_used: vec!["event_count".to_string()],
            input_size: 1,
        };
        let result = score.into_result(&metadata, 0.5);
        assert_eq!(result.prediction, 0);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.model_name, "XGBoost");
        assert_eq!(result.metadata["model_type"], json!("xgboost"));
    }
}
