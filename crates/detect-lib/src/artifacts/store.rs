//! Artifact store
//!
//! Discovery is file-existence driven: each model kind has a fixed primary
//! filename and a small set of optional auxiliary files. A loaded
//! [`ArtifactSet`] is immutable and is replaced wholesale on reload.

use super::auxiliary::{
    read_json, ActionVectorizer, ActionVocabulary, HybridThreshold, LabelEncoder,
    SequenceMetadata, StandardScaler, UserStats,
};
use super::{files, names};
use crate::error::{DetectError, Result};
use crate::models::{ModelKind, ModelMetadata, QualityMetrics};
use crate::predictor::{default_tabular_columns, Model, ModelRuntime};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Loaded tree model and its auxiliary artifacts
pub struct TreeArtifacts {
    pub model: Arc<dyn Model>,
    pub scaler: Option<StandardScaler>,
    pub label_encoder: Option<LabelEncoder>,
    pub vectorizer: Option<ActionVectorizer>,
    pub user_stats: Option<UserStats>,
}

impl TreeArtifacts {
    /// Feature names declared by the training pipeline, empty when unknown
    pub fn declared_features(&self) -> Vec<String> {
        self.scaler
            .as_ref()
            .map(|s| s.feature_names.clone())
            .unwrap_or_default()
    }

    /// Column order used to encode tabular input
    pub fn columns(&self) -> Vec<String> {
        tree_columns(self.scaler.as_ref(), self.vectorizer.as_ref())
    }
}

fn tree_columns(scaler: Option<&StandardScaler>, vectorizer: Option<&ActionVectorizer>) -> Vec<String> {
    match scaler {
        Some(s) if !s.feature_names.is_empty() => s.feature_names.clone(),
        _ => default_tabular_columns(vectorizer),
    }
}

/// Loaded sequence model and its auxiliary artifacts
pub struct SequenceArtifacts {
    pub model: Arc<dyn Model>,
    pub vocabulary: Option<ActionVocabulary>,
    pub metadata: Option<SequenceMetadata>,
}

impl SequenceArtifacts {
    pub fn max_sequence_length(&self) -> usize {
        self.metadata
            .as_ref()
            .map(|m| m.max_sequence_length)
            .unwrap_or(super::DEFAULT_MAX_SEQUENCE_LENGTH)
    }
}

/// Everything loaded from one model directory
#[derive(Default)]
pub struct ArtifactSet {
    pub tree: Option<TreeArtifacts>,
    pub sequence: Option<SequenceArtifacts>,
    /// Persisted hybrid threshold, overrides the configured one
    pub hybrid_threshold: Option<f64>,
    pub metadata: BTreeMap<ModelKind, ModelMetadata>,
}

impl ArtifactSet {
    /// Primary model kinds present in this set
    pub fn loaded_kinds(&self) -> Vec<ModelKind> {
        let mut kinds = Vec::new();
        if self.tree.is_some() {
            kinds.push(ModelKind::TreeEnsemble);
        }
        if self.sequence.is_some() {
            kinds.push(ModelKind::Sequence);
        }
        kinds
    }

    /// Names of every loaded artifact, primary and auxiliary
    pub fn artifact_names(&self) -> Vec<String> {
        let mut loaded = Vec::new();
        if let Some(tree) = &self.tree {
            loaded.push(names::TREE_MODEL);
            if tree.scaler.is_some() {
                loaded.push(names::TREE_SCALER);
            }
            if tree.label_encoder.is_some() {
                loaded.push(names::TREE_LABEL_ENCODER);
            }
            if tree.vectorizer.is_some() {
                loaded.push(names::TREE_VECTORIZER);
            }
            if tree.user_stats.is_some() {
                loaded.push(names::TREE_USER_STATS);
            }
        }
        if let Some(sequence) = &self.sequence {
            loaded.push(names::SEQUENCE_MODEL);
            if sequence.vocabulary.is_some() {
                loaded.push(names::SEQUENCE_VOCAB);
            }
            if sequence.metadata.is_some() {
                loaded.push(names::SEQUENCE_METADATA);
            }
        }
        if self.hybrid_threshold.is_some() {
            loaded.push(names::HYBRID_THRESHOLD);
        }
        loaded.into_iter().map(String::from).collect()
    }
}

impl fmt::Debug for ArtifactSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactSet")
            .field("artifacts", &self.artifact_names())
            .field("hybrid_threshold", &self.hybrid_threshold)
            .field("metadata", &self.metadata.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Raw bytes and provenance of a primary artifact
struct PrimaryArtifact {
    bytes: Vec<u8>,
    checksum: String,
    created_at: String,
}

/// Loads artifact sets from a model directory
#[derive(Clone)]
pub struct ArtifactStore {
    runtime: Arc<dyn ModelRuntime>,
}

impl ArtifactStore {
    pub fn new(runtime: Arc<dyn ModelRuntime>) -> Self {
        Self { runtime }
    }

    /// Load every discoverable model from `dir`
    ///
    /// A missing primary model is omitted here; whether that is fatal is the
    /// registry's decision. A present but unreadable artifact is an error.
    pub fn load(&self, dir: &Path) -> Result<ArtifactSet> {
        if !dir.is_dir() {
            return Err(DetectError::artifact(dir, "model directory does not exist"));
        }

        info!(model_dir = %dir.display(), "Loading model artifacts");
        let mut set = ArtifactSet::default();

        let tree_path = dir.join(files::TREE_MODEL);
        if tree_path.exists() {
            let (tree, metadata) = self.load_tree(dir, &tree_path)?;
            set.tree = Some(tree);
            set.metadata.insert(ModelKind::TreeEnsemble, metadata);
        } else {
            warn!(path = %tree_path.display(), "Tree model file not found");
        }

        let sequence_path = dir.join(files::SEQUENCE_MODEL);
        if sequence_path.exists() {
            let (sequence, metadata) = self.load_sequence(dir, &sequence_path)?;
            set.sequence = Some(sequence);
            set.metadata.insert(ModelKind::Sequence, metadata);
        } else {
            warn!(path = %sequence_path.display(), "Sequence model file not found");
        }

        set.hybrid_threshold = load_hybrid_threshold(dir);
        if set.tree.is_some() && set.sequence.is_some() {
            set.metadata.insert(ModelKind::Hybrid, hybrid_metadata());
        }

        info!(
            count = set.metadata.len(),
            artifacts = ?set.artifact_names(),
            "Model artifacts loaded"
        );
        Ok(set)
    }

    fn load_tree(&self, dir: &Path, path: &Path) -> Result<(TreeArtifacts, ModelMetadata)> {
        let scaler: Option<StandardScaler> = optional(dir, files::TREE_SCALER)?;
        let label_encoder: Option<LabelEncoder> = optional(dir, files::TREE_LABEL_ENCODER)?;
        let vectorizer: Option<ActionVectorizer> = optional(dir, files::TREE_VECTORIZER)?;
        let user_stats: Option<UserStats> = optional(dir, files::TREE_USER_STATS)?;

        let width = tree_columns(scaler.as_ref(), vectorizer.as_ref()).len();
        if let Some(scaler) = &scaler {
            scaler
                .check_width(width)
                .map_err(|reason| DetectError::artifact(dir.join(files::TREE_SCALER), reason))?;
        }
        let primary = read_primary(path)?;
        let model = self
            .runtime
            .load(ModelKind::TreeEnsemble, &primary.bytes, [1, width])
            .map_err(|e| DetectError::artifact(path, format!("{:#}", e)))?;

        let tree = TreeArtifacts {
            model: Arc::from(model),
            scaler,
            label_encoder,
            vectorizer,
            user_stats,
        };

        let metadata = ModelMetadata {
            name: "XGBoost".to_string(),
            version: "v4".to_string(),
            model_type: ModelKind::TreeEnsemble,
            created_at: primary.created_at,
            metrics: QualityMetrics::default(),
            features: tree.declared_features(),
            description: None,
            checksum: Some(primary.checksum),
        };

        info!(model = "xgboost", path = %path.display(), input_width = width, "Tree model loaded");
        Ok((tree, metadata))
    }

    fn load_sequence(&self, dir: &Path, path: &Path) -> Result<(SequenceArtifacts, ModelMetadata)> {
        let vocabulary: Option<ActionVocabulary> = optional(dir, files::SEQUENCE_VOCAB)?;
        let sequence_meta: Option<SequenceMetadata> = optional(dir, files::SEQUENCE_METADATA)?;

        let max_len = sequence_meta
            .as_ref()
            .map(|m| m.max_sequence_length)
            .unwrap_or(super::DEFAULT_MAX_SEQUENCE_LENGTH);
        if max_len == 0 {
            return Err(DetectError::artifact(
                dir.join(files::SEQUENCE_METADATA),
                "max_sequence_length must be positive",
            ));
        }

        let primary = read_primary(path)?;
        let model = self
            .runtime
            .load(ModelKind::Sequence, &primary.bytes, [1, max_len])
            .map_err(|e| DetectError::artifact(path, format!("{:#}", e)))?;

        let metadata = ModelMetadata {
            name: "LSTM".to_string(),
            version: "v2".to_string(),
            model_type: ModelKind::Sequence,
            created_at: primary.created_at,
            metrics: sequence_meta
                .as_ref()
                .map(|m| m.metrics.clone())
                .unwrap_or_default(),
            features: vec!["action_sequence".to_string(), "sequence_length".to_string()],
            description: None,
            checksum: Some(primary.checksum),
        };

        info!(model = "lstm", path = %path.display(), max_sequence_length = max_len, "Sequence model loaded");
        Ok((
            SequenceArtifacts {
                model: Arc::from(model),
                vocabulary,
                metadata: sequence_meta,
            },
            metadata,
        ))
    }
}

fn optional<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<Option<T>> {
    let path = dir.join(file);
    if !path.exists() {
        debug!(path = %path.display(), "Optional artifact not present");
        return Ok(None);
    }
    let value = read_json(&path)?;
    debug!(path = %path.display(), "Auxiliary artifact loaded");
    Ok(Some(value))
}

fn read_primary(path: &Path) -> Result<PrimaryArtifact> {
    let bytes = std::fs::read(path).map_err(|e| DetectError::artifact(path, e))?;
    let checksum = compute_checksum(&bytes);
    let created_at = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
        .to_rfc3339();
    Ok(PrimaryArtifact {
        bytes,
        checksum,
        created_at,
    })
}

fn load_hybrid_threshold(dir: &Path) -> Option<f64> {
    let path = dir.join(files::HYBRID_THRESHOLD);
    if !path.exists() {
        debug!("No persisted hybrid threshold, configured threshold applies");
        return None;
    }
    let loaded = read_json::<HybridThreshold>(&path)
        .and_then(|t| t.validated().map_err(|e| DetectError::artifact(&path, e)));
    match loaded {
        Ok(threshold) => {
            info!(threshold = threshold, "Persisted hybrid threshold loaded");
            Some(threshold)
        }
        Err(e) => {
            warn!(error = %e, "Failed to load hybrid threshold, falling back to configured threshold");
            None
        }
    }
}

fn hybrid_metadata() -> ModelMetadata {
    ModelMetadata {
        name: "Hybrid Ensemble".to_string(),
        version: "v2".to_string(),
        model_type: ModelKind::Hybrid,
        created_at: Utc::now().to_rfc3339(),
        metrics: QualityMetrics::default(),
        features: Vec::new(),
        description: Some("Combined XGBoost and LSTM ensemble model".to_string()),
        checksum: None,
    }
}

/// Compute SHA256 checksum of artifact bytes
pub(crate) fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::testing::FixedRuntime;
    use crate::predictor::BASE_FEATURES;
    use tempfile::TempDir;

    fn write(dir: &Path, file: &str, contents: &str) {
        std::fs::write(dir.join(file), contents).unwrap();
    }

    fn full_layout() -> TempDir {
        let dir = TempDir::new().unwrap();
        let p = dir.path();
        write(p, files::TREE_MODEL, "0.7");
        write(
            p,
            files::TREE_SCALER,
            r#"{"feature_names": ["event_count", "after_hours_ratio"], "mean": [10.0, 0.1], "scale": [5.0, 0.2]}"#,
        );
        write(p, files::TREE_LABEL_ENCODER, r#"{"classes": ["admin", "engineer"]}"#);
        write(p, files::TREE_VECTORIZER, r#"{"vocabulary": {"logon": 0, "usb": 1}}"#);
        write(
            p,
            files::TREE_USER_STATS,
            r#"{"users": {"u1": {"mean_events": 12.0, "std_events": 3.0}}}"#,
        );
        write(p, files::SEQUENCE_MODEL, "0.3");
        write(p, files::SEQUENCE_VOCAB, r#"{"tokens": {"logon": 2, "usb": 3}}"#);
        write(
            p,
            files::SEQUENCE_METADATA,
            r#"{"max_sequence_length": 20, "accuracy": 0.93, "f1_score": 0.88}"#,
        );
        write(p, files::HYBRID_THRESHOLD, r#"{"threshold": 0.45}"#);
        dir
    }

    fn store(runtime: &FixedRuntime) -> ArtifactStore {
        ArtifactStore::new(Arc::new(runtime.clone()))
    }

    #[test]
    fn test_load_full_layout() {
        let dir = full_layout();
        let runtime = FixedRuntime::default();
        let set = store(&runtime).load(dir.path()).unwrap();

        assert_eq!(set.loaded_kinds(), vec![ModelKind::TreeEnsemble, ModelKind::Sequence]);
        assert_eq!(set.metadata.len(), 3);
        assert_eq!(set.hybrid_threshold, Some(0.45));
        assert_eq!(set.artifact_names().len(), 9);

        let tree = &set.metadata[&ModelKind::TreeEnsemble];
        assert_eq!(tree.version, "v4");
        assert_eq!(tree.features, vec!["event_count", "after_hours_ratio"]);
        assert_eq!(tree.checksum.as_ref().map(|c| c.len()), Some(64));

        let lstm = &set.metadata[&ModelKind::Sequence];
        assert_eq!(lstm.metrics.accuracy, Some(0.93));
        assert_eq!(lstm.metrics.f1_score, Some(0.88));
        assert_eq!(lstm.features, vec!["action_sequence", "sequence_length"]);

        let shapes = runtime.shapes.lock().unwrap().clone();
        assert!(shapes.contains(&(ModelKind::TreeEnsemble, [1, 2])));
        assert!(shapes.contains(&(ModelKind::Sequence, [1, 20])));
    }

    #[test]
    fn test_missing_directory() {
        let runtime = FixedRuntime::default();
        let err = store(&runtime)
            .load(Path::new("/nonexistent/insider-detect"))
            .unwrap_err();
        assert!(matches!(err, DetectError::ArtifactLoad { .. }));
    }

    #[test]
    fn test_missing_sequence_model_is_omitted() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), files::TREE_MODEL, "0.7");

        let set = store(&FixedRuntime::default()).load(dir.path()).unwrap();
        assert!(set.tree.is_some());
        assert!(set.sequence.is_none());
        assert!(!set.metadata.contains_key(&ModelKind::Hybrid));
    }

    #[test]
    fn test_absent_auxiliaries_tolerated() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), files::TREE_MODEL, "0.7");
        write(dir.path(), files::SEQUENCE_MODEL, "0.3");

        let runtime = FixedRuntime::default();
        let set = store(&runtime).load(dir.path()).unwrap();
        assert_eq!(set.artifact_names(), vec!["xgboost", "lstm"]);
        assert!(set.metadata[&ModelKind::TreeEnsemble].features.is_empty());
        assert_eq!(set.hybrid_threshold, None);

        let shapes = runtime.shapes.lock().unwrap().clone();
        assert!(shapes.contains(&(ModelKind::TreeEnsemble, [1, BASE_FEATURES.len() + 2])));
        assert!(shapes.contains(&(ModelKind::Sequence, [1, super::super::DEFAULT_MAX_SEQUENCE_LENGTH])));
    }

    #[test]
    fn test_corrupt_auxiliary_fails() {
        let dir = full_layout();
        write(dir.path(), files::TREE_SCALER, "{not json");

        let err = store(&FixedRuntime::default()).load(dir.path()).unwrap_err();
        match err {
            DetectError::ArtifactLoad { path, .. } => {
                assert!(path.ends_with(files::TREE_SCALER));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scaler_width_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), files::TREE_MODEL, "0.7");
        write(dir.path(), files::SEQUENCE_MODEL, "0.3");
        write(dir.path(), files::TREE_SCALER, r#"{"mean": [0, 0, 0], "scale": [1, 1, 1]}"#);

        let runtime = FixedRuntime::default();
        let err = store(&runtime).load(dir.path()).unwrap_err();
        match err {
            DetectError::ArtifactLoad { path, reason } => {
                assert!(path.ends_with(files::TREE_SCALER));
                assert!(reason.contains("input columns"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runtime.load_count(), 0);
    }

    #[test]
    fn test_scaler_names_and_means_disagree() {
        let dir = full_layout();
        write(
            dir.path(),
            files::TREE_SCALER,
            r#"{"feature_names": ["event_count", "after_hours_ratio"], "mean": [10.0], "scale": [5.0]}"#,
        );

        let err = store(&FixedRuntime::default()).load(dir.path()).unwrap_err();
        assert!(matches!(err, DetectError::ArtifactLoad { .. }));
    }

    #[test]
    fn test_corrupt_primary_fails() {
        let dir = full_layout();
        write(dir.path(), files::SEQUENCE_MODEL, "corrupt");

        let err = store(&FixedRuntime::default()).load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a valid model graph"));
    }

    #[test]
    fn test_malformed_threshold_falls_back() {
        let dir = full_layout();
        write(dir.path(), files::HYBRID_THRESHOLD, r#"{"threshold": 3.0}"#);

        let set = store(&FixedRuntime::default()).load(dir.path()).unwrap();
        assert_eq!(set.hybrid_threshold, None);
        assert!(set.metadata.contains_key(&ModelKind::Hybrid));
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(compute_checksum(b"abc"), compute_checksum(b"abc"));
        assert_eq!(
            compute_checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
