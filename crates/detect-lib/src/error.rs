//! Error taxonomy for the detection engine
//!
//! One enum carries every failure the engine can surface. Each variant maps
//! to a stable [`ErrorKind`] code and a structured detail map so the API
//! layer can render any error with a single response shape.

use crate::models::{ModelKind, ServiceState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, DetectError>;

/// Stable error code for a [`DetectError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ArtifactLoadError,
    MissingModelsError,
    ServiceInitializationError,
    NotReadyError,
    PreprocessingError,
    FeatureExtractionError,
    InferenceError,
    PredictionError,
    ConfigurationError,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ArtifactLoadError => "ARTIFACT_LOAD_ERROR",
            ErrorKind::MissingModelsError => "MISSING_MODELS_ERROR",
            ErrorKind::ServiceInitializationError => "SERVICE_INITIALIZATION_ERROR",
            ErrorKind::NotReadyError => "NOT_READY_ERROR",
            ErrorKind::PreprocessingError => "PREPROCESSING_ERROR",
            ErrorKind::FeatureExtractionError => "FEATURE_EXTRACTION_ERROR",
            ErrorKind::InferenceError => "INFERENCE_ERROR",
            ErrorKind::PredictionError => "PREDICTION_ERROR",
            ErrorKind::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DetectError {
    #[error("Failed to load artifact {}: {reason}", .path.display())]
    ArtifactLoad { path: PathBuf, reason: String },

    #[error("Missing required models: {}", join_kinds(.missing))]
    MissingModels { missing: Vec<ModelKind> },

    #[error("Model service initialization failed: {source}")]
    ServiceInitialization { source: Box<DetectError> },

    #[error("Model service is not ready (state: {state})")]
    NotReady { state: ServiceState },

    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("Feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("{kind} inference failed: {reason}")]
    Inference { kind: ModelKind, reason: String },

    #[error("Prediction failed: {source}")]
    Prediction { source: Box<DetectError> },

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

fn join_kinds(kinds: &[ModelKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl DetectError {
    pub fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        DetectError::ArtifactLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(kind: ModelKind, reason: impl ToString) -> Self {
        DetectError::Inference {
            kind,
            reason: reason.to_string(),
        }
    }

    /// Wrap a failure from any predict stage
    pub fn prediction(cause: DetectError) -> Self {
        DetectError::Prediction {
            source: Box::new(cause),
        }
    }

    /// Wrap a failure from any initialize stage
    pub fn initialization(cause: DetectError) -> Self {
        DetectError::ServiceInitialization {
            source: Box::new(cause),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectError::ArtifactLoad { .. } => ErrorKind::ArtifactLoadError,
            DetectError::MissingModels { .. } => ErrorKind::MissingModelsError,
            DetectError::ServiceInitialization { .. } => ErrorKind::ServiceInitializationError,
            DetectError::NotReady { .. } => ErrorKind::NotReadyError,
            DetectError::Preprocessing(_) => ErrorKind::PreprocessingError,
            DetectError::FeatureExtraction(_) => ErrorKind::FeatureExtractionError,
            DetectError::Inference { .. } => ErrorKind::InferenceError,
            DetectError::Prediction { .. } => ErrorKind::PredictionError,
            DetectError::Configuration(_) => ErrorKind::ConfigurationError,
        }
    }

    /// The wrapped cause for wrapper variants, `self` otherwise
    pub fn cause(&self) -> &DetectError {
        match self {
            DetectError::ServiceInitialization { source } | DetectError::Prediction { source } => {
                source.cause()
            }
            other => other,
        }
    }

    /// Structured detail map rendered alongside the message
    pub fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        match self {
            DetectError::ArtifactLoad { path, reason } => {
                details.insert("path".into(), json!(path.display().to_string()));
                details.insert("reason".into(), json!(reason));
            }
            DetectError::MissingModels { missing } => {
                details.insert("missing_models".into(), json!(missing));
            }
            DetectError::NotReady { state } => {
                details.insert("state".into(), json!(state));
            }
            DetectError::Inference { kind, reason } => {
                details.insert("model_type".into(), json!(kind));
                details.insert("reason".into(), json!(reason));
            }
            DetectError::ServiceInitialization { source } | DetectError::Prediction { source } => {
                let cause = source.cause();
                details.insert("cause".into(), json!(cause.kind().code()));
                details.insert("cause_message".into(), json!(cause.to_string()));
                for (key, value) in cause.details() {
                    details.entry(key).or_insert(value);
                }
            }
            DetectError::Preprocessing(_)
            | DetectError::FeatureExtraction(_)
            | DetectError::Configuration(_) => {}
        }
        details
    }
}
