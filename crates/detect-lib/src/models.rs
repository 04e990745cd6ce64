//! Core data models for the detection engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of model the engine can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Gradient-boosted tree classifier over tabular session features
    #[serde(rename = "xgboost")]
    TreeEnsemble,
    /// Recurrent network over the ordered action sequence
    #[serde(rename = "lstm")]
    Sequence,
    /// Weighted combination of the two
    #[serde(rename = "hybrid")]
    Hybrid,
}

impl ModelKind {
    /// Kinds that must be loaded before the service becomes ready
    pub const REQUIRED: [ModelKind; 2] = [ModelKind::TreeEnsemble, ModelKind::Sequence];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::TreeEnsemble => "xgboost",
            ModelKind::Sequence => "lstm",
            ModelKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xgboost" | "tree" => Ok(ModelKind::TreeEnsemble),
            "lstm" | "sequence" => Ok(ModelKind::Sequence),
            "hybrid" | "ensemble" => Ok(ModelKind::Hybrid),
            other => Err(format!("unknown model type '{}'", other)),
        }
    }
}

/// Lifecycle state of a model service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Uninitialized => "uninitialized",
            ServiceState::Initializing => "initializing",
            ServiceState::Ready => "ready",
            ServiceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Offline quality metrics recorded at training time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
}

/// Descriptive record for one loaded model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub version: String,
    pub model_type: ModelKind,
    /// RFC 3339 timestamp, artifact modification time
    pub created_at: String,
    #[serde(flatten)]
    pub metrics: QualityMetrics,
    /// Declared input feature names; empty when unknown
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Hex SHA-256 of the primary artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Output of one prediction
///
/// Field names are part of the API contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub prediction: u8,
    pub probability: f64,
    pub confidence: f64,
    pub model_name: String,
    pub model_version: String,
    /// Total wall-clock seconds for the prediction call
    pub inference_time: f64,
    pub features_used: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ModelKind::TreeEnsemble).unwrap(),
            "\"xgboost\""
        );
        assert_eq!(serde_json::to_string(&ModelKind::Sequence).unwrap(), "\"lstm\"");
        assert_eq!(serde_json::to_string(&ModelKind::Hybrid).unwrap(), "\"hybrid\"");
    }

    #[test]
    fn test_model_kind_parse() {
        assert_eq!("XGBoost".parse::<ModelKind>().unwrap(), ModelKind::TreeEnsemble);
        assert_eq!("lstm".parse::<ModelKind>().unwrap(), ModelKind::Sequence);
        assert_eq!(" hybrid ".parse::<ModelKind>().unwrap(), ModelKind::Hybrid);
        assert!("forest".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_metadata_flattens_metrics() {
        let meta = ModelMetadata {
            name: "LSTM".to_string(),
            version: "v2".to_string(),
            model_type: ModelKind::Sequence,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            metrics: QualityMetrics {
                accuracy: Some(0.91),
                ..Default::default()
            },
            features: vec!["action_sequence".to_string()],
            description: None,
            checksum: None,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["accuracy"], 0.91);
        assert!(json.get("precision").is_none());
        assert_eq!(json["model_type"], "lstm");
    }
}
