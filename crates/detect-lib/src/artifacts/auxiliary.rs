//! Auxiliary artifacts persisted next to the primary models
//!
//! All of them are small JSON documents written by the training pipeline.

use crate::error::{DetectError, Result};
use crate::models::QualityMetrics;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Sequence id reserved for padding
pub const PAD_ID: u32 = 0;

/// Sequence id for actions missing from the vocabulary
pub const OOV_ID: u32 = 1;

/// Sequence length used when no sequence metadata is persisted
pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 50;

/// Read and decode one JSON artifact
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| DetectError::artifact(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| DetectError::artifact(path, e))
}

/// Per-column standardization fitted at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Column order the tree model was trained on
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Check the fitted vectors against the tree model's input width
    pub fn check_width(&self, width: usize) -> std::result::Result<(), String> {
        if !self.feature_names.is_empty() && self.feature_names.len() != self.mean.len() {
            return Err(format!(
                "{} feature names but {} means",
                self.feature_names.len(),
                self.mean.len()
            ));
        }
        if self.mean.len() != width || self.scale.len() != width {
            return Err(format!(
                "mean/scale lengths {}/{} do not match {} input columns",
                self.mean.len(),
                self.scale.len(),
                width
            ));
        }
        Ok(())
    }

    /// Standardize `values` in place
    pub fn transform(&self, values: &mut [f32]) -> std::result::Result<(), String> {
        if self.mean.len() != values.len() || self.scale.len() != values.len() {
            return Err(format!(
                "scaler expects {} columns, got {}",
                self.mean.len(),
                values.len()
            ));
        }
        for ((v, mean), scale) in values.iter_mut().zip(&self.mean).zip(&self.scale) {
            let scale = if *scale == 0.0 { 1.0 } else { *scale };
            *v = ((*v as f64 - mean) / scale) as f32;
        }
        Ok(())
    }
}

/// Categorical encoder for the user's role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }
}

/// Action-count vectorizer: token to column index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionVectorizer {
    pub vocabulary: BTreeMap<String, usize>,
}

impl ActionVectorizer {
    /// Tokens ordered by their column index
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens: Vec<(&str, usize)> = self
            .vocabulary
            .iter()
            .map(|(token, idx)| (token.as_str(), *idx))
            .collect();
        tokens.sort_by_key(|(_, idx)| *idx);
        tokens.into_iter().map(|(token, _)| token).collect()
    }
}

/// Historical activity for one user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    pub mean_events: f64,
    pub std_events: f64,
}

/// Per-user activity baselines
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub users: HashMap<String, UserActivity>,
}

impl UserStats {
    /// How unusual this session's event count is for the user; 0 when unknown
    pub fn activity_zscore(&self, user_id: &str, event_count: f64) -> f64 {
        match self.users.get(user_id) {
            Some(stats) if stats.std_events > 0.0 => {
                (event_count - stats.mean_events) / stats.std_events
            }
            _ => 0.0,
        }
    }
}

/// Action vocabulary for the sequence model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionVocabulary {
    pub tokens: HashMap<String, u32>,
}

impl ActionVocabulary {
    pub fn id(&self, action: &str) -> u32 {
        self.tokens.get(action).copied().unwrap_or(OOV_ID)
    }
}

/// Training-time description of the sequence model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceMetadata {
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,
    #[serde(flatten)]
    pub metrics: QualityMetrics,
}

fn default_max_sequence_length() -> usize {
    DEFAULT_MAX_SEQUENCE_LENGTH
}

impl Default for SequenceMetadata {
    fn default() -> Self {
        Self {
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            metrics: QualityMetrics::default(),
        }
    }
}

/// Persisted decision threshold for the hybrid ensemble
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridThreshold {
    pub threshold: f64,
}

impl HybridThreshold {
    pub fn validated(self) -> std::result::Result<f64, String> {
        if self.threshold.is_finite() && (0.0..=1.0).contains(&self.threshold) {
            Ok(self.threshold)
        } else {
            Err(format!("threshold {} outside [0, 1]", self.threshold))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaler_transform() {
        let scaler = StandardScaler {
            feature_names: vec![],
            mean: vec![1.0, 2.0, 3.0],
            scale: vec![2.0, 0.0, 1.0],
        };
        let mut values = [3.0, 5.0, 3.0];
        scaler.transform(&mut values).unwrap();
        assert_eq!(values, [1.0, 3.0, 0.0]);
    }

    #[test]
    fn test_scaler_length_mismatch() {
        let scaler = StandardScaler {
            feature_names: vec![],
            mean: vec![0.0; 2],
            scale: vec![1.0; 2],
        };
        let mut values = [1.0; 3];
        assert!(scaler.transform(&mut values).is_err());
    }

    #[test]
    fn test_scaler_check_width() {
        let scaler = StandardScaler {
            feature_names: vec!["a".to_string(), "b".to_string()],
            mean: vec![0.0; 2],
            scale: vec![1.0; 2],
        };
        assert!(scaler.check_width(2).is_ok());
        assert!(scaler.check_width(3).is_err());

        let short_scale = StandardScaler {
            scale: vec![1.0],
            ..scaler.clone()
        };
        assert!(short_scale.check_width(2).is_err());

        let extra_names = StandardScaler {
            feature_names: vec!["a".to_string()],
            ..scaler
        };
        assert!(extra_names.check_width(2).unwrap_err().contains("feature names"));
    }

    #[test]
    fn test_vectorizer_tokens_in_column_order() {
        let vect: ActionVectorizer =
            serde_json::from_str(r#"{"vocabulary": {"logon": 2, "email": 0, "usb": 1}}"#).unwrap();
        assert_eq!(vect.tokens(), vec!["email", "usb", "logon"]);
    }

    #[test]
    fn test_user_zscore() {
        let mut stats = UserStats::default();
        stats.users.insert(
            "u1".to_string(),
            UserActivity {
                mean_events: 10.0,
                std_events: 2.0,
            },
        );
        assert_eq!(stats.activity_zscore("u1", 14.0), 2.0);
        assert_eq!(stats.activity_zscore("unknown", 14.0), 0.0);
    }

    #[test]
    fn test_vocabulary_oov() {
        let mut vocab = ActionVocabulary::default();
        vocab.tokens.insert("logon".to_string(), 7);
        assert_eq!(vocab.id("logon"), 7);
        assert_eq!(vocab.id("usb"), OOV_ID);
    }

    #[test]
    fn test_sequence_metadata_defaults() {
        let meta: SequenceMetadata = serde_json::from_str(r#"{"accuracy": 0.9}"#).unwrap();
        assert_eq!(meta.max_sequence_length, DEFAULT_MAX_SEQUENCE_LENGTH);
        assert_eq!(meta.metrics.accuracy, Some(0.9));
    }

    #[test]
    fn test_hybrid_threshold_range() {
        assert_eq!(HybridThreshold { threshold: 0.42 }.validated(), Ok(0.42));
        assert!(HybridThreshold { threshold: 1.2 }.validated().is_err());
    }
}
