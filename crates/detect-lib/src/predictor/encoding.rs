//! Feature bundle to tensor encodings
//!
//! Versioned with the feature bundle schema (`session-features/v1`):
//! - Tabular: one row in the tree model's column order, scaled when a scaler
//!   was persisted
//! - Sequence: vocabulary ids of the most recent actions, left-padded

use super::ModelInput;
use crate::artifacts::{
    ActionVectorizer, ActionVocabulary, LabelEncoder, SequenceArtifacts, StandardScaler,
    TreeArtifacts, UserStats, OOV_ID, PAD_ID,
};
use crate::session::FeatureBundle;

/// Base session features, in default column order
pub const BASE_FEATURES: [&str; 8] = [
    "event_count",
    "unique_actions",
    "unique_resources",
    "session_duration_secs",
    "events_per_minute",
    "after_hours_ratio",
    "weekend_ratio",
    "failure_ratio",
];

/// Encoded role column
pub const ROLE_CODE: &str = "role_code";

/// Event count relative to the user's historical baseline
pub const USER_ACTIVITY_ZSCORE: &str = "user_activity_zscore";

/// Prefix of per-action count columns
pub const ACTION_PREFIX: &str = "action:";

/// Column order used when the tree model does not declare its features
pub fn default_tabular_columns(vectorizer: Option<&ActionVectorizer>) -> Vec<String> {
    let mut columns: Vec<String> = BASE_FEATURES.iter().map(|f| f.to_string()).collect();
    columns.push(ROLE_CODE.to_string());
    columns.push(USER_ACTIVITY_ZSCORE.to_string());
    if let Some(vectorizer) = vectorizer {
        columns.extend(
            vectorizer
                .tokens()
                .into_iter()
                .map(|token| format!("{ACTION_PREFIX}{token}")),
        );
    }
    columns
}

/// Flat-vector encoder for the tree model
pub struct TabularEncoder<'a> {
    columns: Vec<String>,
    scaler: Option<&'a StandardScaler>,
    labels: Option<&'a LabelEncoder>,
    user_stats: Option<&'a UserStats>,
}

impl<'a> TabularEncoder<'a> {
    pub fn new(tree: &'a TreeArtifacts) -> Self {
        Self {
            columns: tree.columns(),
            scaler: tree.scaler.as_ref(),
            labels: tree.label_encoder.as_ref(),
            user_stats: tree.user_stats.as_ref(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn encode(&self, bundle: &FeatureBundle) -> Result<ModelInput, String> {
        let mut values = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = self.value(column, bundle);
            if !value.is_finite() {
                return Err(format!("feature '{}' is not finite", column));
            }
            values.push(value as f32);
        }

        if let Some(scaler) = self.scaler {
            scaler.transform(&mut values)?;
        }
        Ok(ModelInput::row(values))
    }

    fn value(&self, column: &str, bundle: &FeatureBundle) -> f64 {
        if let Some(value) = bundle.tabular.get(column) {
            return *value;
        }
        match column {
            ROLE_CODE => bundle
                .role
                .as_deref()
                .and_then(|role| self.labels.and_then(|l| l.encode(role)))
                .map(|code| code as f64)
                .unwrap_or(-1.0),
            USER_ACTIVITY_ZSCORE => self
                .user_stats
                .map(|stats| stats.activity_zscore(&bundle.user_id, bundle.event_count()))
                .unwrap_or(0.0),
            other => other
                .strip_prefix(ACTION_PREFIX)
                .and_then(|token| bundle.action_counts.get(token))
                .map(|count| *count as f64)
                .unwrap_or(0.0),
        }
    }
}

/// Padded-sequence encoder for the sequence model
pub struct SequenceEncoder<'a> {
    max_len: usize,
    vocabulary: Option<&'a ActionVocabulary>,
}

impl<'a> SequenceEncoder<'a> {
    pub fn new(sequence: &'a SequenceArtifacts) -> Self {
        Self {
            max_len: sequence.max_sequence_length(),
            vocabulary: sequence.vocabulary.as_ref(),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn encode(&self, bundle: &FeatureBundle) -> Result<ModelInput, String> {
        if bundle.actions.is_empty() {
            return Err("session has no actions to encode".to_string());
        }

        let skip = bundle.actions.len().saturating_sub(self.max_len);
        let ids: Vec<u32> = bundle.actions[skip..]
            .iter()
            .map(|action| self.vocabulary.map(|v| v.id(action)).unwrap_or(OOV_ID))
            .collect();

        let mut values = vec![PAD_ID as f32; self.max_len - ids.len()];
        values.extend(ids.into_iter().map(|id| id as f32));
        Ok(ModelInput::row(values))
    }
}
