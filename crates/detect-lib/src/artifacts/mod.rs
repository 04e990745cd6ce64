//! On-disk model artifacts
//!
//! This module provides:
//! - The fixed artifact filenames that make up the persisted layout
//! - Typed auxiliary artifacts (scaler, encoders, vocabularies, thresholds)
//! - The artifact store that loads one immutable [`ArtifactSet`] per directory

mod auxiliary;
mod store;

pub use auxiliary::{
    read_json, ActionVectorizer, ActionVocabulary, HybridThreshold, LabelEncoder,
    SequenceMetadata, StandardScaler, UserActivity, UserStats, DEFAULT_MAX_SEQUENCE_LENGTH,
    OOV_ID, PAD_ID,
};
pub use store::{ArtifactSet, ArtifactStore, SequenceArtifacts, TreeArtifacts};

/// Filenames of the persisted artifact layout
pub mod files {
    pub const TREE_MODEL: &str = "xgb_model_v4.onnx";
    pub const TREE_SCALER: &str = "xgb_scaler_v4.json";
    pub const TREE_LABEL_ENCODER: &str = "xgb_le_v4.json";
    pub const TREE_VECTORIZER: &str = "action_vect_v4.json";
    pub const TREE_USER_STATS: &str = "user_stats_v4.json";
    pub const SEQUENCE_MODEL: &str = "lstm_model.onnx";
    pub const SEQUENCE_VOCAB: &str = "action_vocab.json";
    pub const SEQUENCE_METADATA: &str = "lstm_metadata.json";
    pub const HYBRID_THRESHOLD: &str = "hybrid_threshold.json";
}

/// Names under which loaded artifacts are reported in health output
pub mod names {
    pub const TREE_MODEL: &str = "xgboost";
    pub const TREE_SCALER: &str = "xgb_scaler";
    pub const TREE_LABEL_ENCODER: &str = "xgb_le";
    pub const TREE_VECTORIZER: &str = "xgb_vect";
    pub const TREE_USER_STATS: &str = "xgb_user_stats";
    pub const SEQUENCE_MODEL: &str = "lstm";
    pub const SEQUENCE_VOCAB: &str = "lstm_vocab";
    pub const SEQUENCE_METADATA: &str = "lstm_metadata";
    pub const HYBRID_THRESHOLD: &str = "hybrid_threshold";
}
