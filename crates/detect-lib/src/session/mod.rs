//! Session collaborators
//!
//! Raw session payloads pass through two collaborators before inference:
//! - [`Preprocessor`] normalizes the payload into a [`CanonicalSession`]
//! - [`FeatureEngineer`] derives a [`FeatureBundle`] carrying both the
//!   tabular values and the ordered action sequence
//!
//! Both are traits so the service can be built with alternative
//! implementations; [`SessionPreprocessor`] and [`SessionFeatureEngineer`]
//! are the defaults.

mod features;
mod preprocess;

pub use features::SessionFeatureEngineer;
pub use preprocess::SessionPreprocessor;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use async_trait::async_trait;

/// Version of the feature bundle layout and its tensor encodings
pub const FEATURE_SCHEMA_VERSION: &str = "session-features/v1";

/// One normalized session event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    /// Trimmed, lower-cased action token
    pub action: String,
    pub resource: Option<String>,
    pub success: bool,
}

/// Preprocessor output: validated session with chronologically sorted events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSession {
    pub user_id: String,
    pub session_id: String,
    pub role: Option<String>,
    pub request_id: Option<String>,
    pub events: Vec<SessionEvent>,
}

/// Named features derived from one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub schema_version: String,
    pub user_id: String,
    pub session_id: String,
    pub role: Option<String>,
    pub request_id: Option<String>,
    /// Base tabular features by name
    pub tabular: BTreeMap<String, f64>,
    /// Occurrences of each action token
    pub action_counts: BTreeMap<String, u64>,
    /// Action tokens in chronological order
    pub actions: Vec<String>,
}

impl FeatureBundle {
    pub fn event_count(&self) -> f64 {
        self.tabular
            .get("event_count")
            .copied()
            .unwrap_or(self.actions.len() as f64)
    }
}

/// Normalizes raw session payloads
#[async_trait]
pub trait Preprocessor: Send + Sync {
    /// Fails with a preprocessing error on malformed input
    async fn preprocess_session(&self, raw: &Value) -> Result<CanonicalSession>;
}

/// Derives model features from a canonical session
#[async_trait]
pub trait FeatureEngineer: Send + Sync {
    /// Fails with a feature extraction error
    async fn extract_features(&self, session: &CanonicalSession) -> Result<FeatureBundle>;
}
