//! Model registry and health facts
//!
//! Wraps one loaded [`ArtifactSet`] and answers which models are present,
//! what their metadata says and whether the required set is complete.

use crate::artifacts::ArtifactSet;
use crate::config::ModelConfig;
use crate::error::{DetectError, Result};
use crate::models::{ModelKind, ModelMetadata, ServiceState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Health snapshot of the model service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHealth {
    pub initialized: bool,
    pub state: ServiceState,
    /// Loaded artifact names, primary and auxiliary
    pub models_loaded: Vec<String>,
    /// Kinds with metadata available
    pub metadata_available: Vec<ModelKind>,
    pub cache_enabled: bool,
    /// Cache TTL in seconds
    pub cache_ttl: u64,
}

impl ModelHealth {
    /// Health of a service with nothing loaded
    pub fn empty(state: ServiceState, config: &ModelConfig) -> Self {
        Self {
            initialized: false,
            state,
            models_loaded: Vec::new(),
            metadata_available: Vec::new(),
            cache_enabled: config.cache_enabled,
            cache_ttl: config.cache_ttl,
        }
    }
}

/// Registry over one immutable artifact set
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    artifacts: Arc<ArtifactSet>,
}

impl ModelRegistry {
    pub fn new(artifacts: ArtifactSet) -> Self {
        Self {
            artifacts: Arc::new(artifacts),
        }
    }

    /// Fail with the missing kinds unless every `required` model is loaded
    pub fn validate(&self, required: &[ModelKind]) -> Result<()> {
        let loaded = self.artifacts.loaded_kinds();
        let missing: Vec<ModelKind> = required
            .iter()
            .filter(|kind| !loaded.contains(kind))
            .copied()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DetectError::MissingModels { missing })
        }
    }

    pub fn artifacts(&self) -> Arc<ArtifactSet> {
        Arc::clone(&self.artifacts)
    }

    /// Owned snapshot of all metadata
    pub fn info(&self) -> BTreeMap<ModelKind, ModelMetadata> {
        self.artifacts.metadata.clone()
    }

    pub fn metadata(&self, kind: ModelKind) -> Option<&ModelMetadata> {
        self.artifacts.metadata.get(&kind)
    }

    pub fn loaded_models(&self) -> Vec<String> {
        self.artifacts.artifact_names()
    }

    pub fn hybrid_threshold(&self) -> Option<f64> {
        self.artifacts.hybrid_threshold
    }

    pub fn health(&self, state: ServiceState, config: &ModelConfig) -> ModelHealth {
        ModelHealth {
            initialized: state == ServiceState::Ready,
            state,
            models_loaded: self.loaded_models(),
            metadata_available: self.artifacts.metadata.keys().copied().collect(),
            cache_enabled: config.cache_enabled,
            cache_ttl: config.cache_ttl,
        }
    }
}
