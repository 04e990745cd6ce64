//! Health check infrastructure for the detection service
//!
//! Tracks component health and derives liveness/readiness reports from the
//! model service lifecycle.

use crate::models::ServiceState;
use crate::registry::ModelHealth;
use crate::service::ModelService;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }

    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub models: ModelHealth,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Compute overall status from component statuses
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const MODEL_SERVICE: &str = "model_service";
    pub const API: &str = "api";
}

/// Health registry for tracking component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(BTreeMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Update component health status
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Refresh the model service component from its lifecycle state
    pub async fn observe_service(&self, service: &ModelService) -> ModelHealth {
        let models = service.get_model_health().await;
        let health = match models.state {
            ServiceState::Ready => ComponentHealth::healthy(),
            ServiceState::Initializing => ComponentHealth::degraded("Models are loading"),
            ServiceState::Uninitialized => ComponentHealth::unhealthy("Models not loaded"),
            ServiceState::Failed => ComponentHealth::unhealthy(
                service
                    .last_error()
                    .await
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Initialization failed".to_string()),
            ),
        };
        self.update(components::MODEL_SERVICE, health).await;
        self.set_ready(models.initialized).await;
        models
    }

    /// Full health report for `service`
    pub async fn health(&self, service: &ModelService, version: &str) -> HealthResponse {
        let models = self.observe_service(service).await;
        let components = self.components.read().await.clone();
        HealthResponse {
            status: HealthResponse::compute_status(&components),
            version: version.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            models,
            components,
        }
    }

    /// Get readiness response
    pub async fn readiness(&self, service: &ModelService) -> ReadinessResponse {
        let models = self.observe_service(service).await;
        let ready = *self.ready.read().await;
        let unhealthy = self
            .components
            .read()
            .await
            .values()
            .any(|c| c.status == ComponentStatus::Unhealthy);

        if !ready {
            ReadinessResponse {
                ready: false,
                reason: Some(format!("Model service is {}", models.state)),
            }
        } else if unhealthy {
            ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::files;
    use crate::config::ModelConfig;
    use crate::predictor::testing::FixedRuntime;
    use tempfile::TempDir;

    fn service(with_sequence: bool) -> (ModelService, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(files::TREE_MODEL), "0.7").unwrap();
        if with_sequence {
            std::fs::write(dir.path().join(files::SEQUENCE_MODEL), "0.3").unwrap();
        }
        let config = ModelConfig {
            model_dir: dir.path().to_path_buf(),
            ..ModelConfig::default()
        };
        let service = ModelService::new(config, Arc::new(FixedRuntime::default())).unwrap();
        (service, dir)
    }

    #[test]
    fn test_compute_status() {
        let mut components = BTreeMap::new();
        assert_eq!(HealthResponse::compute_status(&components), ComponentStatus::Healthy);

        components.insert("a".to_string(), ComponentHealth::degraded("slow"));
        assert_eq!(HealthResponse::compute_status(&components), ComponentStatus::Degraded);

        components.insert("b".to_string(), ComponentHealth::unhealthy("down"));
        assert_eq!(HealthResponse::compute_status(&components), ComponentStatus::Unhealthy);
        assert!(!ComponentStatus::Unhealthy.is_operational());
    }

    #[tokio::test]
    async fn test_not_ready_before_initialize() {
        let (service, _dir) = service(true);
        let registry = HealthRegistry::new();

        let readiness = registry.readiness(&service).await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Model service is uninitialized"));

        let health = registry.health(&service, "0.1.0").await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(!health.models.initialized);
    }

    #[tokio::test]
    async fn test_ready_after_initialize() {
        let (service, _dir) = service(true);
        service.initialize().await.unwrap();
        let registry = HealthRegistry::new();
        registry.register(components::API).await;

        assert!(registry.readiness(&service).await.ready);
        let health = registry.health(&service, "0.1.0").await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), 2);

        let body = serde_json::to_value(&health).unwrap();
        assert_eq!(body["initialized"], serde_json::json!(true));
        assert_eq!(body["status"], serde_json::json!("healthy"));
    }

    #[tokio::test]
    async fn test_failed_initialization_reported() {
        let (service, _dir) = service(false);
        assert!(service.initialize().await.is_err());
        let registry = HealthRegistry::new();

        let health = registry.health(&service, "0.1.0").await;
        let component = &health.components[components::MODEL_SERVICE];
        assert_eq!(component.status, ComponentStatus::Unhealthy);
        assert!(component.message.as_deref().unwrap_or_default().contains("lstm"));
    }
}
