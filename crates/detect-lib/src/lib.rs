//! Insider threat detection library
//!
//! This crate provides the model-serving core:
//! - Artifact loading and validation for the tree and sequence models
//! - Session preprocessing and feature engineering
//! - Per-model ONNX inference and the weighted hybrid ensemble
//! - The model service lifecycle, health checks and observability

pub mod artifacts;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod registry;
pub mod service;
pub mod session;

pub use config::{EnsembleWeights, Settings};
pub use error::{DetectError, ErrorKind, Result};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use predictor::{ModelRuntime, TractRuntime};
pub use registry::ModelHealth;
pub use service::ModelService;
