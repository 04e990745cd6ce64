//! Model service lifecycle
//!
//! [`ModelService`] is the single entry point the API layer calls. It owns
//! the loaded models and moves through
//! `uninitialized -> initializing -> ready | failed`, back to
//! `uninitialized` on cleanup.
//!
//! Concurrency:
//! - `initialize` is single-flight: callers that queue behind an in-flight
//!   attempt return its outcome instead of loading again
//! - `predict` holds a read guard on the lifecycle for its whole pipeline
//! - `cleanup` takes the write guard, so it waits for in-flight predictions

use crate::artifacts::ArtifactStore;
use crate::config::{EnsembleWeights, ModelConfig};
use crate::error::{DetectError, Result};
use crate::models::{InferenceResult, ModelKind, ModelMetadata, ServiceState};
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::predictor::{EnsembleCombiner, InferenceEngine, ModelRuntime};
use crate::registry::{ModelHealth, ModelRegistry};
use crate::session::{
    FeatureEngineer, Preprocessor, SessionFeatureEngineer, SessionPreprocessor,
    FEATURE_SCHEMA_VERSION,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, info};


/// Everything a ready service needs to serve predictions
struct ReadyModels {
    registry: ModelRegistry,
    engine: InferenceEngine,
    combiner: EnsembleCombiner,
}

enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready(Arc<ReadyModels>),
    Failed(DetectError),
}

impl Lifecycle {
    fn state(&self) -> ServiceState {
        match self {
            Lifecycle::Uninitialized => ServiceState::Uninitialized,
            Lifecycle::Initializing => ServiceState::Initializing,
            Lifecycle::Ready(_) => ServiceState::Ready,
            Lifecycle::Failed(_) => ServiceState::Failed,
        }
    }
}

/// Loads, validates and serves the detection models
pub struct ModelService {
    config: ModelConfig,
    weights: EnsembleWeights,
    store: ArtifactStore,
    preprocessor: Arc<dyn Preprocessor>,
    engineer: Arc<dyn FeatureEngineer>,
    workers: Arc<Semaphore>,
    lifecycle: RwLock<Lifecycle>,
    init_lock: Mutex<()>,
    /// Completed initialization attempts
    attempts: AtomicU64,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
}

impl ModelService {
    /// Service with the default session collaborators
    pub fn new(config: ModelConfig, runtime: Arc<dyn ModelRuntime>) -> Result<Self> {
        Self::with_collaborators(
            config,
            runtime,
            Arc::new(SessionPreprocessor::new()),
            Arc::new(SessionFeatureEngineer::new()),
        )
    }

    pub fn with_collaborators(
        config: ModelConfig,
        runtime: Arc<dyn ModelRuntime>,
        preprocessor: Arc<dyn Preprocessor>,
        engineer: Arc<dyn FeatureEngineer>,
    ) -> Result<Self> {
        config.validate()?;
        let weights = config.ensemble_weights()?;
        let workers = Arc::new(Semaphore::new(config.inference_workers));

        Ok(Self {
            weights,
            store: ArtifactStore::new(runtime),
            preprocessor,
            engineer,
            workers,
            lifecycle: RwLock::new(Lifecycle::Uninitialized),
            init_lock: Mutex::new(()),
            attempts: AtomicU64::new(0),
            metrics: ServiceMetrics::new(),
            logger: StructuredLogger::new("model-service"),
            config,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub async fn state(&self) -> ServiceState {
        self.lifecycle.read().await.state()
    }

    /// Load and validate all models; a no-op once ready
    ///
    /// A call made after a failed attempt retries the load.
    pub async fn initialize(&self) -> Result<()> {
        let observed = self.attempts.load(Ordering::SeqCst);
        let _guard = self.init_lock.lock().await;

        if self.attempts.load(Ordering::SeqCst) != observed {
            // An attempt completed while this caller was queued
            match &*self.lifecycle.read().await {
                Lifecycle::Ready(_) => return Ok(()),
                Lifecycle::Failed(e) => return Err(e.clone()),
                _ => {}
            }
        }
        if matches!(&*self.lifecycle.read().await, Lifecycle::Ready(_)) {
            debug!("Model service already initialized");
            return Ok(());
        }

        *self.lifecycle.write().await = Lifecycle::Initializing;
        info!(model_dir = %self.config.model_dir.display(), "Initializing model service");
        let start = Instant::now();
        let loaded = self.load().await;

        let mut lifecycle = self.lifecycle.write().await;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match loaded {
            Ok(ready) => {
                let kinds = ready.registry.artifacts().loaded_kinds();
                self.metrics.set_models_loaded(kinds.len() as i64);
                self.logger
                    .log_initialized(&kinds, start.elapsed().as_secs_f64());
                *lifecycle = Lifecycle::Ready(Arc::new(ready));
                Ok(())
            }
            Err(cause) => {
                let err = DetectError::initialization(cause);
                self.metrics.inc_initialization_failures();
                self.metrics.set_models_loaded(0);
                self.logger
                    .log_initialization_failed(err.cause().kind().code(), &err.to_string());
                *lifecycle = Lifecycle::Failed(err.clone());
                Err(err)
            }
        }
    }

    async fn load(&self) -> Result<ReadyModels> {
        let dir = self.config.model_dir.clone();
        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| DetectError::artifact(&dir, "worker pool closed"))?;

        let store = self.store.clone();
        let load_dir = dir.clone();
        let set = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            store.load(&load_dir)
        })
        .await
        .map_err(|e| DetectError::artifact(&dir, format!("artifact loading task failed: {}", e)))??;

        let registry = ModelRegistry::new(set);
        registry.validate(&ModelKind::REQUIRED)?;

        let threshold = registry.hybrid_threshold().unwrap_or(self.config.threshold);
        let mut combiner = EnsembleCombiner::new(self.weights, threshold);
        if let Some(meta) = registry.metadata(ModelKind::Hybrid) {
            combiner = combiner.with_identity(meta.name.clone(), meta.version.clone());
        }
        let engine = InferenceEngine::new(registry.artifacts(), Arc::clone(&self.workers));

        info!(
            hybrid_threshold = threshold,
            xgb_weight = self.weights.tree(),
            lstm_weight = self.weights.sequence(),
            "Models validated"
        );
        Ok(ReadyModels {
            registry,
            engine,
            combiner,
        })
    }

    /// Score one raw session with the model(s) selected by `mode`
    pub async fn predict(&self, session: &Value, mode: ModelKind) -> Result<InferenceResult> {
        let lifecycle = self.lifecycle.read().await;
        let ready = match &*lifecycle {
            Lifecycle::Ready(ready) => Arc::clone(ready),
            other => {
                return Err(DetectError::NotReady {
                    state: other.state(),
                })
            }
        };

        let start = Instant::now();
        let outcome = self.run_pipeline(&ready, session, mode).await;
        drop(lifecycle);

        match outcome {
            Ok((mut result, context)) => {
                result.inference_time = start.elapsed().as_secs_f64();
                result
                    .metadata
                    .insert("feature_schema".to_string(), json!(FEATURE_SCHEMA_VERSION));

                self.metrics.inc_predictions(mode, result.prediction);
                self.logger.log_inference(
                    &result.model_name,
                    result.inference_time,
                    context.input_size,
                    context.request_id.as_deref(),
                );
                if result.prediction == 1 {
                    self.logger.log_threat_detected(
                        &context.user_id,
                        &context.session_id,
                        result.probability,
                        mode.as_str(),
                    );
                }
                Ok(result)
            }
            Err(cause) => {
                let code = cause.kind().code();
                self.metrics.inc_prediction_errors(code);
                self.logger
                    .log_prediction_failed(mode.as_str(), code, &cause.to_string());
                Err(DetectError::prediction(cause))
            }
        }
    }

    async fn run_pipeline(
        &self,
        ready: &ReadyModels,
        session: &Value,
        mode: ModelKind,
    ) -> Result<(InferenceResult, PredictionContext)> {
        let canonical = self.preprocessor.preprocess_session(session).await?;
        let bundle = self.engineer.extract_features(&canonical).await?;

        let (result, input_size) = match mode {
            ModelKind::TreeEnsemble | ModelKind::Sequence => {
                let score = ready.engine.run(mode, &bundle).await?;
                let metadata = ready
                    .registry
                    .metadata(mode)
                    .ok_or_else(|| DetectError::inference(mode, "model metadata not available"))?;
                let input_size = score.input_size;
                (score.into_result(metadata, self.config.threshold), input_size)
            }
            ModelKind::Hybrid => {
                let (tree, sequence) = tokio::try_join!(
                    ready.engine.run(ModelKind::TreeEnsemble, &bundle),
                    ready.engine.run(ModelKind::Sequence, &bundle),
                )?;
                let input_size = tree.input_size + sequence.input_size;
                (ready.combiner.combine(&tree, &sequence), input_size)
            }
        };

        Ok((
            result,
            PredictionContext {
                user_id: bundle.user_id,
                session_id: bundle.session_id,
                request_id: bundle.request_id,
                input_size,
            },
        ))
    }

    /// Metadata of every loaded model, empty unless ready
    pub async fn get_model_info(&self) -> BTreeMap<ModelKind, ModelMetadata> {
        match &*self.lifecycle.read().await {
            Lifecycle::Ready(ready) => ready.registry.info(),
            _ => BTreeMap::new(),
        }
    }

    pub async fn get_model_health(&self) -> ModelHealth {
        let lifecycle = self.lifecycle.read().await;
        match &*lifecycle {
            Lifecycle::Ready(ready) => ready.registry.health(ServiceState::Ready, &self.config),
            other => ModelHealth::empty(other.state(), &self.config),
        }
    }

    /// Error of the last failed initialization, if the service is failed
    pub async fn last_error(&self) -> Option<DetectError> {
        match &*self.lifecycle.read().await {
            Lifecycle::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Release all loaded models; safe to call in any state
    pub async fn cleanup(&self) {
        let _guard = self.init_lock.lock().await;
        let mut lifecycle = self.lifecycle.write().await;
        let previous = lifecycle.state();
        *lifecycle = Lifecycle::Uninitialized;
        self.metrics.set_models_loaded(0);
        debug!(previous_state = %previous, "Model service reset");
        self.logger.log_cleanup();
    }
}

/// Request facts carried from the pipeline to logging
struct PredictionContext {
    user_id: String,
    session_id: String,
    request_id: Option<String>,
    input_size: usize,
}
