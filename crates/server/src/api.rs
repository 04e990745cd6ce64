//! HTTP API for scoring, model inspection, health checks and metrics

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use detect_lib::{
    config::{ApiConfig, Settings},
    health::{components, HealthRegistry},
    DetectError, ErrorKind, InferenceResult, ModelKind, ModelService,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ModelService>,
    pub health_registry: HealthRegistry,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub async fn new(service: Arc<ModelService>, settings: Settings) -> Self {
        let health_registry = HealthRegistry::new();
        health_registry.register(components::API).await;
        Self {
            service,
            health_registry,
            settings: Arc::new(settings),
        }
    }
}

/// Error rendered as `{"error": {"message", "code", "status_code", "details"}}`
#[derive(Debug)]
pub enum ApiError {
    Detect(DetectError),
    InvalidModelType(String),
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        ApiError::Detect(err)
    }
}

/// HTTP status for an engine error
pub fn status_for(err: &DetectError) -> StatusCode {
    match err {
        DetectError::NotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DetectError::Prediction { .. } => match err.cause().kind() {
            ErrorKind::PreprocessingError | ErrorKind::FeatureExtractionError => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorKind::NotReadyError => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        DetectError::Preprocessing(_) | DetectError::FeatureExtraction(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(status: StatusCode, message: String, code: &str, details: Map<String, Value>) -> Value {
    json!({
        "error": {
            "message": message,
            "code": code,
            "status_code": status.as_u16(),
            "details": details,
        }
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Detect(err) => {
                let status = status_for(&err);
                if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
                    error!(error = %err, code = err.kind().code(), "Request failed");
                }
                (
                    status,
                    error_body(status, err.to_string(), err.kind().code(), err.details()),
                )
            }
            ApiError::InvalidModelType(message) => {
                let status = StatusCode::BAD_REQUEST;
                let mut details = Map::new();
                details.insert("allowed".into(), json!(["xgboost", "lstm", "hybrid"]));
                (status, error_body(status, message, "INVALID_MODEL_TYPE", details))
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Root endpoint with basic API information
async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": state.settings.app_name,
        "version": state.settings.version,
        "environment": state.settings.environment,
        "health_url": "/api/v1/health",
    }))
}

/// Health check - 200 once models are initialized, 503 otherwise
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state
        .health_registry
        .health(&state.service, &state.settings.version)
        .await;

    let status_code = if health.models.initialized {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Readiness check - returns 200 if ready, 503 if not ready
async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness(&state.service).await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Metadata of every loaded model
async fn models(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let service_state = state.service.state().await;
    if service_state != detect_lib::ServiceState::Ready {
        return Err(DetectError::NotReady {
            state: service_state,
        }
        .into());
    }
    Ok(Json(state.service.get_model_info().await))
}

#[derive(Debug, Deserialize)]
struct PredictParams {
    model_type: Option<String>,
}

/// Score one session; `model_type` defaults to hybrid
async fn predict(
    State(state): State<AppState>,
    Query(params): Query<PredictParams>,
    Json(session): Json<Value>,
) -> Result<Json<InferenceResult>, ApiError> {
    let mode = match params.model_type.as_deref() {
        Some(raw) => raw.parse::<ModelKind>().map_err(ApiError::InvalidModelType)?,
        None => ModelKind::Hybrid,
    };
    let result = state.service.predict(&session, mode).await?;
    Ok(Json(result))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/api/v1/health", get(health))
        .route("/api/v1/ready", get(ready))
        .route("/api/v1/models", get(models))
        .route("/api/v1/predict", post(predict));

    if state.settings.monitoring.enable_metrics {
        router = router.route("/metrics", get(metrics));
    }
    router.with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve(
    config: &ApiConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
