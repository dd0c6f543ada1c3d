//! HTTP API for the report trigger, ingestion, queries, health and metrics

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use monitor_lib::{
    alarm::AlarmEvaluator,
    health::{components, ComponentStatus, HealthRegistry},
    ingestion::IngestionProcessor,
    notification::{QueueBatch, StorageEventNotification},
    observability::MonitorMetrics,
    report::Reporter,
    storage::ObjectStore,
    EventRouter, MetricsAggregator, MonitorError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
    pub source_bucket: String,
    pub objects: Arc<dyn ObjectStore>,
    pub router: Arc<EventRouter>,
    pub ingestion: Arc<IngestionProcessor>,
    pub aggregator: Arc<MetricsAggregator>,
    pub evaluator: Arc<AlarmEvaluator>,
    pub reporter: Arc<Reporter>,
}

/// Error returned by API handlers
pub struct ApiError(MonitorError);

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MonitorError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            MonitorError::Parse(_) => StatusCode::BAD_REQUEST,
            MonitorError::EmptyStore { .. } | MonitorError::NoData { .. } => StatusCode::NOT_FOUND,
            MonitorError::Render(_) | MonitorError::ConfigurationMissing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Response of the report trigger
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub status_code: u16,
    pub body: String,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Render the size chart and upload it to the plot bucket
async fn trigger_report(State(state): State<Arc<AppState>>) -> ApiResult<Json<TriggerResponse>> {
    let result = state.reporter.build_report(&state.source_bucket).await;
    state
        .health_registry
        .observe(components::REPORTER, &result)
        .await;

    let outcome = result?;
    Ok(Json(TriggerResponse {
        status_code: StatusCode::OK.as_u16(),
        body: outcome.message(),
    }))
}

/// Process one queue batch synchronously
async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<QueueBatch>,
) -> ApiResult<impl IntoResponse> {
    let result = state.ingestion.handle_batch(&batch.records).await;
    state
        .health_registry
        .observe(components::INGESTION, &result)
        .await;

    Ok(Json(result?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub delivered: usize,
}

/// Publish a raw storage event to every subscription
async fn publish_notification(
    State(state): State<Arc<AppState>>,
    Json(notification): Json<StorageEventNotification>,
) -> impl IntoResponse {
    let delivered = state.router.publish(&notification);
    if delivered == 0 {
        state
            .health_registry
            .set_degraded(components::ROUTER, "no live subscriptions")
            .await;
    }

    (StatusCode::ACCEPTED, Json(PublishResponse { delivered }))
}

/// Evaluate the growth alarm now
async fn evaluate_alarm(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let result = state.evaluator.evaluate(&state.source_bucket).await;
    state
        .health_registry
        .observe(components::EVALUATOR, &result)
        .await;

    Ok(Json(result?))
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    #[serde(default = "default_since")]
    pub since: u64,
}

fn default_since() -> u64 {
    10
}

async fn recent_snapshots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotQuery>,
) -> ApiResult<impl IntoResponse> {
    let snapshots = state
        .aggregator
        .query_recent(&state.source_bucket, query.since)
        .await?;
    Ok(Json(snapshots))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MaxSizeResponse {
    pub source_name: String,
    pub max_size: u64,
}

async fn max_size(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let max_size = state.aggregator.query_max(&state.source_bucket).await?;
    Ok(Json(MaxSizeResponse {
        source_name: state.source_bucket.clone(),
        max_size,
    }))
}

/// Store an object in the source bucket
async fn put_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    state
        .objects
        .put(&state.source_bucket, &key, body.to_vec(), content_type)
        .await?;
    Ok(StatusCode::CREATED)
}

/// Delete an object from the source bucket
async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    state.objects.delete(&state.source_bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/plot", post(trigger_report))
        .route("/events", post(ingest_batch))
        .route("/notifications", post(publish_notification))
        .route("/alarm", post(evaluate_alarm))
        .route("/snapshots", get(recent_snapshots))
        .route("/snapshots/max", get(max_size))
        .route("/objects/*key", put(put_object).delete(delete_object))
        .with_state(state)
}

/// Start the API server and run until shutdown is signalled
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
