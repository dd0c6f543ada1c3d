//! Integration tests for the monitor API endpoints

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bucket_monitor::{
    api::{create_router, AppState},
    config::{MonitorConfig, ObjectBackend},
    pipeline::{self, Backends},
};
use monitor_lib::{
    health::{components, HealthRegistry},
    models::ObjectEntry,
    notification::{QueueBatch, QueueRecord, StorageEventNotification},
    observability::{MonitorMetrics, StructuredLogger},
    report::PLOT_KEY,
    storage::{async_trait, ChangeNotifier, MemoryObjectStore, ObjectStore},
    timeseries::{FileTimeSeriesStore, MemoryTimeSeriesStore, TimeSeriesStore},
    EventRouter, MonitorError,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower::ServiceExt;

fn test_config() -> MonitorConfig {
    MonitorConfig {
        source_bucket: "uploads".into(),
        plot_bucket: "plots".into(),
        api_port: 0,
        object_backend: ObjectBackend::Memory,
        data_dir: None,
        alarm_threshold_bytes: 15,
        alarm_window_secs: 10,
        report_window_secs: 10,
        backend_timeout_secs: 5,
        aws_region: "us-east-1".into(),
        s3_endpoint_url: None,
        s3_force_path_style: false,
    }
}

struct TestApp {
    app: Router,
    state: Arc<AppState>,
    objects: MemoryObjectStore,
    artifacts: MemoryObjectStore,
    // Holds the subscriptions open
    _pipeline: pipeline::Pipeline,
}

async fn setup_with(
    objects: MemoryObjectStore,
    artifacts: Arc<dyn ObjectStore>,
    series: Arc<dyn TimeSeriesStore>,
    router: Arc<EventRouter>,
) -> (Router, pipeline::Pipeline) {
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let pipeline = pipeline::assemble(
        &test_config(),
        router,
        Backends {
            objects: Arc::new(objects),
            artifacts,
            series,
        },
        health_registry,
        MonitorMetrics::new(),
        StructuredLogger::new("test"),
    );
    (create_router(pipeline.state.clone()), pipeline)
}

async fn setup_test_app() -> TestApp {
    let objects = MemoryObjectStore::new();
    let artifacts = MemoryObjectStore::new();
    let (app, pipeline) = setup_with(
        objects.clone(),
        Arc::new(artifacts.clone()),
        Arc::new(MemoryTimeSeriesStore::new()),
        Arc::new(EventRouter::new()),
    )
    .await;

    TestApp {
        app,
        state: pipeline.state.clone(),
        objects,
        artifacts,
        _pipeline: pipeline,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn batch(records: Vec<QueueRecord>) -> Value {
    serde_json::to_value(QueueBatch { records }).unwrap()
}

fn created(id: &str, key: &str, size: u64) -> QueueRecord {
    QueueRecord::wrap(id, &StorageEventNotification::created("uploads", key, size)).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let t = setup_test_app().await;

    let (status, health) = send(&t.app, "GET", "/healthz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"].get(components::REPORTER).is_some());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let t = setup_test_app().await;
    t.state
        .health_registry
        .set_degraded(components::AGGREGATOR, "Slow listing")
        .await;

    let (status, health) = send(&t.app, "GET", "/healthz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let t = setup_test_app().await;
    t.state
        .health_registry
        .set_unhealthy(components::ROUTER, "Closed")
        .await;

    let (status, health) = send(&t.app, "GET", "/healthz", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_readiness_flag() {
    let t = setup_test_app().await;

    let (status, _) = send(&t.app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    t.state.health_registry.set_ready(true).await;
    let (status, readiness) = send(&t.app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_monitor_metrics() {
    let t = setup_test_app().await;
    send(&t.app, "POST", "/plot", None).await;

    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("bucket_monitor_reports_rendered_total"));
}

#[tokio::test]
async fn test_plot_trigger_uploads_chart() {
    let t = setup_test_app().await;

    let (status, response) = send(&t.app, "POST", "/plot", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["statusCode"], 200);
    assert!(response["body"].as_str().unwrap().contains(PLOT_KEY));
    let (png, content_type) = t.artifacts.get("plots", PLOT_KEY).unwrap();
    assert_eq!(content_type, "image/png");
    assert_eq!(&png[1..4], b"PNG");
}

#[tokio::test]
async fn test_event_batch_skips_malformed_records() {
    let t = setup_test_app().await;
    for (key, size) in [("a.txt", 19usize), ("b.txt", 28), ("c.txt", 2)] {
        t.objects.put("uploads", key, vec![0; size], "text/plain").await.unwrap();
    }

    let mut records = vec![
        created("m-1", "a.txt", 19),
        created("m-2", "b.txt", 28),
        created("m-3", "c.txt", 2),
    ];
    records.push(QueueRecord {
        message_id: "m-4".into(),
        body: "not json".into(),
    });

    let (status, report) = send(&t.app, "POST", "/events", Some(batch(records))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["received"], 4);
    assert_eq!(report["processed"], 3);
    assert_eq!(report["failed"][0]["message_id"], "m-4");

    let (_, max) = send(&t.app, "GET", "/snapshots/max", None).await;
    assert_eq!(max["max_size"], 49);
    assert_eq!(max["source_name"], "uploads");

    let (status, snapshots) = send(&t.app, "GET", "/snapshots?since=60", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshots.as_array().unwrap().len(), 3);

    let (status, snapshots) =
        send(&t.app, "GET", "/snapshots?since=18446744073709551615", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshots.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_alarm_evicts_largest_object() {
    let t = setup_test_app().await;
    t.objects.put("uploads", "assignment1.txt", vec![0; 19], "text/plain").await.unwrap();
    t.objects.put("uploads", "assignment2.txt", vec![0; 28], "text/plain").await.unwrap();

    let records = vec![
        created("m-1", "assignment1.txt", 19),
        created("m-2", "assignment2.txt", 28),
    ];
    send(&t.app, "POST", "/events", Some(batch(records))).await;

    let (status, evaluation) = send(&t.app, "POST", "/alarm", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(evaluation["breached"], true);
    assert_eq!(evaluation["window_sum"], 47);
    assert_eq!(evaluation["eviction"]["result"], "evicted");
    assert_eq!(evaluation["eviction"]["key"], "assignment2.txt");
    assert_eq!(evaluation["fired"], true);
    assert_eq!(t.objects.len("uploads"), 1);
}

#[tokio::test]
async fn test_repeated_alarm_requests_evict_once() {
    let t = setup_test_app().await;
    for (key, size) in [("a.txt", 19usize), ("b.txt", 19), ("c.txt", 19)] {
        t.objects.put("uploads", key, vec![0; size], "text/plain").await.unwrap();
    }
    let records = vec![created("m-1", "a.txt", 19), created("m-2", "b.txt", 19)];
    send(&t.app, "POST", "/events", Some(batch(records))).await;

    let (_, first) = send(&t.app, "POST", "/alarm", None).await;
    assert_eq!(first["fired"], true);

    for _ in 0..3 {
        let (status, evaluation) = send(&t.app, "POST", "/alarm", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(evaluation["breached"], true);
        assert_eq!(evaluation["fired"], false);
        assert!(evaluation.get("eviction").is_none());
    }
    assert_eq!(t.objects.len("uploads"), 2);
}

#[tokio::test]
async fn test_alarm_without_deltas_does_not_breach() {
    let t = setup_test_app().await;

    let (status, evaluation) = send(&t.app, "POST", "/alarm", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(evaluation["breached"], false);
    assert!(evaluation.get("eviction").is_none());
}

#[tokio::test]
async fn test_notifications_fan_out_to_both_subscriptions() {
    let t = setup_test_app().await;
    let notification = serde_json::to_value(StorageEventNotification::created("uploads", "a", 3)).unwrap();

    let (status, response) = send(&t.app, "POST", "/notifications", Some(notification)).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(response["delivered"], 2);
}

#[tokio::test]
async fn test_malformed_notification_is_rejected() {
    let t = setup_test_app().await;

    let (status, _) = send(&t.app, "POST", "/notifications", Some(json!({"Records": "nope"}))).await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_uploads_drive_the_pipeline_end_to_end() {
    let router = Arc::new(EventRouter::new());
    let notifier: Arc<dyn ChangeNotifier> = router.clone();
    let objects = MemoryObjectStore::new().with_notifier(notifier);
    let (app, mut pipeline) = setup_with(
        objects.clone(),
        Arc::new(MemoryObjectStore::new()),
        Arc::new(MemoryTimeSeriesStore::new()),
        router,
    )
    .await;

    let (shutdown_tx, _) = broadcast::channel(1);
    let tasks = pipeline.spawn_consumers(&test_config(), &shutdown_tx);

    for (key, size) in [("a.txt", 19usize), ("b.txt", 28)] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/objects/{}", key))
                    .header("content-type", "text/plain")
                    .body(Body::from(vec![b'x'; size]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let mut max = Value::Null;
    for _ in 0..200 {
        let (_, body) = send(&app, "GET", "/snapshots/max", None).await;
        max = body;
        if max["max_size"] == 47 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(max["max_size"], 47);

    let (status, _) = send(&app, "DELETE", "/objects/a.txt", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(objects.len("uploads"), 1);

    shutdown_tx.send(()).unwrap();
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn test_report_persists_through_file_series() {
    let dir = tempfile::TempDir::new().unwrap();
    let series = Arc::new(FileTimeSeriesStore::open(dir.path()).await.unwrap());
    let objects = MemoryObjectStore::new();
    objects.put("uploads", "a.txt", vec![0; 5], "text/plain").await.unwrap();
    let (app, _pipeline) = setup_with(
        objects,
        Arc::new(MemoryObjectStore::new()),
        series,
        Arc::new(EventRouter::new()),
    )
    .await;

    send(&app, "POST", "/events", Some(batch(vec![created("m-1", "a.txt", 5)]))).await;

    let reopened = FileTimeSeriesStore::open(dir.path()).await.unwrap();
    let snapshots = reopened.scan_all("uploads").await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].total_size, 5);
}

struct UnavailableStore;

#[async_trait]
impl ObjectStore for UnavailableStore {
    async fn list(&self, _source_name: &str) -> monitor_lib::Result<Vec<ObjectEntry>> {
        Err(MonitorError::backend("object store", "connection refused"))
    }

    async fn delete(&self, _source_name: &str, _key: &str) -> monitor_lib::Result<()> {
        Err(MonitorError::backend("object store", "connection refused"))
    }

    async fn put(
        &self,
        _source_name: &str,
        _key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> monitor_lib::Result<()> {
        Err(MonitorError::backend("artifact store", "connection refused"))
    }
}

#[tokio::test]
async fn test_backend_failure_returns_503_and_degrades() {
    let (app, pipeline) = setup_with(
        MemoryObjectStore::new(),
        Arc::new(UnavailableStore),
        Arc::new(MemoryTimeSeriesStore::new()),
        Arc::new(EventRouter::new()),
    )
    .await;

    let (status, body) = send(&app, "POST", "/plot", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("artifact store"));

    let health = pipeline.state.health_registry.health().await;
    assert_eq!(
        health.components[components::REPORTER].status,
        monitor_lib::ComponentStatus::Degraded
    );
}
