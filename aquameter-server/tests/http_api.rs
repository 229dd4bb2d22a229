//! End-to-end tests of the HTTP surface.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use aquameter::aggregate::AggregationEngine;
use aquameter::error::StoreError;
use aquameter::measurement::StatType;
use aquameter::point::{Point, Row};
use aquameter::query::Query;
use aquameter::resolution::Width;
use aquameter::store::{PointStore, Store};
use aquameter::task::{TaskManager, TaskRegistry};
use aquameter::time::{TimeRange, align_down};
use aquameter_server::{AppState, create_router};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> (Router, Arc<Store>) {
    let store = Arc::new(Store::in_memory("measurements"));
    let state = AppState::new(Arc::clone(&store), Duration::from_secs(5));
    (create_router(state), store)
}

fn app_over(store: Arc<dyn PointStore>, timeout: Duration) -> Router {
    let tasks = Arc::new(TaskManager::new(TaskRegistry::in_memory()));
    create_router(AppState::with_tasks(store, "measurements", tasks, timeout))
}

/// A store whose every call fails.
struct BrokenStore;

impl PointStore for BrokenStore {
    fn write_points(&self, _points: &[Point]) -> aquameter::Result<usize> {
        Err(StoreError::Unavailable {
            reason: "disk full".to_string(),
        }
        .into())
    }

    fn query(&self, _query: &Query) -> aquameter::Result<Vec<Row>> {
        Err(StoreError::LockPoisoned.into())
    }

    fn tag_values(
        &self,
        _series: &str,
        _tag: &str,
        _range: TimeRange,
    ) -> aquameter::Result<BTreeSet<String>> {
        Err(StoreError::LockPoisoned.into())
    }
}

/// A store that answers reads only after a delay.
struct SlowStore {
    inner: Store,
    delay: Duration,
}

impl PointStore for SlowStore {
    fn write_points(&self, points: &[Point]) -> aquameter::Result<usize> {
        self.inner.write_points(points)
    }

    fn query(&self, query: &Query) -> aquameter::Result<Vec<Row>> {
        std::thread::sleep(self.delay);
        self.inner.query(query)
    }

    fn tag_values(
        &self,
        series: &str,
        tag: &str,
        range: TimeRange,
    ) -> aquameter::Result<BTreeSet<String>> {
        std::thread::sleep(self.delay);
        self.inner.tag_values(series, tag, range)
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, body: &Value) -> (StatusCode, Value) {
    let request = Request::post("/measurements")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn reading(sensor: &str, at: DateTime<Utc>, temperature: f64, conductivity: f64) -> Value {
    json!({
        "sensor_id": sensor,
        "timestamp": rfc3339(at),
        "temperature": temperature,
        "conductivity": conductivity,
    })
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_create_measurement() {
    let (app, _) = app();
    let (status, body) = post(&app, &reading("s1", Utc::now(), 21.5, 1200.0)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"message": "Success", "sensor_id": "s1"}));
}

#[tokio::test]
async fn test_create_reports_missing_fields() {
    let (app, _) = app();
    let (status, body) = post(
        &app,
        &json!({"sensor_id": "s1", "timestamp": "2024-01-01T00:00:00Z", "temperature": 20.0}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");
    assert_eq!(body["missing"], json!(["conductivity"]));
}

#[tokio::test]
async fn test_create_rejects_bad_values() {
    let (app, _) = app();

    let mut body = reading("s1", Utc::now(), 0.0, 1.0);
    body["temperature"] = json!("hot");
    let (status, resp) = post(&app, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"], "temperature must be a number");

    let mut body = reading("s1", Utc::now(), 0.0, 1.0);
    body["timestamp"] = json!("yesterday");
    let (status, _) = post(&app, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::post("/measurements")
        .header("content-type", "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_raw_round_trip() {
    let (app, _) = app();
    let now = Utc::now();
    for minutes in [30, 20, 10] {
        let at = now - TimeDelta::minutes(minutes);
        let (status, _) = post(&app, &reading("s1", at, 20.0, 1000.0)).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    post(&app, &reading("s2", now, 5.0, 50.0)).await;

    let (status, body) = get(&app, "/measurements/s1?start=-1h&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sensor_id"], "s1");
    assert_eq!(body["count"], 2);
    let rows = body["measurements"].as_array().unwrap();
    // Newest first.
    let first: DateTime<Utc> = rows[0]["timestamp"].as_str().unwrap().parse().unwrap();
    let second: DateTime<Utc> = rows[1]["timestamp"].as_str().unwrap().parse().unwrap();
    assert!(first > second);
    assert!(rows.iter().all(|r| r["sensor_id"] == "s1"));

    let (_, body) = get(&app, "/measurements/s1?start=-15m").await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_raw_rejects_bad_parameters() {
    let (app, _) = app();

    let (status, body) = get(&app, "/measurements/s1?limit=ten").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid limit parameter");

    let (status, _) = get(&app, "/measurements/s1?start=soon").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_sensors() {
    let (app, _) = app();
    let (_, body) = get(&app, "/sensors").await;
    assert_eq!(body, json!({"count": 0, "sensors": []}));

    let now = Utc::now();
    for sensor in ["s2", "s1", "s2"] {
        post(&app, &reading(sensor, now - TimeDelta::minutes(5), 1.0, 1.0)).await;
    }
    let (status, body) = get(&app, "/sensors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"count": 2, "sensors": ["s1", "s2"]}));
}

#[tokio::test]
async fn test_aggregated_and_statistics() {
    let (app, store) = app();
    let now = Utc::now();
    let window = align_down(now - TimeDelta::minutes(10), TimeDelta::minutes(1));
    post(&app, &reading("s1", window + TimeDelta::seconds(10), 20.0, 1000.0)).await;
    post(&app, &reading("s1", window + TimeDelta::seconds(40), 22.0, 1100.0)).await;

    let engine = AggregationEngine::new(store.as_ref(), "measurements");
    let summary = engine
        .aggregate_range(
            Width::OneMinute,
            &StatType::ALL,
            TimeRange::new(now - TimeDelta::hours(1), now),
            now,
        )
        .unwrap();
    assert_eq!(summary.windows, 1);

    let (status, body) = get(&app, "/measurements/s1/aggregated?start=-1h").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["window"], "1m");
    assert_eq!(body["count"], 1);
    let point = &body["measurements"][0];
    assert_eq!(point["temperature"], 21.0);
    assert_eq!(point["conductivity"], 1050.0);
    assert_eq!(point["window"], "1m");

    let (status, body) = get(&app, "/measurements/s1/statistics?start=-1h").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let stats = &body["statistics"][0];
    assert_eq!(stats["temperature"]["min"], 20.0);
    assert_eq!(stats["temperature"]["max"], 22.0);
    assert_eq!(stats["temperature"]["count"], 2);
    assert_eq!(stats["conductivity"]["mean"], 1050.0);

    // The default start reaches back days, which reads five-minute windows.
    let (_, body) = get(&app, "/measurements/s1/aggregated").await;
    assert_eq!(body["window"], "5m");
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_unrecognized_window_is_empty() {
    let (app, _) = app();
    let (status, body) = get(&app, "/measurements/s1/aggregated?window=15m").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["window"], "15m");
    assert_eq!(body["count"], 0);

    let (status, body) = get(&app, "/measurements/s1/statistics?window=15m").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statistics"], json!([]));
}

#[tokio::test]
async fn test_unknown_route() {
    let (app, _) = app();
    let (status, body) = get(&app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "not found"}));
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let app = app_over(Arc::new(BrokenStore), Duration::from_secs(5));

    let (status, body) = post(&app, &reading("s1", Utc::now(), 20.0, 1000.0)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
    assert!(body["details"].as_str().unwrap().contains("disk full"));
    assert!(body.get("missing").is_none());

    let (status, body) = get(&app, "/measurements/s1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");

    let (status, _) = get(&app, "/sensors").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // Validation still runs before the store is touched.
    let (status, _) = post(&app, &json!({"sensor_id": "s1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_slow_store_call_times_out() {
    let store = SlowStore {
        inner: Store::in_memory("measurements"),
        delay: Duration::from_millis(300),
    };
    let app = app_over(Arc::new(store), Duration::from_millis(10));

    let (status, body) = get(&app, "/sensors").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
    assert!(body["details"].as_str().unwrap().contains("timed out"));

    let (status, _) = get(&app, "/measurements/s1/statistics").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_file_store_serves_data_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store");
    let at = Utc::now() - TimeDelta::minutes(3);

    {
        let store = Arc::new(Store::open_dir(&path, "measurements").unwrap());
        let app = create_router(AppState::new(store, Duration::from_secs(5)));
        let (status, _) = post(&app, &reading("s1", at, 19.5, 980.0)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let store = Arc::new(Store::open_dir(&path, "measurements").unwrap());
    let app = create_router(AppState::new(store, Duration::from_secs(5)));
    let (status, body) = get(&app, "/measurements/s1?start=-1h").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["measurements"][0]["temperature"], 19.5);
    assert_eq!(body["measurements"][0]["conductivity"], 980.0);
}
