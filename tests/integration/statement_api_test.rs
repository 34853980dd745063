//! Statement-execution client tests against an in-process fake warehouse.
//!
//! The fake serves the statements endpoints with axum on a loopback port and
//! counts every request, so submit, poll, chunk, retry and cancel traffic can
//! be asserted without a live workspace.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use brickgate::config::ConnectionConfig;
use brickgate::db::{HttpWarehouseClient, RowCursor, WarehouseClient};
use brickgate::query::{OutputShape, QueryExecutor, QueryRequest};
use brickgate::BridgeError;
use pretty_assertions::assert_eq;
use serde_json::{json, Value as JsonValue};
use tokio::net::TcpListener;

const STATEMENT_ID: &str = "01ef-stmt";

#[derive(Clone, Copy)]
enum Script {
    /// Never leaves PENDING/RUNNING.
    Running,
    /// Succeeds with three chunks of one row each.
    Chunked,
    /// Ends in FAILED with an error message.
    Failed,
}

struct FakeWarehouse {
    script: Script,
    unavailable: AtomicUsize,
    submits: AtomicUsize,
    polls: AtomicUsize,
    chunks: AtomicUsize,
    cancels: AtomicUsize,
}

impl FakeWarehouse {
    fn new(script: Script) -> Self {
        Self {
            script,
            unavailable: AtomicUsize::new(0),
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            chunks: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        }
    }

    /// Answers the first `count` submits with 503.
    fn unavailable_for(self, count: usize) -> Self {
        self.unavailable.store(count, Ordering::SeqCst);
        self
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn chunk_link(index: usize) -> String {
    format!("/api/2.0/sql/statements/{STATEMENT_ID}/result/chunks/{index}")
}

fn state(state: &str) -> JsonValue {
    json!({"statement_id": STATEMENT_ID, "status": {"state": state}})
}

async fn submit(State(fake): State<Arc<FakeWarehouse>>, Json(body): Json<JsonValue>) -> Response {
    fake.submits.fetch_add(1, Ordering::SeqCst);
    assert_eq!(body["warehouse_id"], "wh1");
    assert_eq!(body["on_wait_timeout"], "CONTINUE");

    let remaining = fake.unavailable.load(Ordering::SeqCst);
    if remaining > 0 {
        fake.unavailable.store(remaining - 1, Ordering::SeqCst);
        return (StatusCode::SERVICE_UNAVAILABLE, "warehouse is starting").into_response();
    }

    let body = match fake.script {
        Script::Running => state("PENDING"),
        Script::Failed => json!({
            "statement_id": STATEMENT_ID,
            "status": {"state": "FAILED", "error": {
                "error_code": "BAD_REQUEST",
                "message": "[TABLE_OR_VIEW_NOT_FOUND] The table `s`.`missing` cannot be found."
            }}
        }),
        Script::Chunked => json!({
            "statement_id": STATEMENT_ID,
            "status": {"state": "SUCCEEDED"},
            "manifest": {"schema": {"columns": [
                {"name": "value", "type_name": "INT", "position": 1},
                {"name": "time", "type_name": "STRING", "position": 0}
            ]}},
            "result": {
                "data_array": [["t0", "1"]],
                "next_chunk_internal_link": chunk_link(1)
            }
        }),
    };
    Json(body).into_response()
}

async fn poll(State(fake): State<Arc<FakeWarehouse>>, Path(id): Path<String>) -> Json<JsonValue> {
    fake.polls.fetch_add(1, Ordering::SeqCst);
    assert_eq!(id, STATEMENT_ID);
    Json(state("RUNNING"))
}

async fn chunk(
    State(fake): State<Arc<FakeWarehouse>>,
    Path((_, index)): Path<(String, usize)>,
) -> Json<JsonValue> {
    fake.chunks.fetch_add(1, Ordering::SeqCst);
    let body = match index {
        1 => json!({"data_array": [["t1", "2"]], "next_chunk_internal_link": chunk_link(2)}),
        _ => json!({"data_array": [["t2", null]]}),
    };
    Json(body)
}

async fn cancel(State(fake): State<Arc<FakeWarehouse>>, Path(id): Path<String>) -> Json<JsonValue> {
    fake.cancels.fetch_add(1, Ordering::SeqCst);
    assert_eq!(id, STATEMENT_ID);
    Json(json!({}))
}

/// Serves the fake on a loopback port and returns the workspace host.
async fn serve(fake: Arc<FakeWarehouse>) -> String {
    let router = Router::new()
        .route("/api/2.0/sql/statements", post(submit))
        .route("/api/2.0/sql/statements/:id", get(poll))
        .route("/api/2.0/sql/statements/:id/cancel", post(cancel))
        .route("/api/2.0/sql/statements/:id/result/chunks/:index", get(chunk))
        .with_state(fake);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(host: String) -> ConnectionConfig {
    ConnectionConfig {
        host: Some(host),
        http_path: Some("/sql/1.0/warehouses/wh1".to_string()),
        catalog: Some("main".to_string()),
        token: Some("dapi-test".to_string()),
        max_rows: 0,
        timeout_secs: 1,
        retries: 0,
        pause_secs: 0,
        retry_timeout_secs: 10,
    }
}

async fn setup(fake: FakeWarehouse) -> (Arc<FakeWarehouse>, ConnectionConfig) {
    let fake = Arc::new(fake);
    let host = serve(fake.clone()).await;
    (fake, config(host))
}

/// Waits for spawned requests to reach the fake.
async fn eventually(counter: &AtomicUsize, expected: usize) {
    for _ in 0..50 {
        if FakeWarehouse::count(counter) >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(FakeWarehouse::count(counter), expected);
}

#[tokio::test]
async fn test_chunks_are_followed_to_the_end() {
    let (fake, config) = setup(FakeWarehouse::new(Script::Chunked)).await;
    let client = HttpWarehouseClient::new(&config).unwrap();

    let outcome = QueryExecutor::new(&client, &config)
        .execute(&QueryRequest::new(
            "SELECT time, value FROM s.t",
            OutputShape::TimeSeries,
        ))
        .await
        .unwrap();

    let frame = outcome.frame;
    assert_eq!(frame.column_names(), vec!["time", "value"]);
    assert_eq!(frame.columns[0].values, vec!["t0", "t1", "t2"]);
    assert_eq!(frame.columns[1].values, vec!["1", "2", "NULL"]);
    assert_eq!(FakeWarehouse::count(&fake.chunks), 2);
    assert_eq!(FakeWarehouse::count(&fake.cancels), 0);
}

#[tokio::test]
async fn test_failed_statement_reports_message() {
    let (fake, config) = setup(FakeWarehouse::new(Script::Failed)).await;
    let client = HttpWarehouseClient::new(&config).unwrap();

    let err = client
        .execute("SELECT * FROM main.s.missing", config.statement_timeout())
        .await
        .err()
        .unwrap();

    assert!(matches!(err, BridgeError::RemoteQuery(ref m) if m.contains("TABLE_OR_VIEW_NOT_FOUND")));
    assert_eq!(err.status(), 500);
    assert_eq!(FakeWarehouse::count(&fake.cancels), 0);
}

#[tokio::test]
async fn test_unavailable_warehouse_is_retried() {
    let (fake, mut config) = setup(FakeWarehouse::new(Script::Chunked).unavailable_for(2)).await;
    config.retries = 2;
    let client = HttpWarehouseClient::new(&config).unwrap();

    let mut cursor = client
        .execute("SELECT time, value FROM main.s.t", config.statement_timeout())
        .await
        .unwrap();
    cursor.close().await.unwrap();

    assert_eq!(FakeWarehouse::count(&fake.submits), 3);
}

#[tokio::test]
async fn test_retries_stop_after_budget_of_attempts() {
    let (fake, mut config) = setup(FakeWarehouse::new(Script::Chunked).unavailable_for(5)).await;
    config.retries = 1;
    let client = HttpWarehouseClient::new(&config).unwrap();

    let err = client
        .execute("SELECT time, value FROM main.s.t", config.statement_timeout())
        .await
        .err()
        .unwrap();

    assert!(matches!(err, BridgeError::RemoteQuery(ref m) if m.contains("warehouse is starting")));
    assert_eq!(FakeWarehouse::count(&fake.submits), 2);
}

#[tokio::test]
async fn test_connect_errors_are_retried_then_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = config(format!("http://{addr}"));
    config.retries = 2;
    let client = HttpWarehouseClient::new(&config).unwrap();

    let err = client
        .execute("SELECT 1", config.statement_timeout())
        .await
        .err()
        .unwrap();

    assert!(matches!(err, BridgeError::Connection(_)));
}

#[tokio::test]
async fn test_close_with_unread_chunks_cancels_once() {
    let (fake, config) = setup(FakeWarehouse::new(Script::Chunked)).await;
    let client = HttpWarehouseClient::new(&config).unwrap();

    let mut cursor = client
        .execute("SELECT time, value FROM main.s.t", config.statement_timeout())
        .await
        .unwrap();
    assert!(cursor.next_row().await.unwrap().is_some());

    cursor.close().await.unwrap();
    cursor.close().await.unwrap();

    assert_eq!(FakeWarehouse::count(&fake.chunks), 0);
    assert_eq!(FakeWarehouse::count(&fake.cancels), 1);
}

#[tokio::test]
async fn test_client_deadline_cancels_statement() {
    let (fake, config) = setup(FakeWarehouse::new(Script::Running)).await;
    let client = HttpWarehouseClient::new(&config).unwrap();

    let err = client
        .execute("SELECT * FROM main.s.t", config.statement_timeout())
        .await
        .err()
        .unwrap();

    assert!(matches!(err, BridgeError::Timeout(d) if d == Duration::from_secs(1)));
    assert!(FakeWarehouse::count(&fake.polls) >= 1);
    assert_eq!(FakeWarehouse::count(&fake.cancels), 1);
}

#[tokio::test]
async fn test_pipeline_deadline_cancels_statement() {
    let (fake, config) = setup(FakeWarehouse::new(Script::Running)).await;
    let client = HttpWarehouseClient::new(&config).unwrap();

    let err = QueryExecutor::new(&client, &config)
        .execute(&QueryRequest::table("SELECT * FROM s.t"))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Timeout(d) if d == Duration::from_secs(1)));
    assert_eq!(FakeWarehouse::count(&fake.submits), 1);
    eventually(&fake.cancels, 1).await;
}
