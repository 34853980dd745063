//! HTTP router integration tests.
//!
//! Drives the axum router in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use brickgate::config::ConnectionConfig;
use brickgate::db::{MockResult, MockWarehouseClient, Value, WarehouseClient};
use brickgate::server::Server;
use brickgate::Gateway;
use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};
use tower::ServiceExt;

fn router(client: MockWarehouseClient) -> Router {
    let client: Arc<dyn WarehouseClient> = Arc::new(client);
    let config = ConnectionConfig {
        catalog: Some("main".to_string()),
        max_rows: 0,
        ..Default::default()
    };
    Server::router(Gateway::new(client, config))
}

fn warehouse() -> MockWarehouseClient {
    MockWarehouseClient::new()
        .with_result(
            "SELECT * FROM main.my_schema.my_table",
            MockResult::new(&["col1", "col2"]).row(vec!["value1".into(), "value2".into()]),
        )
        .with_result(
            "SELECT id FROM main.s.t",
            MockResult::new(&["id"]).row(vec![Value::Int(1)]),
        )
        .with_result(
            "SHOW SCHEMAS IN `main`",
            MockResult::new(&["databaseName"]).row(vec!["sales".into()]),
        )
        .with_result(
            "SHOW TABLES IN `main`.`empty`",
            MockResult::new(&["database", "tableName", "isTemporary"]),
        )
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Json) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

#[tokio::test]
async fn test_health_ok() {
    let (status, body) = send(router(warehouse()), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_health_unavailable() {
    let client = MockWarehouseClient::new().with_ping_error("warehouse stopped");

    let (status, body) = send(router(client), get("/health")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("warehouse stopped"));
}

#[tokio::test]
async fn test_query_returns_frame() {
    let request = post(
        "/query",
        json!({"refId": "A", "queryText": "SELECT * FROM my_schema.my_table"}).to_string(),
    );

    let (status, body) = send(router(warehouse()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refId"], "A");
    assert_eq!(
        body["executedQueryString"],
        "SELECT * FROM main.my_schema.my_table"
    );
    assert_eq!(
        body["frames"][0]["columns"],
        json!([
            {"name": "col1", "values": ["value1"]},
            {"name": "col2", "values": ["value2"]}
        ])
    );
}

#[tokio::test]
async fn test_query_rejects_delete() {
    let request = post("/query", json!({"queryText": "DELETE FROM s.t"}).to_string());

    let (status, body) = send(router(warehouse()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("DELETE"));
}

#[tokio::test]
async fn test_query_malformed_json_is_bad_request() {
    let (status, body) = send(router(warehouse()), post("/query", "{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("json unmarshal"));
}

#[tokio::test]
async fn test_query_without_text_or_model_is_bad_request() {
    let (status, _) = send(router(warehouse()), post("/query", "{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_query_missing_time_column() {
    let request = post(
        "/query",
        json!({"queryText": "SELECT id FROM s.t", "format": "timeseries"}).to_string(),
    );

    let (status, body) = send(router(warehouse()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("time"));
}

#[tokio::test]
async fn test_query_remote_failure_is_500() {
    let request = post("/query", json!({"queryText": "SELECT x FROM s.unknown"}).to_string());

    let (status, body) = send(router(warehouse()), request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("Remote query failed"));
}

#[tokio::test]
async fn test_batch_query() {
    let request = post(
        "/query/batch",
        json!({"queries": [
            {"refId": "A", "queryText": "SELECT id FROM s.t"},
            {"refId": "B", "queryText": "DROP TABLE s.t"}
        ]})
        .to_string(),
    );

    let (status, body) = send(router(warehouse()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"]["A"]["status"], 200);
    assert_eq!(body["results"]["A"]["frames"][0]["columns"][0]["values"], json!(["1"]));
    assert_eq!(body["results"]["B"]["status"], 400);
    assert!(body["results"]["B"]["error"].is_string());
}

#[tokio::test]
async fn test_empty_batch_is_bad_request() {
    let (status, _) = send(
        router(warehouse()),
        post("/query/batch", json!({"queries": []}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_with_duplicate_ref_ids_is_bad_request() {
    let request = post(
        "/query/batch",
        json!({"queries": [
            {"queryText": "SELECT id FROM s.t"},
            {"refId": "A", "queryText": "SELECT * FROM my_schema.my_table"}
        ]})
        .to_string(),
    );

    let (status, body) = send(router(warehouse()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request: duplicate refId in batch: A");
}

#[tokio::test]
async fn test_resources() {
    let (status, body) = send(router(warehouse()), get("/resources/databases")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["sales"]));

    let (status, body) = send(router(warehouse()), get("/resources/tables?database=empty")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, body) = send(router(warehouse()), get("/resources/tables")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Schema is required");

    let (status, body) = send(router(warehouse()), get("/resources/views")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid endpoint");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (status, body) = send(router(warehouse()), get("/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid endpoint");
}
