//! Query pipeline integration tests.
//!
//! Runs requests through the gateway against the mock warehouse and checks
//! the statement sent to the warehouse together with the returned frame.

use std::sync::Arc;
use std::time::Duration;

use brickgate::config::ConnectionConfig;
use brickgate::db::{MockResult, MockWarehouseClient, Value, WarehouseClient};
use brickgate::query::{OutputShape, QueryModel, QueryRequest};
use brickgate::safety::StatementType;
use brickgate::{BridgeError, Gateway};
use pretty_assertions::assert_eq;

fn config(max_rows: u64) -> ConnectionConfig {
    ConnectionConfig {
        catalog: Some("my_catalog".to_string()),
        max_rows,
        timeout_secs: 5,
        ..Default::default()
    }
}

fn gateway(client: MockWarehouseClient, max_rows: u64) -> (Gateway, Arc<MockWarehouseClient>) {
    let client = Arc::new(client);
    let shared: Arc<dyn WarehouseClient> = client.clone();
    (Gateway::new(shared, config(max_rows)), client)
}

#[tokio::test]
async fn test_execute_query_end_to_end() {
    let (gateway, client) = gateway(
        MockWarehouseClient::new().with_result(
            "SELECT * FROM my_catalog.my_schema.my_table",
            MockResult::new(&["col1", "col2"]).row(vec!["value1".into(), "value2".into()]),
        ),
        0,
    );

    let outcome = gateway
        .execute_query(&QueryRequest::table("SELECT * FROM my_schema.my_table"))
        .await
        .unwrap();

    let frame = outcome.frame;
    assert_eq!(frame.column_names(), vec!["col1", "col2"]);
    assert_eq!(frame.column("col1").unwrap().values, vec!["value1"]);
    assert_eq!(frame.column("col2").unwrap().values, vec!["value2"]);
    assert_eq!(client.closed_cursors(), 1);
}

#[tokio::test]
async fn test_default_row_cap() {
    let (gateway, client) =
        gateway(MockWarehouseClient::new().with_fallback(MockResult::new(&["id"])), 10_000);

    gateway
        .execute_query(&QueryRequest::table("select id from sales.orders;"))
        .await
        .unwrap();

    assert_eq!(
        client.executed(),
        vec!["select id from my_catalog.sales.orders LIMIT 10000;".to_string()]
    );
}

#[tokio::test]
async fn test_caller_limit_is_kept() {
    let (gateway, client) =
        gateway(MockWarehouseClient::new().with_fallback(MockResult::new(&["id"])), 100);

    gateway
        .execute_query(&QueryRequest::table("SELECT id FROM sales.orders LIMIT 5000"))
        .await
        .unwrap();

    assert_eq!(
        client.executed(),
        vec!["SELECT id FROM my_catalog.sales.orders LIMIT 5000;".to_string()]
    );
}

#[tokio::test]
async fn test_mutating_statements_are_rejected() {
    let (gateway, client) =
        gateway(MockWarehouseClient::new().with_fallback(MockResult::new(&["id"])), 0);

    let cases = [
        ("DELETE FROM s.t", StatementType::Delete),
        ("UPDATE s.t SET a = 1", StatementType::Update),
        ("DROP TABLE s.t", StatementType::Drop),
        ("INSERT INTO s.t VALUES (1)", StatementType::Insert),
    ];

    for (sql, expected) in cases {
        let err = gateway
            .execute_query(&QueryRequest::table(sql))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
        match err {
            BridgeError::NotSelect(actual) => assert_eq!(actual, expected, "{sql}"),
            other => panic!("unexpected error for {sql}: {other:?}"),
        }
    }

    assert!(client.executed().is_empty());
}

#[tokio::test]
async fn test_dangerous_keyword_in_select() {
    let (gateway, client) =
        gateway(MockWarehouseClient::new().with_fallback(MockResult::new(&["id"])), 0);

    let err = gateway
        .execute_query(&QueryRequest::table("SELECT last_updated FROM s.t"))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::DangerousKeyword(ref k) if k == "UPDATE"));
    assert!(client.executed().is_empty());
}

#[tokio::test]
async fn test_timeseries_shape() {
    let (gateway, client) = gateway(
        MockWarehouseClient::new()
            .with_result(
                "SELECT id, value FROM my_catalog.s.t",
                MockResult::new(&["id", "value"]).row(vec![Value::Int(1), Value::Int(2)]),
            )
            .with_result(
                "SELECT event_timestamp, value FROM my_catalog.s.t",
                MockResult::new(&["event_timestamp", "value"])
                    .row(vec!["2024-01-01T00:00:00Z".into(), Value::Int(2)]),
            ),
        0,
    );

    let err = gateway
        .execute_query(&QueryRequest::new(
            "SELECT id, value FROM s.t",
            OutputShape::TimeSeries,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::MissingTimeColumn));

    let outcome = gateway
        .execute_query(&QueryRequest::new(
            "SELECT event_timestamp, value FROM s.t",
            OutputShape::TimeSeries,
        ))
        .await
        .unwrap();
    assert_eq!(outcome.frame.row_count(), 1);

    assert_eq!(client.closed_cursors(), 2);
}

#[tokio::test]
async fn test_null_cells_use_sentinel() {
    let (gateway, _) = gateway(
        MockWarehouseClient::new().with_fallback(
            MockResult::new(&["a", "b"])
                .row(vec![Value::Null, "x".into()])
                .row(vec!["y".into(), Value::Null]),
        ),
        0,
    );

    let outcome = gateway
        .execute_query(&QueryRequest::table("SELECT a, b FROM s.t"))
        .await
        .unwrap();

    assert_eq!(outcome.frame.columns[0].values, vec!["NULL", "y"]);
    assert_eq!(outcome.frame.columns[1].values, vec!["x", "NULL"]);
}

#[tokio::test]
async fn test_visual_model_goes_through_pipeline() {
    let (gateway, client) =
        gateway(MockWarehouseClient::new().with_fallback(MockResult::new(&["total"])), 50);

    let model: QueryModel = serde_json::from_value(serde_json::json!({
        "refId": "A",
        "database": "sales",
        "table": "orders",
        "fields": [{"column": "amount", "aggregation": "SUM", "alias": "total"}],
        "enableFilter": true,
        "filters": [{"column": "region", "operator": "=", "value": "eu"}]
    }))
    .unwrap();

    gateway.execute_model(&model).await.unwrap();

    assert_eq!(
        client.executed(),
        vec![
            "SELECT SUM(amount) AS total FROM my_catalog.sales.orders WHERE region = 'eu' LIMIT 50;"
                .to_string()
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_warehouse_times_out() {
    let (gateway, _) = gateway(
        MockWarehouseClient::new()
            .with_fallback(MockResult::new(&["id"]))
            .with_delay(Duration::from_secs(60)),
        0,
    );

    let err = gateway
        .execute_query(&QueryRequest::table("SELECT id FROM s.t"))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Timeout(_)));
    assert_eq!(err.status(), 500);
}

#[tokio::test]
async fn test_concurrent_queries_share_one_client() {
    let (gateway, client) = gateway(
        MockWarehouseClient::new()
            .with_fallback(MockResult::new(&["id"]).row(vec![Value::Int(7)])),
        0,
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .execute_query(&QueryRequest::table("SELECT id FROM s.t"))
                    .await
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.frame.columns[0].values, vec!["7"]);
    }

    assert_eq!(client.executed().len(), 8);
    assert_eq!(client.closed_cursors(), 8);
}
