//! HTTP surface of the gateway.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{BridgeError, Result};
use crate::query::{QueryModel, ResultFrame};
use crate::service::{BatchResponse, Gateway, HealthStatus};

/// Response body of a single query.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub ref_id: String,
    pub frames: Vec<ResultFrame>,
    /// The statement as sent to the warehouse.
    pub executed_query_string: String,
    pub elapsed_ms: u128,
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    #[serde(default)]
    queries: Vec<QueryModel>,
}

pub struct Server {
    gateway: Gateway,
    listen: String,
}

impl Server {
    pub fn new(gateway: Gateway, listen: impl Into<String>) -> Self {
        Self {
            gateway,
            listen: listen.into(),
        }
    }

    /// Builds the router; exposed for in-process tests.
    pub fn router(gateway: Gateway) -> Router {
        Router::new()
            .route("/health", get(Self::health))
            .route("/query", post(Self::query))
            .route("/query/batch", post(Self::batch))
            .route("/resources/*path", get(Self::resource))
            .fallback(Self::fallback)
            .with_state(gateway)
            .layer(TraceLayer::new_for_http())
    }

    /// Serves until ctrl-c, then releases the warehouse client.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen).await?;
        let addr = listener.local_addr()?;
        info!(%addr, catalog = %self.gateway.config().catalog_name(), "brickgate listening");

        axum::serve(listener, Self::router(self.gateway.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.gateway.shutdown().await?;
        info!("brickgate stopped");
        Ok(())
    }

    async fn health(State(gateway): State<Gateway>) -> (StatusCode, Json<HealthStatus>) {
        let health = gateway.health_check().await;
        let status = if health.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(health))
    }

    async fn query(State(gateway): State<Gateway>, body: Bytes) -> Result<Json<QueryResponse>> {
        let model: QueryModel = parse_body(&body)?;
        let outcome = gateway.execute_model(&model).await?;

        Ok(Json(QueryResponse {
            ref_id: model.ref_id().to_string(),
            frames: vec![outcome.frame],
            executed_query_string: outcome.statement.into_text(),
            elapsed_ms: outcome.execution_time.as_millis(),
        }))
    }

    async fn batch(State(gateway): State<Gateway>, body: Bytes) -> Result<Json<BatchResponse>> {
        let request: BatchRequest = parse_body(&body)?;
        Ok(Json(gateway.execute_batch(&request.queries).await?))
    }

    async fn resource(
        State(gateway): State<Gateway>,
        Path(path): Path<String>,
        RawQuery(query): RawQuery,
    ) -> Result<Json<Vec<String>>> {
        let names = gateway.handle_resource(&path, query.as_deref()).await?;
        Ok(Json(names))
    }

    async fn fallback() -> BridgeError {
        BridgeError::not_found("Invalid endpoint")
    }
}

/// Decodes a JSON body, reporting malformed input as a client error.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| BridgeError::invalid_request(format!("json unmarshal: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
