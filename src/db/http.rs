//! Warehouse client over the SQL statement-execution REST API.
//!
//! Statements are submitted to `/api/2.0/sql/statements`, polled until they
//! leave the `PENDING`/`RUNNING` states, and read back as inline
//! `JSON_ARRAY` chunks.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::{ColumnInfo, Row, RowCursor, Value, WarehouseClient};
use crate::config::ConnectionConfig;
use crate::error::{BridgeError, Result};

/// Statements endpoint, relative to the workspace host.
const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";

/// Delay between status polls of a running statement.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Bounds accepted by the API for the synchronous `wait_timeout`.
const MIN_WAIT_SECS: u64 = 5;
const MAX_WAIT_SECS: u64 = 50;

/// Retry behavior for transient HTTP failures.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    retries: u32,
    pause: Duration,
    budget: Duration,
}

/// Warehouse client backed by the statement-execution API.
#[derive(Clone)]
pub struct HttpWarehouseClient {
    client: Client,
    base_url: Url,
    warehouse_id: String,
    catalog: String,
    token: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for HttpWarehouseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpWarehouseClient")
            .field("base_url", &self.base_url.as_str())
            .field("warehouse_id", &self.warehouse_id)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl HttpWarehouseClient {
    /// Creates a client for the configured workspace and warehouse.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url()?;
        let warehouse_id = config.warehouse_id()?;
        let token = config
            .token
            .clone()
            .ok_or_else(|| BridgeError::config("An access token is required"))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BridgeError::connection(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            warehouse_id,
            catalog: config.catalog.clone().unwrap_or_default(),
            token,
            retry: RetryPolicy {
                retries: config.retries,
                pause: config.retry_pause(),
                budget: config.retry_timeout(),
            },
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BridgeError::internal(format!("Invalid request path '{path}': {e}")))
    }

    fn statement_url(&self, statement_id: &str) -> Result<Url> {
        self.url(&format!("{STATEMENTS_PATH}/{statement_id}"))
    }

    /// Sends a request, retrying transient failures, and returns the body.
    async fn send_with_retry<F>(&self, build: F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = build().bearer_auth(&self.token).send().await;

            let (error, is_retryable) = match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(|e| {
                        BridgeError::remote(format!("Failed to read response: {e}"))
                    })?;

                    if status.is_success() {
                        return Ok(body);
                    }

                    parse_error(status, &body)
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    (
                        BridgeError::connection(format!("Request to warehouse failed: {e}")),
                        retryable,
                    )
                }
            };

            let out_of_budget = started.elapsed() + self.retry.pause > self.retry.budget;
            if !is_retryable || attempt > self.retry.retries || out_of_budget {
                return Err(error);
            }

            warn!(
                "Warehouse request failed (attempt {}), retrying in {:?}: {}",
                attempt, self.retry.pause, error
            );
            tokio::time::sleep(self.retry.pause).await;
        }
    }

    async fn submit(&self, sql: &str, timeout: Duration) -> Result<StatementResponse> {
        let request = StatementRequest {
            statement: sql,
            warehouse_id: &self.warehouse_id,
            catalog: &self.catalog,
            wait_timeout: format!("{}s", timeout.as_secs().clamp(MIN_WAIT_SECS, MAX_WAIT_SECS)),
            on_wait_timeout: "CONTINUE",
            disposition: "INLINE",
            format: "JSON_ARRAY",
        };
        let url = self.url(STATEMENTS_PATH)?;

        let body = self
            .send_with_retry(|| self.client.post(url.clone()).json(&request))
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn poll(&self, statement_id: &str) -> Result<StatementResponse> {
        let url = self.statement_url(statement_id)?;
        let body = self
            .send_with_retry(|| self.client.get(url.clone()))
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_chunk(&self, link: &str) -> Result<ResultChunk> {
        let url = self.url(link)?;
        let body = self
            .send_with_retry(|| self.client.get(url.clone()))
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn cancel(&self, statement_id: &str) -> Result<()> {
        let url = self.url(&format!("{STATEMENTS_PATH}/{statement_id}/cancel"))?;
        self.send_with_retry(|| self.client.post(url.clone()))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl WarehouseClient for HttpWarehouseClient {
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<Box<dyn RowCursor>> {
        let deadline = Instant::now() + timeout;
        let mut response = self.submit(sql, timeout).await?;
        debug!(
            "Statement {} submitted, state {:?}",
            response.statement_id, response.status.state
        );

        // Cancels the statement if this future is dropped while it runs.
        let mut in_flight = InFlight::new(self, &response.statement_id);

        while response.status.state.is_in_progress() {
            let now = Instant::now();
            if now >= deadline {
                in_flight.disarm();
                if let Err(e) = self.cancel(&response.statement_id).await {
                    warn!("Failed to cancel statement {}: {}", response.statement_id, e);
                }
                return Err(BridgeError::Timeout(timeout));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
            response = self.poll(&response.statement_id).await?;
        }
        in_flight.disarm();

        if response.status.state != StatementState::Succeeded {
            let message = response
                .status
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("statement ended in state {:?}", response.status.state));
            return Err(BridgeError::remote(message));
        }

        let manifest = response
            .manifest
            .ok_or_else(|| BridgeError::remote("Result manifest missing from response"))?;
        let mut columns: Vec<ManifestColumn> = manifest.schema.columns;
        columns.sort_by_key(|c| c.position);

        let (rows, next_link) = match response.result {
            Some(chunk) => (chunk.data_array.unwrap_or_default(), chunk.next_chunk_internal_link),
            None => (Vec::new(), None),
        };

        Ok(Box::new(HttpCursor {
            client: self.clone(),
            statement_id: response.statement_id,
            columns: columns
                .into_iter()
                .map(|c| ColumnInfo::new(c.name, c.type_name.unwrap_or_default()))
                .collect(),
            buffer: rows.into(),
            next_link,
            closed: false,
        }))
    }

    async fn ping(&self, timeout: Duration) -> Result<()> {
        let mut cursor = self.execute("SELECT 1", timeout).await?;
        cursor.close().await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Submitted statement that has not reached a final state yet.
///
/// Dropping it while armed spawns a cancel request, so a caller that gives
/// up on [`HttpWarehouseClient::execute`] does not leave the statement
/// running on the warehouse.
struct InFlight {
    client: HttpWarehouseClient,
    statement_id: Option<String>,
}

impl InFlight {
    fn new(client: &HttpWarehouseClient, statement_id: &str) -> Self {
        Self {
            client: client.clone(),
            statement_id: Some(statement_id.to_string()),
        }
    }

    fn disarm(&mut self) {
        self.statement_id = None;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let Some(statement_id) = self.statement_id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to cancel abandoned statement {}", statement_id);
            return;
        };

        debug!("Cancelling abandoned statement {}", statement_id);
        let client = self.client.clone();
        handle.spawn(async move {
            if let Err(e) = client.cancel(&statement_id).await {
                warn!("Failed to cancel statement {}: {}", statement_id, e);
            }
        });
    }
}

/// Cursor over the inline chunks of a finished statement.
struct HttpCursor {
    client: HttpWarehouseClient,
    statement_id: String,
    columns: Vec<ColumnInfo>,
    buffer: VecDeque<Vec<Option<String>>>,
    next_link: Option<String>,
    closed: bool,
}

#[async_trait]
impl RowCursor for HttpCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        while self.buffer.is_empty() {
            let Some(link) = self.next_link.take() else {
                return Ok(None);
            };
            let chunk = self
                .client
                .fetch_chunk(&link)
                .await
                .map_err(|e| BridgeError::scan(format!("failed to fetch result chunk: {e}")))?;
            self.buffer = chunk.data_array.unwrap_or_default().into();
            self.next_link = chunk.next_chunk_internal_link;
        }

        let Some(cells) = self.buffer.pop_front() else {
            return Ok(None);
        };

        if cells.len() != self.columns.len() {
            return Err(BridgeError::scan(format!(
                "row has {} values, expected {}",
                cells.len(),
                self.columns.len()
            )));
        }

        Ok(Some(
            self.columns
                .iter()
                .zip(cells.iter())
                .map(|(column, cell)| Value::from_text(&column.data_type, cell.as_deref()))
                .collect(),
        ))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.clear();

        // Unread chunks keep server-side results alive until cancelled.
        if self.next_link.take().is_some() {
            self.client.cancel(&self.statement_id).await?;
        }
        Ok(())
    }
}

/// Maps an error response to (error, is_retryable).
fn parse_error(status: StatusCode, body: &str) -> (BridgeError, bool) {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return (
            BridgeError::connection("Authentication failed. Check the access token."),
            false,
        );
    }

    let is_retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

    let message = serde_json::from_str::<ApiError>(body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));

    (BridgeError::remote(message), is_retryable)
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    warehouse_id: &'a str,
    catalog: &'a str,
    wait_timeout: String,
    on_wait_timeout: &'static str,
    disposition: &'static str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    statement_id: String,
    status: StatementStatus,
    #[serde(default)]
    manifest: Option<Manifest>,
    #[serde(default)]
    result: Option<ResultChunk>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: StatementState,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Closed,
}

impl StatementState {
    fn is_in_progress(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    schema: ManifestSchema,
}

#[derive(Debug, Deserialize)]
struct ManifestSchema {
    #[serde(default)]
    columns: Vec<ManifestColumn>,
}

#[derive(Debug, Deserialize)]
struct ManifestColumn {
    name: String,
    #[serde(default)]
    type_name: Option<String>,
    #[serde(default)]
    position: usize,
}

#[derive(Debug, Deserialize)]
struct ResultChunk {
    #[serde(default)]
    data_array: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    next_chunk_internal_link: Option<String>,
}
