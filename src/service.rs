//! Request routing between callers and the warehouse.
//!
//! [`Gateway`] owns the shared warehouse client and connection settings and
//! is cloned into every request handler. It dispatches query requests to
//! the [`QueryExecutor`] and resource requests to the [`NamespaceResolver`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::db::{within_deadline, NamespaceResolver, WarehouseClient};
use crate::error::{BridgeError, Result};
use crate::query::{QueryExecutor, QueryModel, QueryOutcome, QueryRequest, ResultFrame};

/// Shared entry point for query, discovery and health requests.
#[derive(Clone)]
pub struct Gateway {
    client: Arc<dyn WarehouseClient>,
    config: Arc<ConnectionConfig>,
}

/// Result of a health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Error,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Ok
    }
}

/// Per-query entry of a batch response.
#[derive(Debug, Clone, Serialize)]
pub struct DataResponse {
    pub status: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<ResultFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DataResponse {
    fn from_result(result: Result<QueryOutcome>) -> Self {
        match result {
            Ok(outcome) => Self {
                status: 200,
                frames: vec![outcome.frame],
                error: None,
            },
            Err(e) => Self {
                status: e.status(),
                frames: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Results of a batch, keyed by reference id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResponse {
    pub results: BTreeMap<String, DataResponse>,
}

impl Gateway {
    /// Creates a gateway over an already connected client.
    pub fn new(client: Arc<dyn WarehouseClient>, config: ConnectionConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    /// Connection settings shared by all requests.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Runs one query through the adaptation pipeline.
    pub async fn execute_query(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        QueryExecutor::new(self.client.as_ref(), &self.config)
            .execute(request)
            .await
    }

    /// Resolves an editor query model and runs it.
    pub async fn execute_model(&self, model: &QueryModel) -> Result<QueryOutcome> {
        let request = model.to_request()?;
        self.execute_query(&request).await
    }

    /// Runs independent queries concurrently; each reports its own status.
    ///
    /// The batch itself is rejected when it is empty or when two queries
    /// share a reference id, since results are keyed by it.
    pub async fn execute_batch(&self, models: &[QueryModel]) -> Result<BatchResponse> {
        if models.is_empty() {
            return Err(BridgeError::invalid_request("batch contains no queries"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = models.iter().map(QueryModel::ref_id).find(|id| !seen.insert(*id)) {
            return Err(BridgeError::invalid_request(format!(
                "duplicate refId in batch: {dup}"
            )));
        }

        let outcomes = join_all(models.iter().map(|model| async move {
            let result = self.execute_model(model).await;
            if let Err(e) = &result {
                warn!("Query {} failed: {}", model.ref_id(), e);
            }
            (model.ref_id().to_string(), DataResponse::from_result(result))
        }))
        .await;

        Ok(BatchResponse {
            results: outcomes.into_iter().collect(),
        })
    }

    /// Checks connectivity without side effects, bounded by the statement
    /// timeout.
    pub async fn health_check(&self) -> HealthStatus {
        let timeout = self.config.statement_timeout();
        let ping = self.client.ping(timeout);
        match within_deadline(Instant::now() + timeout, timeout, ping).await {
            Ok(()) => HealthStatus {
                status: HealthState::Ok,
                message: "Warehouse connection is working".to_string(),
            },
            Err(e) => HealthStatus {
                status: HealthState::Error,
                message: format!("Connection failed: {e}"),
            },
        }
    }

    /// Lists schemas; `catalog` defaults to the configured one.
    pub async fn list_schemas(&self, catalog: Option<&str>) -> Result<Vec<String>> {
        self.resolver().list_schemas(self.catalog(catalog)).await
    }

    /// Lists tables. An empty list is reported as [`BridgeError::NotFound`].
    pub async fn list_tables(&self, catalog: Option<&str>, schema: &str) -> Result<Vec<String>> {
        let catalog = self.catalog(catalog);
        let tables = self.resolver().list_tables(catalog, schema).await?;
        if tables.is_empty() {
            return Err(BridgeError::not_found(format!(
                "No tables found in {catalog}.{schema}"
            )));
        }
        Ok(tables)
    }

    /// Lists the columns of a table.
    pub async fn list_columns(
        &self,
        catalog: Option<&str>,
        schema: &str,
        table: &str,
    ) -> Result<Vec<String>> {
        self.resolver()
            .list_columns(self.catalog(catalog), schema, table)
            .await
    }

    /// Dispatches a discovery request by path and query string.
    ///
    /// Recognized paths are `schemas` (or `databases`), `tables` and
    /// `columns`; anything else is [`BridgeError::NotFound`].
    pub async fn handle_resource(&self, path: &str, query: Option<&str>) -> Result<Vec<String>> {
        let params = ResourceParams::parse(query.unwrap_or_default());
        debug!("Resource request: {} {:?}", path, params);

        match path.trim_matches('/') {
            "schemas" | "databases" => self.list_schemas(params.catalog()).await,
            "tables" => self.list_tables(params.catalog(), params.schema()).await,
            "columns" => {
                self.list_columns(params.catalog(), params.schema(), params.table())
                    .await
            }
            _ => Err(BridgeError::not_found("Invalid endpoint")),
        }
    }

    /// Releases the warehouse client.
    pub async fn shutdown(&self) -> Result<()> {
        self.client.close().await
    }

    fn resolver(&self) -> NamespaceResolver<'_> {
        NamespaceResolver::new(self.client.as_ref(), self.config.statement_timeout())
    }

    fn catalog<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.config.catalog_name())
    }
}

/// Flat key-value arguments of a resource request.
#[derive(Debug, Default)]
struct ResourceParams(HashMap<String, String>);

impl ResourceParams {
    fn parse(query: &str) -> Self {
        Self(
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        )
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn catalog(&self) -> Option<&str> {
        self.get("catalog")
    }

    fn schema(&self) -> &str {
        self.get("schema")
            .or_else(|| self.get("database"))
            .unwrap_or_default()
    }

    fn table(&self) -> &str {
        self.get("table").unwrap_or_default()
    }
}
