//! Warehouse abstraction layer for brickgate.
//!
//! Provides a trait-based interface over the remote SQL engine so the
//! query pipeline and namespace resolver can run against the HTTP client in
//! production and the in-memory mock in tests.

mod http;
mod mock;
mod namespace;
mod types;

pub use http::HttpWarehouseClient;
pub use mock::{MockResult, MockWarehouseClient};
pub use namespace::NamespaceResolver;
pub use types::{ColumnInfo, Row, Value, NULL_SENTINEL};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::ConnectionConfig;
use crate::error::{BridgeError, Result};

/// Creates the production warehouse client for the given configuration.
pub fn connect(config: &ConnectionConfig) -> Result<Arc<dyn WarehouseClient>> {
    let client = HttpWarehouseClient::new(config)?;
    Ok(Arc::new(client))
}

/// Trait defining the interface for warehouse clients.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Runs a statement and returns a cursor over its rows.
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<Box<dyn RowCursor>>;

    /// Lightweight connectivity check.
    async fn ping(&self, timeout: Duration) -> Result<()>;

    /// Releases any pooled connections.
    async fn close(&self) -> Result<()>;
}

/// Open result set of an executed statement.
///
/// Callers must call [`RowCursor::close`] on every exit path; closing twice
/// is a no-op.
#[async_trait]
pub trait RowCursor: Send {
    /// Column metadata, in result order.
    fn columns(&self) -> &[ColumnInfo];

    /// Returns the next row, or `None` once the cursor is exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>>;

    /// Releases the cursor and any server-side resources behind it.
    async fn close(&mut self) -> Result<()>;
}

/// Runs `fut` until `deadline`, mapping expiry to [`BridgeError::Timeout`].
pub(crate) async fn within_deadline<T, F>(deadline: Instant, budget: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| BridgeError::Timeout(budget))?
}

/// Closes a cursor, logging instead of failing when the close itself errors.
pub(crate) async fn release(cursor: &mut dyn RowCursor) {
    if let Err(e) = cursor.close().await {
        tracing::warn!("Failed to close cursor: {}", e);
    }
}
