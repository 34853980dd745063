//! Query execution through the adaptation pipeline.
//!
//! Runs one request end to end: validation, catalog and limit rewriting,
//! remote execution under the statement deadline, the output shape check
//! and materialization. Every stage fails fast, and the cursor is released
//! on every path once it has been opened.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::frame::{materialize, ResultFrame};
use super::rewriter::{AdaptedStatement, StatementRewriter, TextualRewriter};
use super::shape::require_time_column;
use super::{OutputShape, QueryRequest};
use crate::config::ConnectionConfig;
use crate::db::{release, within_deadline, RowCursor, WarehouseClient};
use crate::error::{BridgeError, Result};
use crate::safety::StatementValidator;

/// Query executor bound to one warehouse client and its configuration.
pub struct QueryExecutor<'a> {
    client: &'a dyn WarehouseClient,
    config: &'a ConnectionConfig,
    rewriter: &'a dyn StatementRewriter,
    validator: StatementValidator,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor using the textual rewriter.
    pub fn new(client: &'a dyn WarehouseClient, config: &'a ConnectionConfig) -> Self {
        Self {
            client,
            config,
            rewriter: &TextualRewriter,
            validator: StatementValidator::new(),
        }
    }

    /// Replaces the statement rewriter.
    pub fn with_rewriter(mut self, rewriter: &'a dyn StatementRewriter) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Validates and rewrites a statement without running it.
    pub fn adapt(&self, raw_statement: &str) -> Result<AdaptedStatement> {
        let validated = self.validator.validate(raw_statement)?;

        let catalog = self.config.catalog_name();
        if catalog.trim().is_empty() {
            return Err(BridgeError::CatalogRequired);
        }

        Ok(self
            .rewriter
            .rewrite(&validated, catalog, self.config.max_rows))
    }

    /// Runs a request and materializes its result.
    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let start = Instant::now();
        let statement = self.adapt(&request.raw_statement)?;
        debug!("Adapted statement: {}", statement);

        let timeout = self.config.statement_timeout();
        let deadline = tokio::time::Instant::now() + timeout;

        let mut cursor =
            within_deadline(deadline, timeout, self.client.execute(statement.text(), timeout))
                .await?;

        let frame = consume(cursor.as_mut(), request.output_shape, deadline, timeout).await;
        release(cursor.as_mut()).await;
        let frame = frame?;

        let execution_time = start.elapsed();
        info!(
            "Query returned {} rows in {} ms",
            frame.row_count(),
            execution_time.as_millis()
        );

        Ok(QueryOutcome {
            frame,
            statement,
            execution_time,
        })
    }
}

async fn consume(
    cursor: &mut dyn RowCursor,
    shape: OutputShape,
    deadline: tokio::time::Instant,
    timeout: Duration,
) -> Result<ResultFrame> {
    {
        let names: Vec<&str> = cursor.columns().iter().map(|c| c.name.as_str()).collect();
        require_time_column(shape, &names)?;
    }

    within_deadline(deadline, timeout, materialize(cursor)).await
}

/// Successful query execution outcome.
#[derive(Debug)]
pub struct QueryOutcome {
    /// The materialized result.
    pub frame: ResultFrame,
    /// The statement that was sent to the warehouse.
    pub statement: AdaptedStatement,
    /// How long the query took, adaptation included.
    pub execution_time: Duration,
}
