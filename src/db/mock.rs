//! Mock warehouse client for testing.
//!
//! Serves scripted results keyed by exact statement text and records every
//! statement it is asked to run.

use super::{ColumnInfo, Row, RowCursor, Value, WarehouseClient};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A canned result set.
#[derive(Debug, Clone, Default)]
pub struct MockResult {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
    fail_after: Option<usize>,
}

impl MockResult {
    /// Creates an empty result with the given column names, all typed `STRING`.
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|name| ColumnInfo::new(*name, "STRING"))
                .collect(),
            ..Self::default()
        }
    }

    /// Creates an empty result with explicit column metadata.
    pub fn with_columns(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    /// Appends a row.
    pub fn row(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    /// Makes the cursor fail after yielding `rows` rows.
    pub fn fail_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }
}

/// A mock warehouse client that returns predefined results.
#[derive(Default)]
pub struct MockWarehouseClient {
    responses: HashMap<String, std::result::Result<MockResult, String>>,
    fallback: Option<MockResult>,
    delay: Option<Duration>,
    ping_error: Option<String>,
    executed: Mutex<Vec<String>>,
    closed: Arc<AtomicUsize>,
}

impl MockWarehouseClient {
    /// Creates a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the result for an exact statement text.
    pub fn with_result(mut self, sql: impl Into<String>, result: MockResult) -> Self {
        self.responses.insert(sql.into(), Ok(result));
        self
    }

    /// Scripts a remote failure for an exact statement text.
    pub fn with_error(mut self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses.insert(sql.into(), Err(message.into()));
        self
    }

    /// Result returned for any statement without a scripted response.
    pub fn with_fallback(mut self, result: MockResult) -> Self {
        self.fallback = Some(result);
        self
    }

    /// Delays every `execute` and `ping` call, ignoring their timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes `ping` fail with the given message.
    pub fn with_ping_error(mut self, message: impl Into<String>) -> Self {
        self.ping_error = Some(message.into());
        self
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of cursors closed so far.
    pub fn closed_cursors(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WarehouseClient for MockWarehouseClient {
    async fn execute(&self, sql: &str, _timeout: Duration) -> Result<Box<dyn RowCursor>> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sql.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.responses.get(sql) {
            Some(Ok(result)) => result.clone(),
            Some(Err(message)) => return Err(BridgeError::remote(message.clone())),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| BridgeError::remote(format!("no mock result for: {sql}")))?,
        };

        Ok(Box::new(MockCursor {
            columns: result.columns,
            rows: result.rows.into(),
            fail_after: result.fail_after,
            emitted: 0,
            closed: Arc::clone(&self.closed),
            is_closed: false,
        }))
    }

    async fn ping(&self, _timeout: Duration) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.ping_error {
            Some(message) => Err(BridgeError::connection(message.clone())),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MockCursor {
    columns: Vec<ColumnInfo>,
    rows: VecDeque<Row>,
    fail_after: Option<usize>,
    emitted: usize,
    closed: Arc<AtomicUsize>,
    is_closed: bool,
}

#[async_trait]
impl RowCursor for MockCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.fail_after == Some(self.emitted) {
            return Err(BridgeError::scan(format!(
                "mock cursor failed after {} rows",
                self.emitted
            )));
        }

        let row = self.rows.pop_front();
        if row.is_some() {
            self.emitted += 1;
        }
        Ok(row)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
