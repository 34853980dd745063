//! Row-to-column transposition of query results.

use serde::Serialize;

use crate::db::RowCursor;
use crate::error::{BridgeError, Result};

/// Name every materialized frame carries.
pub const FRAME_NAME: &str = "response";

/// One output column: a name and one display string per row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameColumn {
    pub name: String,
    pub values: Vec<String>,
}

/// Column-oriented result of a query.
///
/// All columns have the same length, and their order matches the cursor's
/// column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultFrame {
    pub name: String,
    pub columns: Vec<FrameColumn>,
}

impl ResultFrame {
    /// Creates an empty frame with the given column names.
    pub fn with_columns<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: FRAME_NAME.to_string(),
            columns: names
                .into_iter()
                .map(|name| FrameColumn {
                    name: name.into(),
                    values: Vec::new(),
                })
                .collect(),
        }
    }

    /// Number of rows, i.e. the shared column length.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&FrameColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(BridgeError::scan(format!(
                "row has {} values, expected {}",
                row.len(),
                self.columns.len()
            )));
        }

        for (column, value) in self.columns.iter_mut().zip(row) {
            column.values.push(value);
        }
        Ok(())
    }
}

/// Drains `cursor` into a frame, formatting every cell as text.
///
/// A row that fails to read, or has the wrong width, aborts the whole frame
/// with [`BridgeError::ScanFailure`]. The cursor is not closed here.
pub async fn materialize(cursor: &mut dyn RowCursor) -> Result<ResultFrame> {
    let mut frame = ResultFrame::with_columns(cursor.columns().iter().map(|c| c.name.clone()));

    loop {
        let row = match cursor.next_row().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e @ BridgeError::ScanFailure(_)) => return Err(e),
            Err(e) => return Err(BridgeError::scan(e.to_string())),
        };

        frame.push_row(row.iter().map(|value| value.to_display_string()).collect())?;
    }

    Ok(frame)
}
