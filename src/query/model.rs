//! Wire model of a query as sent by the editor.

use serde::{Deserialize, Serialize};

use super::builder::{build_visual_sql, VisualQuery};
use super::{OutputShape, QueryRequest};
use crate::error::{BridgeError, Result};

/// A query in the editor's JSON form.
///
/// Raw mode carries `queryText`; visual mode leaves it empty and fills in
/// the flattened [`VisualQuery`] fields instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryModel {
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub query_text: Option<String>,
    #[serde(default)]
    pub format: OutputShape,
    #[serde(flatten)]
    pub visual: VisualQuery,
}

impl QueryModel {
    /// Creates a raw-mode model.
    pub fn raw(query_text: impl Into<String>, format: OutputShape) -> Self {
        Self {
            query_text: Some(query_text.into()),
            format,
            ..Self::default()
        }
    }

    /// Reference id, or `"A"` when the caller sent none.
    pub fn ref_id(&self) -> &str {
        self.ref_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or("A")
    }

    /// Resolves the statement to run: the raw text when present, otherwise
    /// the SQL built from the visual selection.
    pub fn to_request(&self) -> Result<QueryRequest> {
        if let Some(text) = self.query_text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(QueryRequest::new(text, self.format));
        }

        if self.visual.is_complete() {
            let sql = build_visual_sql(&self.visual)?;
            return Ok(QueryRequest::new(sql, self.format));
        }

        Err(BridgeError::invalid_request(
            "query needs queryText or a visual selection",
        ))
    }
}
