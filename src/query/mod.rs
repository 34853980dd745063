//! Query adaptation and execution for brickgate.
//!
//! The executor runs the stages in order: validate, rewrite, execute,
//! shape check, materialize.

pub mod builder;
pub mod executor;
pub mod frame;
pub mod model;
pub mod rewriter;
pub mod shape;

pub use builder::{build_visual_sql, FieldSelection, FilterClause, VisualQuery};
pub use executor::{QueryExecutor, QueryOutcome};
pub use frame::{materialize, FrameColumn, ResultFrame};
pub use model::QueryModel;
pub use rewriter::{apply_row_limit, inject_catalog, AdaptedStatement, StatementRewriter, TextualRewriter};
pub use shape::require_time_column;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output contract requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputShape {
    #[default]
    Table,
    /// Requires a time-like column in the result.
    #[serde(alias = "time_series")]
    TimeSeries,
}

impl FromStr for OutputShape {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "timeseries" | "time_series" => Ok(Self::TimeSeries),
            _ => Err(format!(
                "Invalid format: {s}. Expected: table or timeseries"
            )),
        }
    }
}

impl fmt::Display for OutputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::TimeSeries => write!(f, "timeseries"),
        }
    }
}

/// One caller-issued query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub raw_statement: String,
    pub output_shape: OutputShape,
}

impl QueryRequest {
    /// Creates a request with the given statement and shape.
    pub fn new(raw_statement: impl Into<String>, output_shape: OutputShape) -> Self {
        Self {
            raw_statement: raw_statement.into(),
            output_shape,
        }
    }

    /// Creates a table-shaped request.
    pub fn table(raw_statement: impl Into<String>) -> Self {
        Self::new(raw_statement, OutputShape::Table)
    }
}
