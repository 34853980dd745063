//! Output shape checks run once the result columns are known.

use super::OutputShape;
use crate::error::{BridgeError, Result};

/// Checks that a timeseries result exposes a time axis.
///
/// A column qualifies when its name equals `time` or contains `timestamp`,
/// both case-insensitively. Table output always passes.
pub fn require_time_column<S: AsRef<str>>(shape: OutputShape, columns: &[S]) -> Result<()> {
    if shape != OutputShape::TimeSeries {
        return Ok(());
    }

    if columns.iter().any(|name| is_time_like(name.as_ref())) {
        Ok(())
    } else {
        Err(BridgeError::MissingTimeColumn)
    }
}

fn is_time_like(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "time" || lower.contains("timestamp")
}
