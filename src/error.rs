//! Error types for brickgate.
//!
//! Defines the main error enum used throughout the gateway together with
//! the status classification that is surfaced to HTTP callers.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::safety::StatementType;

/// Main error type for brickgate operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Malformed request payload or arguments.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// SQL text could not be parsed.
    #[error("SQL parse error: {0}")]
    Parse(String),

    /// Statement root is not a single SELECT query.
    #[error("Only single SELECT statements are allowed (got {0})")]
    NotSelect(StatementType),

    /// Denylisted keyword found anywhere in the statement text.
    #[error("Statement contains forbidden keyword: {0}")]
    DangerousKeyword(String),

    /// Timeseries output requested but no time-like column was returned.
    #[error("Timeseries queries must return a 'time' or '*timestamp*' column")]
    MissingTimeColumn,

    #[error("Catalog name is required")]
    CatalogRequired,

    #[error("Schema is required")]
    SchemaRequired,

    #[error("Table is required")]
    TableRequired,

    /// Unknown resource path or an empty lookup treated as "nothing found".
    #[error("{0}")]
    NotFound(String),

    /// The remote engine rejected or failed the statement.
    #[error("Remote query failed: {0}")]
    RemoteQuery(String),

    /// A deadline elapsed while waiting on the remote engine.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// Reading a row from an open cursor failed.
    #[error("Failed to scan row: {0}")]
    ScanFailure(String),

    /// Connectivity errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Creates an invalid request error with the given message.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates a remote query error with the given message.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteQuery(msg.into())
    }

    /// Creates a scan failure with the given message.
    pub fn scan(msg: impl Into<String>) -> Self {
        Self::ScanFailure(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "Request Error",
            Self::Parse(_) | Self::NotSelect(_) | Self::DangerousKeyword(_) => "Statement Error",
            Self::MissingTimeColumn => "Shape Error",
            Self::CatalogRequired | Self::SchemaRequired | Self::TableRequired => {
                "Request Error"
            }
            Self::NotFound(_) => "Not Found",
            Self::RemoteQuery(_) | Self::Timeout(_) | Self::ScanFailure(_) => "Remote Error",
            Self::Connection(_) => "Connection Error",
            Self::Serialization(_) => "Serialization Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// HTTP-style status code for this error: 400 for caller mistakes,
    /// 404 for unknown paths, 500 for everything on the remote side.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_)
            | Self::Parse(_)
            | Self::NotSelect(_)
            | Self::DangerousKeyword(_)
            | Self::MissingTimeColumn
            | Self::CatalogRequired
            | Self::SchemaRequired
            | Self::TableRequired => 400,
            Self::NotFound(_) => 404,
            Self::RemoteQuery(_)
            | Self::Timeout(_)
            | Self::ScanFailure(_)
            | Self::Connection(_)
            | Self::Serialization(_)
            | Self::Config(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns true for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self, category = self.category(), "request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
