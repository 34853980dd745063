//! Command-line argument parsing for brickgate.

use crate::config::Config;
use crate::query::OutputShape;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// A read-only SQL gateway in front of a lakehouse warehouse.
#[derive(Parser, Debug)]
#[command(name = "brickgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Workspace host (e.g., adb-123.azuredatabricks.net)
    #[arg(short = 'H', long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// Warehouse HTTP path (e.g., /sql/1.0/warehouses/abc123)
    #[arg(long, global = true, value_name = "PATH")]
    pub http_path: Option<String>,

    /// Catalog injected into queries and used for discovery
    #[arg(short = 'c', long, global = true, value_name = "CATALOG")]
    pub catalog: Option<String>,

    /// Row cap appended as LIMIT (0 disables it)
    #[arg(long, global = true, value_name = "ROWS")]
    pub max_rows: Option<u64>,

    /// Statement timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Address for the HTTP listener
    #[arg(short = 'l', long, global = true, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Config file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Use an in-memory warehouse with demo data
    #[arg(long, global = true)]
    pub mock: bool,

    /// Write logs to a file instead of stderr (default location if no path)
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<Option<PathBuf>>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API (default)
    Serve,

    /// Check the warehouse once and exit non-zero if it is unreachable
    Check,

    /// Run one statement through the gateway and print the frame as JSON
    Query {
        /// SQL statement (a single SELECT)
        sql: String,

        /// Output shape: table or timeseries
        #[arg(short, long, default_value = "table")]
        format: OutputShape,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run, `serve` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        let connection = &mut config.connection;

        if let Some(host) = &self.host {
            connection.host = Some(host.clone());
        }
        if let Some(http_path) = &self.http_path {
            connection.http_path = Some(http_path.clone());
        }
        if let Some(catalog) = &self.catalog {
            connection.catalog = Some(catalog.clone());
        }
        if let Some(max_rows) = self.max_rows {
            connection.max_rows = max_rows;
        }
        if let Some(timeout) = self.timeout {
            connection.timeout_secs = timeout;
        }
        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
    }

    /// Log file requested with --log-file, resolving a bare flag to the
    /// default location.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(crate::logging::get_log_path))
    }
}
