//! brickgate - a read-only SQL gateway for lakehouse warehouses.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use brickgate::cli::{Cli, Command};
use brickgate::config::{Config, ConnectionConfig};
use brickgate::db::{self, MockResult, MockWarehouseClient, Value, WarehouseClient};
use brickgate::logging;
use brickgate::query::QueryRequest;
use brickgate::server::Server;
use brickgate::Gateway;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    match cli.log_path() {
        Some(path) => logging::init_file_logging(&path),
        None => logging::init_stderr_logging(),
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    cli.apply_overrides(&mut config);
    config.connection.apply_env_defaults();

    let client = build_client(&cli, &mut config.connection)?;
    info!("Connection: {}", config.connection.display_string());
    let gateway = Gateway::new(client, config.connection.clone());

    match cli.command() {
        Command::Serve => {
            Server::new(gateway, config.server.listen).run().await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            let health = gateway.health_check().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            gateway.shutdown().await?;
            Ok(if health.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Query { sql, format } => {
            let result = gateway
                .execute_query(&QueryRequest::new(sql, format))
                .await;
            gateway.shutdown().await?;

            let outcome = result.context("query failed")?;
            info!("Executed: {}", outcome.statement);
            println!("{}", serde_json::to_string_pretty(&outcome.frame)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_client(cli: &Cli, connection: &mut ConnectionConfig) -> anyhow::Result<Arc<dyn WarehouseClient>> {
    if cli.mock {
        if connection.catalog.is_none() {
            connection.catalog = Some("main".to_string());
        }
        info!("Using in-memory demo warehouse");
        return Ok(Arc::new(demo_warehouse()));
    }

    connection.validate()?;
    Ok(db::connect(connection)?)
}

/// Demo data served by `--mock`: every statement returns the same small
/// timeseries.
fn demo_warehouse() -> MockWarehouseClient {
    let result = MockResult::new(&["time", "sensor", "value"])
        .row(vec!["2024-01-01T00:00:00Z".into(), "a".into(), Value::Float(1.5)])
        .row(vec!["2024-01-01T00:01:00Z".into(), "a".into(), Value::Float(2.0)])
        .row(vec!["2024-01-01T00:02:00Z".into(), "b".into(), Value::Null]);

    MockWarehouseClient::new().with_fallback(result)
}
