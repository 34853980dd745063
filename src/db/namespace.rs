//! Namespace discovery: schemas, tables and columns under a catalog.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::{release, within_deadline, ColumnInfo, RowCursor, Value, WarehouseClient};
use crate::error::{BridgeError, Result};

/// Resolves names for editor autocomplete.
///
/// Arguments are checked before any statement is sent, and identifiers are
/// backtick-quoted in the generated commands.
pub struct NamespaceResolver<'a> {
    client: &'a dyn WarehouseClient,
    timeout: Duration,
}

impl<'a> NamespaceResolver<'a> {
    /// Creates a resolver issuing statements through `client`.
    pub fn new(client: &'a dyn WarehouseClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Lists the schemas in a catalog.
    pub async fn list_schemas(&self, catalog: &str) -> Result<Vec<String>> {
        require(catalog, BridgeError::CatalogRequired)?;

        let sql = format!("SHOW SCHEMAS IN {}", quote_ident(catalog));
        self.fetch_names(&sql, |_| 0, false).await
    }

    /// Lists the tables in `catalog.schema`, keeping only the table name.
    pub async fn list_tables(&self, catalog: &str, schema: &str) -> Result<Vec<String>> {
        require(catalog, BridgeError::CatalogRequired)?;
        require(schema, BridgeError::SchemaRequired)?;

        let sql = format!(
            "SHOW TABLES IN {}.{}",
            quote_ident(catalog),
            quote_ident(schema)
        );
        self.fetch_names(&sql, table_name_index, false).await
    }

    /// Lists the columns of `catalog.schema.table`, keeping only the name.
    pub async fn list_columns(&self, catalog: &str, schema: &str, table: &str) -> Result<Vec<String>> {
        require(catalog, BridgeError::CatalogRequired)?;
        require(schema, BridgeError::SchemaRequired)?;
        require(table, BridgeError::TableRequired)?;

        let sql = format!(
            "DESCRIBE TABLE {}.{}.{}",
            quote_ident(catalog),
            quote_ident(schema),
            quote_ident(table)
        );
        self.fetch_names(&sql, |_| 0, true).await
    }

    async fn fetch_names(
        &self,
        sql: &str,
        pick: fn(&[ColumnInfo]) -> usize,
        stop_at_section: bool,
    ) -> Result<Vec<String>> {
        debug!("Namespace lookup: {}", sql);
        let deadline = Instant::now() + self.timeout;

        let mut cursor = within_deadline(deadline, self.timeout, self.client.execute(sql, self.timeout))
            .await
            .map_err(into_remote)?;

        let names = within_deadline(
            deadline,
            self.timeout,
            collect_names(cursor.as_mut(), pick, stop_at_section),
        )
        .await;

        release(cursor.as_mut()).await;
        names.map_err(into_remote)
    }
}

async fn collect_names(
    cursor: &mut dyn RowCursor,
    pick: fn(&[ColumnInfo]) -> usize,
    stop_at_section: bool,
) -> Result<Vec<String>> {
    if cursor.columns().is_empty() {
        return Err(BridgeError::remote("lookup returned no columns"));
    }
    let index = pick(cursor.columns());

    let mut names = Vec::new();
    while let Some(row) = cursor.next_row().await? {
        let name = match row.get(index) {
            Some(Value::Null) | None => continue,
            Some(value) => value.to_display_string(),
        };

        // DESCRIBE output ends the column list with a blank row followed by
        // "# Partition Information" style sections.
        if stop_at_section && (name.trim().is_empty() || name.starts_with('#')) {
            break;
        }

        names.push(name);
    }

    Ok(names)
}

/// `SHOW TABLES` returns (database, tableName, isTemporary).
fn table_name_index(columns: &[ColumnInfo]) -> usize {
    columns
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case("tableName"))
        .unwrap_or(if columns.len() >= 2 { 1 } else { 0 })
}

fn require(value: &str, missing: BridgeError) -> Result<()> {
    if value.trim().is_empty() {
        Err(missing)
    } else {
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn into_remote(err: BridgeError) -> BridgeError {
    match err {
        BridgeError::RemoteQuery(_) => err,
        other => BridgeError::remote(other.to_string()),
    }
}
