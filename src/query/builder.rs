//! SQL generation for the editor's visual query mode.
//!
//! The output is ordinary SQL text and goes through the same validation and
//! rewriting as a hand-written statement. Identifiers, aggregations,
//! operators and directions are checked against fixed lists; filter values
//! are always emitted as quoted literals, except the subqueries taken by
//! `EXISTS` and `ANY`/`SOME`/`ALL`, which must themselves be single SELECTs.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{BridgeError, Result};
use crate::safety::validate_sql;

const IDENT_PATTERN: &str = r"^(?:[A-Za-z_][A-Za-z0-9_]*|`[^`]+`)$";

const AGGREGATIONS: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX"];
const BINARY_OPERATORS: &[&str] = &["=", "!=", "<>", "<", "<=", ">", ">="];
const PATTERN_OPERATORS: &[&str] = &["LIKE", "NOT LIKE", "ILIKE", "NOT ILIKE", "REGEXP", "RLIKE"];

/// One entry of the select list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelection {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub aggregation: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

/// One WHERE condition. `condition` joins it to the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterClause {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

/// The visual-mode part of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualQuery {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<FieldSelection>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Vec<FilterClause>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_direction: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enable_filter: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enable_group: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enable_order: bool,
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl VisualQuery {
    /// True when a database, a table and at least one field are selected.
    pub fn is_complete(&self) -> bool {
        non_empty(&self.database).is_some()
            && non_empty(&self.table).is_some()
            && self.fields.iter().any(|f| non_empty(&f.column).is_some())
    }
}

/// Renders a visual query as SQL text.
pub fn build_visual_sql(query: &VisualQuery) -> Result<String> {
    if !query.is_complete() {
        return Err(BridgeError::invalid_request(
            "visual query needs a database, a table and at least one field",
        ));
    }

    let builder = SqlBuilder::new()?;
    builder.build(query)
}

struct SqlBuilder {
    ident: Regex,
}

impl SqlBuilder {
    fn new() -> Result<Self> {
        let ident = Regex::new(IDENT_PATTERN).map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(Self { ident })
    }

    fn build(&self, query: &VisualQuery) -> Result<String> {
        let database = self.identifier(non_empty(&query.database).unwrap_or_default())?;
        let table = self.identifier(non_empty(&query.table).unwrap_or_default())?;

        let selections = query
            .fields
            .iter()
            .filter(|f| non_empty(&f.column).is_some())
            .map(|f| self.selection(f))
            .collect::<Result<Vec<_>>>()?;

        let mut sql = format!("SELECT {} FROM {}.{}", selections.join(", "), database, table);

        if query.enable_filter {
            let where_clause = self.where_clause(&query.filters)?;
            if !where_clause.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&where_clause);
            }
        }

        if query.enable_group && !query.group_by.is_empty() {
            let columns = query
                .group_by
                .iter()
                .map(|c| self.identifier(c))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&format!(" GROUP BY {}", columns.join(", ")));
        }

        if query.enable_order {
            if let Some(order_by) = non_empty(&query.order_by) {
                let direction = direction(query.order_direction.as_deref())?;
                sql.push_str(&format!(" ORDER BY {} {}", self.identifier(order_by)?, direction));
            }
            if let Some(limit) = query.limit.filter(|n| *n > 0) {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
        }

        Ok(sql)
    }

    fn selection(&self, field: &FieldSelection) -> Result<String> {
        let column = non_empty(&field.column).unwrap_or_default();
        let aggregation = non_empty(&field.aggregation)
            .map(|a| whitelisted(a, AGGREGATIONS, "aggregation"))
            .transpose()?;

        if column == "*" {
            return Ok(match aggregation {
                Some("COUNT") => "COUNT(*)".to_string(),
                _ => "*".to_string(),
            });
        }

        let column = self.identifier(column)?;
        let expr = match aggregation {
            Some(agg) => format!("{agg}({column})"),
            None => column.to_string(),
        };

        match non_empty(&field.alias) {
            Some(alias) => Ok(format!("{} AS {}", expr, self.identifier(alias)?)),
            None => Ok(expr),
        }
    }

    fn where_clause(&self, filters: &[FilterClause]) -> Result<String> {
        let mut clause = String::new();

        let active = filters
            .iter()
            .filter(|f| non_empty(&f.column).is_some() && non_empty(&f.operator).is_some());

        for (idx, filter) in active.enumerate() {
            if idx > 0 {
                let logic = non_empty(&filter.condition).unwrap_or("AND");
                clause.push_str(&format!(" {} ", whitelisted(logic, &["AND", "OR"], "condition")?));
            }
            clause.push_str(&self.condition(filter)?);
        }

        Ok(clause)
    }

    fn condition(&self, filter: &FilterClause) -> Result<String> {
        let column = self.identifier(non_empty(&filter.column).unwrap_or_default())?;
        let operator = non_empty(&filter.operator).unwrap_or_default().to_ascii_uppercase();
        let value = filter.value.as_deref().unwrap_or_default();

        match operator.as_str() {
            "IS NULL" | "IS NOT NULL" => Ok(format!("{column} {operator}")),
            "EXISTS" | "NOT EXISTS" => Ok(format!("{} ({})", operator, subquery(value)?)),
            "ANY" | "SOME" | "ALL" => Ok(format!("{} = {} ({})", column, operator, subquery(value)?)),
            "BETWEEN" => {
                let (low, high) = split_between(value).ok_or_else(|| {
                    BridgeError::invalid_request("BETWEEN needs a value of the form 'a AND b'")
                })?;
                Ok(format!("{} BETWEEN {} AND {}", column, literal(low), literal(high)))
            }
            "IN" | "NOT IN" => {
                let items: Vec<String> = value
                    .split(',')
                    .map(|item| literal(unquote(item.trim())))
                    .collect();
                Ok(format!("{} {} ({})", column, operator, items.join(", ")))
            }
            op if PATTERN_OPERATORS.contains(&op) || BINARY_OPERATORS.contains(&op) => {
                Ok(format!("{} {} {}", column, op, literal(value)))
            }
            other => Err(BridgeError::invalid_request(format!(
                "unsupported filter operator: {other}"
            ))),
        }
    }

    fn identifier<'a>(&self, name: &'a str) -> Result<&'a str> {
        let name = name.trim();
        if self.ident.is_match(name) {
            Ok(name)
        } else {
            Err(BridgeError::invalid_request(format!("invalid identifier: {name}")))
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn whitelisted<'a>(value: &str, allowed: &[&'a str], what: &str) -> Result<&'a str> {
    let upper = value.trim().to_ascii_uppercase();
    allowed
        .iter()
        .copied()
        .find(|candidate| *candidate == upper)
        .ok_or_else(|| BridgeError::invalid_request(format!("unsupported {what}: {value}")))
}

fn direction(value: Option<&str>) -> Result<&'static str> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok("ASC"),
        Some(dir) => whitelisted(dir, &["ASC", "DESC"], "order direction"),
    }
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}

fn split_between(value: &str) -> Option<(&str, &str)> {
    let upper = value.to_ascii_uppercase();
    let index = upper.find(" AND ")?;
    let low = unquote(value[..index].trim());
    let high = unquote(value[index + 5..].trim());
    if low.is_empty() || high.is_empty() {
        return None;
    }
    Some((low, high))
}

fn subquery(value: &str) -> Result<&str> {
    let value = value.trim();
    validate_sql(value).map_err(|e| BridgeError::invalid_request(format!("invalid subquery: {e}")))?;
    Ok(value)
}
