//! SQL parsing and read-only enforcement.
//!
//! Uses sqlparser-rs to reject anything that is not a single SELECT, then
//! runs a plain substring scan over the raw text for denylisted keywords.
//! The scan is deliberately coarser than the parser: it also matches inside
//! string literals, comments and identifiers.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{BridgeError, Result};

use super::{StatementType, ValidatedStatement};

/// Keywords that reject a statement wherever they appear in its text.
pub const DANGEROUS_KEYWORDS: &[&str] = &["DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE"];

/// Validator enforcing the read-only, single-SELECT policy.
#[derive(Debug)]
pub struct StatementValidator {
    dialect: GenericDialect,
}

impl Default for StatementValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementValidator {
    /// Creates a new validator.
    pub fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// Validates a raw statement.
    ///
    /// Parse failures report the denylisted keyword when one is present, so
    /// that mangled destructive statements are still named as such.
    pub fn validate(&self, sql: &str) -> Result<ValidatedStatement> {
        let keyword = find_dangerous_keyword(sql);

        let statements = match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => statements,
            Err(e) => {
                return Err(match keyword {
                    Some(keyword) => BridgeError::DangerousKeyword(keyword.to_string()),
                    None => BridgeError::Parse(e.to_string()),
                })
            }
        };

        let statement = single_select(statements)?;

        if let Some(keyword) = keyword {
            return Err(BridgeError::DangerousKeyword(keyword.to_string()));
        }

        Ok(ValidatedStatement::new(sql, statement))
    }
}

/// Convenience function to validate SQL without creating a validator instance.
pub fn validate_sql(sql: &str) -> Result<ValidatedStatement> {
    StatementValidator::new().validate(sql)
}

/// Returns the denylisted keyword that occurs earliest in `sql`, ignoring case.
pub fn find_dangerous_keyword(sql: &str) -> Option<&'static str> {
    let upper = sql.to_ascii_uppercase();

    DANGEROUS_KEYWORDS
        .iter()
        .filter_map(|keyword| upper.find(keyword).map(|pos| (pos, *keyword)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, keyword)| keyword)
}

/// Accepts exactly one statement rooted at a read-only query.
fn single_select(mut statements: Vec<Statement>) -> Result<Statement> {
    match statements.len() {
        0 => Err(BridgeError::Parse("empty SQL statement".to_string())),
        1 => {
            let statement = statements.remove(0);
            match statement_type(&statement) {
                StatementType::Select => Ok(statement),
                other => Err(BridgeError::NotSelect(other)),
            }
        }
        _ => {
            let first_offender = statements
                .iter()
                .map(statement_type)
                .find(|t| *t != StatementType::Select)
                .unwrap_or(StatementType::Select);
            Err(BridgeError::NotSelect(StatementType::Multiple(Box::new(
                first_offender,
            ))))
        }
    }
}

/// Classifies a single parsed statement.
fn statement_type(statement: &Statement) -> StatementType {
    match statement {
        // Query: may contain data-modifying CTEs, so recurse
        Statement::Query(query) => match check_query(query) {
            Ok(()) => StatementType::Select,
            Err(inner) => inner,
        },
        Statement::Explain { .. } => StatementType::Explain,
        Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. } => StatementType::Show,

        Statement::Insert { .. } => StatementType::Insert,
        Statement::Update { .. } => StatementType::Update,
        Statement::Merge { .. } => StatementType::Merge,
        Statement::Delete { .. } => StatementType::Delete,
        Statement::Drop { .. } => StatementType::Drop,
        Statement::Truncate { .. } => StatementType::Truncate,
        Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::AlterRole { .. } => StatementType::Alter,
        Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateRole { .. } => StatementType::Create,
        Statement::Grant { .. } => StatementType::Grant,
        Statement::Revoke { .. } => StatementType::Revoke,

        _ => StatementType::Unknown,
    }
}

/// Walks a query looking for data-modifying bodies in CTEs and derived tables.
fn check_query(query: &Query) -> std::result::Result<(), StatementType> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }

    check_set_expr(&query.body)
}

fn check_set_expr(set_expr: &SetExpr) -> std::result::Result<(), StatementType> {
    match set_expr {
        SetExpr::Select(select) => check_select(select),
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        SetExpr::Insert(_) => Err(StatementType::Insert),
        SetExpr::Update(_) => Err(StatementType::Update),
        #[allow(unreachable_patterns)]
        _ => Err(StatementType::Unknown),
    }
}

fn check_select(select: &Select) -> std::result::Result<(), StatementType> {
    select.from.iter().try_for_each(check_table_with_joins)
}

fn check_table_with_joins(twj: &TableWithJoins) -> std::result::Result<(), StatementType> {
    check_table_factor(&twj.relation)?;
    twj.joins
        .iter()
        .try_for_each(|join| check_table_factor(&join.relation))
}

fn check_table_factor(factor: &TableFactor) -> std::result::Result<(), StatementType> {
    match factor {
        TableFactor::Derived { subquery, .. } => check_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => check_table_with_joins(table_with_joins),
        _ => Ok(()),
    }
}
