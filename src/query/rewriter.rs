//! Textual statement rewriting: catalog qualification and row capping.
//!
//! Only the first `FROM ` is qualified. Joins and subqueries with their own
//! `FROM` clauses are left as written, since qualifying them blindly could
//! change which relation a query reads.

use std::fmt;

use crate::safety::ValidatedStatement;

const FROM_TOKEN: &str = "FROM ";
const LIMIT_TOKEN: &str = "LIMIT";

/// SQL text ready to send to the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptedStatement {
    text: String,
}

impl AdaptedStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for AdaptedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Turns a validated statement into the text sent to the warehouse.
pub trait StatementRewriter: Send + Sync {
    /// Qualifies the statement with `catalog` and caps it at `row_cap` rows
    /// (0 disables the cap).
    fn rewrite(&self, statement: &ValidatedStatement, catalog: &str, row_cap: u64) -> AdaptedStatement;
}

/// Rewriter working on the statement text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextualRewriter;

impl StatementRewriter for TextualRewriter {
    fn rewrite(&self, statement: &ValidatedStatement, catalog: &str, row_cap: u64) -> AdaptedStatement {
        let qualified = inject_catalog(catalog, statement.text());
        AdaptedStatement::new(apply_row_limit(&qualified, row_cap))
    }
}

/// Inserts `<catalog>.` after the first case-insensitive `FROM `.
///
/// Statements without a `FROM ` are returned unchanged.
pub fn inject_catalog(catalog: &str, sql: &str) -> String {
    // ASCII uppercasing keeps byte offsets aligned with `sql`.
    let upper = sql.to_ascii_uppercase();
    let Some(index) = upper.find(FROM_TOKEN) else {
        return sql.to_string();
    };

    let split = index + FROM_TOKEN.len();
    format!("{}{}.{}", &sql[..split], catalog, &sql[split..])
}

/// Appends ` LIMIT <cap>;` unless the statement already has a `LIMIT`.
///
/// A cap of 0 leaves the statement untouched. An existing `LIMIT` always
/// wins, even when it is larger than `cap`.
pub fn apply_row_limit(sql: &str, cap: u64) -> String {
    if cap == 0 {
        return sql.to_string();
    }

    let trimmed = sql.trim_end();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

    if body.to_ascii_uppercase().contains(LIMIT_TOKEN) {
        return format!("{body};");
    }

    format!("{body} LIMIT {cap};")
}
