//! Statement safety validation.
//!
//! Parses caller-supplied SQL and enforces the read-only policy: exactly one
//! statement, rooted at a SELECT query, with no denylisted keyword anywhere
//! in its text.

mod parser;

pub use parser::{find_dangerous_keyword, validate_sql, StatementValidator, DANGEROUS_KEYWORDS};

use sqlparser::ast::Statement;
use std::fmt;

/// The type of SQL statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Truncate,
    Alter,
    Create,
    Grant,
    Revoke,
    Explain,
    Show,
    Merge,
    /// Multiple statements detected; contains the first non-SELECT type.
    Multiple(Box<StatementType>),
    /// Statement type could not be determined.
    Unknown,
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Drop => write!(f, "DROP"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Alter => write!(f, "ALTER"),
            Self::Create => write!(f, "CREATE"),
            Self::Grant => write!(f, "GRANT"),
            Self::Revoke => write!(f, "REVOKE"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Show => write!(f, "SHOW"),
            Self::Merge => write!(f, "MERGE"),
            Self::Multiple(inner) => write!(f, "multiple statements ({})", inner),
            Self::Unknown => write!(f, "unknown statement"),
        }
    }
}

/// A statement that passed validation.
///
/// Keeps the original text alongside the parsed tree so a rewriter can work
/// on either representation.
#[derive(Debug, Clone)]
pub struct ValidatedStatement {
    text: String,
    statement: Statement,
}

impl ValidatedStatement {
    pub(crate) fn new(text: impl Into<String>, statement: Statement) -> Self {
        Self {
            text: text.into(),
            statement,
        }
    }

    /// The statement exactly as the caller supplied it.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parsed statement tree.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }
}
