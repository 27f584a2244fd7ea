//! Query Engine - SQL `WHERE` predicates over experiment records
//!
//! ## Pipeline
//!
//! ```text
//! experiments ──> rows (fixed fields + non-shadowing config keys)
//!             ──> Arrow RecordBatch (column union, types from values)
//!             ──> predicate (sqlparser, GenericDialect) evaluated with Arrow kernels
//!             ──> filtered rows
//! ```
//!
//! ## Supported Expression Subset
//!
//! - column identifiers (case-insensitive unless quoted) and literals
//! - `= != <> < <= > >=`, `AND OR NOT`, `+ - * / %`, unary minus
//! - `IS [NOT] NULL`, `IS [NOT] TRUE`, `IS [NOT] FALSE`
//! - `[NOT] BETWEEN`, `[NOT] IN (...)`, `[NOT] LIKE`, `[NOT] ILIKE`
//!
//! References:
//! - sqlparser-rs: <https://docs.rs/sqlparser>

mod executor;
mod table;

use std::path::Path;

use serde_json::{Map, Value};
use sqlparser::ast::Expr;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use tracing::debug;

use crate::experiment::{store, Experiment};
use crate::{Error, Result};

/// One result row: column name to value, in column order.
pub type Row = Map<String, Value>;

/// Predicate parser and executor
pub struct QueryEngine {
    dialect: GenericDialect,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine {
    /// Create a new query engine
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// Parse a single SQL expression.
    ///
    /// # Errors
    ///
    /// `QueryError` for a syntax error or trailing tokens after the
    /// expression.
    pub fn parse(&self, expression: &str) -> Result<Expr> {
        let mut parser = Parser::new(&self.dialect)
            .try_with_sql(expression)
            .map_err(|e| query_failure(e.to_string()))?;
        let expr = parser.parse_expr().map_err(|e| query_failure(e.to_string()))?;

        let next = parser.peek_token();
        if next.token != Token::EOF {
            return fail(format!("unexpected trailing input starting at {}", next.token));
        }
        Ok(expr)
    }

    /// Filter experiments with a `WHERE` predicate.
    ///
    /// # Errors
    ///
    /// `QueryError` carrying the expression and the sorted column list for
    /// any parse or evaluation failure.
    ///
    /// # Example
    ///
    /// ```
    /// use ox_core::experiment::Experiment;
    /// use ox_core::query::QueryEngine;
    ///
    /// # fn main() -> ox_core::Result<()> {
    /// let experiments = vec![
    ///     Experiment::builder("a", "sweep").tag("baseline").build(),
    ///     Experiment::builder("b", "sweep").build(),
    /// ];
    /// let rows = QueryEngine::new().execute("tags LIKE '%baseline%'", &experiments)?;
    /// assert_eq!(rows.len(), 1);
    /// assert_eq!(rows[0]["id"], "a");
    /// # Ok(())
    /// # }
    /// ```
    pub fn execute(&self, expression: &str, experiments: &[Experiment]) -> Result<Vec<Row>> {
        if experiments.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<Row> = experiments.iter().map(Experiment::to_row).collect();
        let columns = table::column_names(&rows);

        let run = || -> Result<Vec<Row>> {
            let predicate = self.parse(expression)?;
            let batch = table::to_batch(&rows, &columns)?;
            let filtered = executor::filter(&batch, &predicate)?;
            table::to_rows(&filtered)
        };

        let result = run().map_err(|e| with_context(e, expression, &columns))?;
        debug!(expression, matched = result.len(), total = rows.len(), "query executed");
        Ok(result)
    }
}

/// Query every loadable record under a project root.
///
/// # Errors
///
/// `QueryError` for a bad expression; `Io` when the scan fails.
pub fn query(expression: &str, root: &Path) -> Result<Vec<Row>> {
    let report = store::load_all(root)?;
    query_records(expression, &report.experiments)
}

/// Query an already-loaded list of experiments.
///
/// # Errors
///
/// `QueryError` for a bad expression.
pub fn query_records(expression: &str, experiments: &[Experiment]) -> Result<Vec<Row>> {
    QueryEngine::new().execute(expression, experiments)
}

fn query_failure(message: String) -> Error {
    Error::QueryError {
        message,
        expression: String::new(),
        columns: Vec::new(),
    }
}

/// Fail with a `QueryError`; the caller fills in the expression and columns.
pub(crate) fn fail<T>(message: impl Into<String>) -> Result<T> {
    Err(query_failure(message.into()))
}

fn with_context(error: Error, expression: &str, columns: &[String]) -> Error {
    let message = match error {
        Error::QueryError { message, .. } => message,
        other => other.to_string(),
    };
    let mut columns = columns.to_vec();
    columns.sort();
    Error::QueryError {
        message,
        expression: expression.to_string(),
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_parse_single_expression() {
        let engine = QueryEngine::new();
        assert!(engine.parse("lr > 0.01 AND status = 'completed'").is_ok());
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = QueryEngine::new().parse("lr > 0.01 extra").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueryError);
    }

    #[test]
    fn test_empty_records_skip_parsing() {
        let rows = query_records("this is not sql ((", &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_error_lists_sorted_columns() {
        let experiments = vec![Experiment::new("a", "s")];
        let err = query_records("nope = 1", &experiments).unwrap_err();
        let Error::QueryError {
            expression, columns, ..
        } = &err
        else {
            panic!("expected QueryError");
        };
        assert_eq!(expression, "nope = 1");
        let mut sorted = columns.clone();
        sorted.sort();
        assert_eq!(columns, &sorted);
        assert!(columns.contains(&"study".to_string()));
        assert!(err.to_string().contains("Available columns:"));
    }
}
