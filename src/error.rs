//! Error types for ox-core
//!
//! Every failure carries a distinguishable kind and a message naming the
//! offending field, path or expression, plus the valid alternatives where
//! there are any.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Minimal descriptor shown when a script exports no usable `Config`.
pub const CONFIG_EXAMPLE: &str = r#"    {"Config": {"kind": "schema", "fields": [
        {"name": "lr", "type": "float", "default": 0.001},
        {"name": "epochs", "type": "int", "default": 10}
    ]}, "main": {"kind": "callable"}}"#;

/// One per-field problem found while validating a resolved config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiagnostic {
    /// Field name
    pub field: String,
    /// What went wrong
    pub message: String,
}

impl fmt::Display for FieldDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// ox-core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Missing file, record or project root
    #[error("{0}")]
    NotFound(String),

    /// Malformed path, wrong file kind or malformed document shape
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Running a script in describe mode failed
    #[error("Error executing script {}: {message}", .path.display())]
    LoadError {
        /// Script path
        path: PathBuf,
        /// Underlying failure
        message: String,
    },

    /// No qualifying `Config` export
    #[error(
        "No Config class found in {}.\nExpected the script to export a schema named 'Config':\n\n{}\n",
        .path.display(),
        CONFIG_EXAMPLE
    )]
    ContractMissing {
        /// Script path
        path: PathBuf,
    },

    /// No callable `main` export
    #[error(
        "No main function found in {}.\nExpected a callable named 'main' taking (config, tracker):\n\n    \"main\": {{\"kind\": \"callable\"}}\n",
        .path.display()
    )]
    EntryMissing {
        /// Script path
        path: PathBuf,
    },

    /// Override value does not coerce to the field type
    #[error("Invalid value for --{flag}: {value:?} (expected {expected})")]
    InvalidValue {
        /// Normalised field name
        flag: String,
        /// Raw token
        value: String,
        /// Expected type description
        expected: String,
    },

    /// Override names a field the contract does not declare
    #[error("Unknown config field: {field:?}. Available fields: {}", .available.join(", "))]
    UnknownField {
        /// Normalised field name
        field: String,
        /// Valid field names, sorted
        available: Vec<String>,
    },

    /// Token where a `--flag` was expected
    #[error("Unexpected argument: {0:?}. Override arguments must be in --key value format.")]
    MalformedArgument(String),

    /// Non-boolean flag at the end of the token stream
    #[error("Missing value for argument: --{0}")]
    MissingValue(String),

    /// Final config does not satisfy the contract
    #[error("Config validation failed for {contract}:\n{}", format_diagnostics(.diagnostics))]
    ValidationError {
        /// Contract name
        contract: String,
        /// Per-field diagnostics
        diagnostics: Vec<FieldDiagnostic>,
    },

    /// Malformed record or side-car
    #[error("Parse error in {}: {message}", .path.display())]
    ParseError {
        /// File that failed to parse
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Filter expression invalid or unevaluable
    #[error(
        "Query error: {message}\nExpression: {expression}\nAvailable columns: {}",
        .columns.join(", ")
    )]
    QueryError {
        /// Underlying failure
        message: String,
        /// Offending expression
        expression: String,
        /// Available columns, sorted
        columns: Vec<String>,
    },

    /// Training entry point exited unsuccessfully
    #[error("Entry point failed: {0}")]
    EntryFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

/// Error kind, for callers that branch on the category only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::InvalidInput`]
    InvalidInput,
    /// See [`Error::LoadError`]
    LoadError,
    /// See [`Error::ContractMissing`]
    ContractMissing,
    /// See [`Error::EntryMissing`]
    EntryMissing,
    /// See [`Error::InvalidValue`]
    InvalidValue,
    /// See [`Error::UnknownField`]
    UnknownField,
    /// See [`Error::MalformedArgument`]
    MalformedArgument,
    /// See [`Error::MissingValue`]
    MissingValue,
    /// See [`Error::ValidationError`]
    ValidationError,
    /// See [`Error::ParseError`]
    ParseError,
    /// See [`Error::QueryError`]
    QueryError,
    /// See [`Error::EntryFailed`]
    EntryFailed,
    /// See [`Error::Io`]
    Io,
    /// See [`Error::Arrow`]
    Arrow,
}

impl Error {
    /// The kind of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::LoadError { .. } => ErrorKind::LoadError,
            Self::ContractMissing { .. } => ErrorKind::ContractMissing,
            Self::EntryMissing { .. } => ErrorKind::EntryMissing,
            Self::InvalidValue { .. } => ErrorKind::InvalidValue,
            Self::UnknownField { .. } => ErrorKind::UnknownField,
            Self::MalformedArgument(_) => ErrorKind::MalformedArgument,
            Self::MissingValue(_) => ErrorKind::MissingValue,
            Self::ValidationError { .. } => ErrorKind::ValidationError,
            Self::ParseError { .. } => ErrorKind::ParseError,
            Self::QueryError { .. } => ErrorKind::QueryError,
            Self::EntryFailed(_) => ErrorKind::EntryFailed,
            Self::Io(_) => ErrorKind::Io,
            Self::Arrow(_) => ErrorKind::Arrow,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::ParseError {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn load(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::LoadError {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

fn format_diagnostics(diagnostics: &[FieldDiagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("  {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}
