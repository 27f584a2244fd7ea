//! Tests for error types

use std::path::PathBuf;

use ox_core::error::FieldDiagnostic;
use ox_core::{Error, ErrorKind};

#[test]
fn test_not_found_error_is_message_verbatim() {
    let error = Error::NotFound("Config file not found: c.yaml".to_string());
    assert_eq!(format!("{error}"), "Config file not found: c.yaml");
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[test]
fn test_invalid_value_error() {
    let error = Error::InvalidValue {
        flag: "epochs".to_string(),
        value: "ten".to_string(),
        expected: "int".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("--epochs"));
    assert!(error_str.contains("\"ten\""));
    assert!(error_str.contains("int"));
}

#[test]
fn test_unknown_field_error_lists_alternatives() {
    let error = Error::UnknownField {
        field: "lrr".to_string(),
        available: vec!["epochs".to_string(), "lr".to_string()],
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("\"lrr\""));
    assert!(error_str.contains("Available fields: epochs, lr"));
}

#[test]
fn test_validation_error_lists_every_diagnostic() {
    let error = Error::ValidationError {
        contract: "Config".to_string(),
        diagnostics: vec![
            FieldDiagnostic {
                field: "lr".to_string(),
                message: "expected float, got string".to_string(),
            },
            FieldDiagnostic {
                field: "seed".to_string(),
                message: "field required".to_string(),
            },
        ],
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Config"));
    assert!(error_str.contains("lr: expected float, got string"));
    assert!(error_str.contains("seed: field required"));
}

#[test]
fn test_contract_missing_shows_example() {
    let error = Error::ContractMissing {
        path: PathBuf::from("train.py"),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("train.py"));
    assert!(error_str.contains("\"kind\": \"schema\""));
}

#[test]
fn test_parse_error_names_file() {
    let error = Error::ParseError {
        path: PathBuf::from("studies/s/e/config.yaml"),
        message: "did not find expected node content".to_string(),
    };
    assert!(format!("{error}").contains("config.yaml"));
    assert_eq!(error.kind(), ErrorKind::ParseError);
}

#[test]
fn test_query_error_shows_expression_and_columns() {
    let error = Error::QueryError {
        message: "Referenced column \"nope\" not found".to_string(),
        expression: "nope > 1".to_string(),
        columns: vec!["id".to_string(), "status".to_string()],
    };
    let error_str = format!("{error}");
    assert!(error_str.starts_with("Query error:"));
    assert!(error_str.contains("Expression: nope > 1"));
    assert!(error_str.contains("Available columns: id, status"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error: Error = io_error.into();
    assert_eq!(error.kind(), ErrorKind::Io);
    assert!(format!("{error}").contains("denied"));
}

#[test]
fn test_error_debug() {
    let error = Error::MissingValue("lr".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("MissingValue"));
}
