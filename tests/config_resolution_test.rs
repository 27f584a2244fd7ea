//! End-to-end config resolution: contract + YAML file + CLI overrides.

use std::fs;

use ox_core::contract::{ConfigContract, FieldKind, FieldValue};
use ox_core::overrides::parse_overrides;
use ox_core::resolve::resolve;
use ox_core::{Error, ErrorKind};

fn training_contract() -> ConfigContract {
    ConfigContract::builder()
        .float("lr", 1e-3)
        .int("batch_size", 32)
        .int("epochs", 10)
        .string("model", "resnet18")
        .bool("debug", false)
        .build()
        .unwrap()
}

#[test]
fn test_defaults_file_and_cli_layering() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.yaml");
    fs::write(&file, "lr: 0.01\nepochs: 5\nmodel: vit\n").unwrap();

    let contract = training_contract();
    let overrides = parse_overrides(&["--lr", "0.1", "--batch-size", "64", "--debug"], &contract).unwrap();
    let config = resolve(&contract, Some(&file), Some(&overrides)).unwrap();

    assert_eq!(config.get("lr"), Some(&FieldValue::Float(0.1)));
    assert_eq!(config.get("batch_size"), Some(&FieldValue::Int(64)));
    assert_eq!(config.get("epochs"), Some(&FieldValue::Int(5)));
    assert_eq!(config.get("model"), Some(&FieldValue::Str("vit".to_string())));
    assert_eq!(config.get("debug"), Some(&FieldValue::Bool(true)));
}

#[test]
fn test_config_json_keeps_contract_order() {
    let config = resolve(&training_contract(), None, None).unwrap();
    let json = config.to_json();
    let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["lr", "batch_size", "epochs", "model", "debug"]);
}

#[test]
fn test_file_type_errors_surface_as_validation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.yaml");
    fs::write(&file, "lr: fast\ndebug: maybe\n").unwrap();

    let err = resolve(&training_contract(), Some(&file), None).unwrap_err();
    let Error::ValidationError { diagnostics, .. } = err else {
        panic!("expected ValidationError");
    };
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics[0].field, "lr");
    assert_eq!(diagnostics[1].field, "debug");
}

#[test]
fn test_top_level_list_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.yaml");
    fs::write(&file, "- lr\n- epochs\n").unwrap();

    let err = resolve(&training_contract(), Some(&file), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_required_field_from_file() {
    let contract = ConfigContract::builder()
        .required("dataset", FieldKind::String)
        .int("epochs", 1)
        .build()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.yaml");
    fs::write(&file, "dataset: cifar10\n").unwrap();

    let config = resolve(&contract, Some(&file), None).unwrap();
    assert_eq!(config.get("dataset").and_then(FieldValue::as_str), Some("cifar10"));
}

#[test]
fn test_override_errors_stop_before_resolution() {
    let contract = training_contract();
    let err = parse_overrides(&["--learning-rate", "0.1"], &contract).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownField);
    assert!(err.to_string().contains("batch_size, debug, epochs, lr, model"));
}
