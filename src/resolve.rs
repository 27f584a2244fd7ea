//! Config Resolver - layered precedence and final validation
//!
//! Precedence, lowest to highest authority:
//!
//! ```text
//! contract defaults  <  config file mapping  <  CLI overrides
//! ```
//!
//! Each tier assigns over the keys of the tier below it; keys a tier does not
//! mention fall through. The merged mapping is then validated field by field
//! against the contract, collecting every problem before failing.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::contract::{ConfigContract, ConfigInstance, FieldValue};
use crate::document::read_yaml_mapping;
use crate::error::FieldDiagnostic;
use crate::overrides::OverrideSet;
use crate::{Error, Result};

/// Resolve a config instance from defaults, an optional YAML file and
/// optional CLI overrides.
///
/// # Errors
///
/// - `NotFound` when `file_source` is given but missing
/// - `ParseError` / `InvalidInput` when the file is malformed or not a mapping
/// - `ValidationError` when the merged values do not satisfy the contract
///
/// # Example
///
/// ```
/// use ox_core::contract::{ConfigContract, FieldValue};
/// use ox_core::overrides::parse_overrides;
/// use ox_core::resolve::resolve;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let contract = ConfigContract::builder().float("lr", 1e-3).int("epochs", 10).build()?;
/// let overrides = parse_overrides(&["--lr", "0.1"], &contract)?;
/// let config = resolve(&contract, None, Some(&overrides))?;
/// assert_eq!(config.get("lr"), Some(&FieldValue::Float(0.1)));
/// assert_eq!(config.get("epochs"), Some(&FieldValue::Int(10)));
/// # Ok(())
/// # }
/// ```
pub fn resolve(
    contract: &ConfigContract,
    file_source: Option<&Path>,
    overrides: Option<&OverrideSet>,
) -> Result<ConfigInstance> {
    let file_values = match file_source {
        Some(path) => load_config_file(path)?,
        None => Map::new(),
    };
    resolve_mapping(contract, &file_values, overrides)
}

/// Load the file tier: a YAML mapping, empty when the document is empty.
///
/// # Errors
///
/// `NotFound` for a missing file, `ParseError` for malformed YAML,
/// `InvalidInput` when the top level is not a mapping.
pub fn load_config_file(path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    read_yaml_mapping(path)
}

/// Resolve against an already-loaded file tier.
///
/// # Errors
///
/// `ValidationError` with one diagnostic per invalid or missing field.
pub fn resolve_mapping(
    contract: &ConfigContract,
    file_values: &Map<String, Value>,
    overrides: Option<&OverrideSet>,
) -> Result<ConfigInstance> {
    for key in file_values.keys() {
        if contract.field(key).is_none() {
            debug!(field = %key, contract = contract.name(), "ignoring config file key not in contract");
        }
    }

    let mut values = Vec::with_capacity(contract.fields().len());
    let mut diagnostics = Vec::new();

    for field in contract.fields() {
        let name = field.name();
        // Overrides and defaults are already typed; only the file tier is JSON.
        let coerced = if let Some(value) = overrides.and_then(|o| o.get(name)) {
            value.coerce_to(field.kind())
        } else if let Some(value) = file_values.get(name) {
            FieldValue::coerce_json(value, field.kind())
        } else if let Some(value) = field.default_value() {
            value.coerce_to(field.kind())
        } else {
            diagnostics.push(FieldDiagnostic {
                field: name.to_string(),
                message: "field required".to_string(),
            });
            continue;
        };

        match coerced {
            Ok(value) => values.push((name.to_string(), value)),
            Err(message) => diagnostics.push(FieldDiagnostic {
                field: name.to_string(),
                message,
            }),
        }
    }

    if !diagnostics.is_empty() {
        return Err(Error::ValidationError {
            contract: contract.name().to_string(),
            diagnostics,
        });
    }

    Ok(ConfigInstance::new(contract.name().to_string(), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::FieldKind;
    use crate::ErrorKind;
    use std::fs;

    fn contract() -> ConfigContract {
        ConfigContract::builder()
            .float("lr", 1e-3)
            .int("batch_size", 32)
            .int("epochs", 10)
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults_only() {
        let config = resolve(&contract(), None, None).unwrap();
        assert_eq!(config.get("lr"), Some(&FieldValue::Float(1e-3)));
        assert_eq!(config.get("batch_size"), Some(&FieldValue::Int(32)));
        assert_eq!(config.get("epochs"), Some(&FieldValue::Int(10)));
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "lr: 0.01\nepochs: 5\n").unwrap();

        let config = resolve(&contract(), Some(&path), None).unwrap();
        assert_eq!(config.get("lr"), Some(&FieldValue::Float(0.01)));
        assert_eq!(config.get("epochs"), Some(&FieldValue::Int(5)));
        assert_eq!(config.get("batch_size"), Some(&FieldValue::Int(32)));
    }

    #[test]
    fn test_cli_overrides_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "lr: 0.01\nepochs: 5\n").unwrap();

        let overrides: OverrideSet = [("lr", FieldValue::Float(0.1))].into_iter().collect();
        let config = resolve(&contract(), Some(&path), Some(&overrides)).unwrap();
        assert_eq!(config.get("lr"), Some(&FieldValue::Float(0.1)));
        assert_eq!(config.get("epochs"), Some(&FieldValue::Int(5)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(&contract(), Some(&dir.path().join("nope.yaml")), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_empty_file_is_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.yaml");
        fs::write(&path, "").unwrap();

        let config = resolve(&contract(), Some(&path), None).unwrap();
        assert_eq!(config.get("lr"), Some(&FieldValue::Float(1e-3)));
    }

    #[test]
    fn test_validation_collects_every_field() {
        let mut file = Map::new();
        file.insert("lr".to_string(), Value::String("fast".to_string()));
        file.insert("epochs".to_string(), serde_json::json!(2.5));

        let err = resolve_mapping(&contract(), &file, None).unwrap_err();
        let Error::ValidationError { diagnostics, .. } = err else {
            panic!("expected ValidationError");
        };
        let fields: Vec<&str> = diagnostics.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["lr", "epochs"]);
    }

    #[test]
    fn test_required_field_missing() {
        let contract = ConfigContract::builder()
            .required("seed", FieldKind::Int)
            .build()
            .unwrap();
        let err = resolve(&contract, None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.to_string().contains("seed: field required"));
    }

    #[test]
    fn test_integral_float_in_file_accepted_for_int() {
        let mut file = Map::new();
        file.insert("epochs".to_string(), serde_json::json!(5.0));
        let config = resolve_mapping(&contract(), &file, None).unwrap();
        assert_eq!(config.get("epochs"), Some(&FieldValue::Int(5)));
    }

    #[test]
    fn test_typed_override_kept_without_json_round_trip() {
        let mut overrides = OverrideSet::new();
        overrides.insert("lr", FieldValue::Float(f64::MAX));
        overrides.insert("epochs", FieldValue::Int(i64::MAX));
        let config = resolve_mapping(&contract(), &Map::new(), Some(&overrides)).unwrap();
        assert_eq!(config.get("lr"), Some(&FieldValue::Float(f64::MAX)));
        assert_eq!(config.get("epochs"), Some(&FieldValue::Int(i64::MAX)));
    }

    #[test]
    fn test_int_override_widens_for_float_field() {
        let overrides: OverrideSet = [("lr", FieldValue::Int(2))].into_iter().collect();
        let config = resolve_mapping(&contract(), &Map::new(), Some(&overrides)).unwrap();
        assert_eq!(config.get("lr"), Some(&FieldValue::Float(2.0)));
    }

    #[test]
    fn test_mistyped_override_is_diagnosed() {
        let mut overrides = OverrideSet::new();
        overrides.insert("epochs", FieldValue::Str("ten".to_string()));
        let err = resolve_mapping(&contract(), &Map::new(), Some(&overrides)).unwrap_err();
        assert!(err.to_string().contains("epochs: expected int, got string"));
    }

    #[test]
    fn test_unknown_file_keys_ignored() {
        let mut file = Map::new();
        file.insert("optimizer".to_string(), Value::String("adam".to_string()));
        let config = resolve_mapping(&contract(), &file, None).unwrap();
        assert_eq!(config.len(), 3);
        assert!(config.get("optimizer").is_none());
    }
}
