//! Config Contract - the typed shape of a training script's configuration
//!
//! A contract is an ordered list of field descriptors. It is built either in
//! code through [`ConfigContract::builder`] or from the descriptor a script
//! prints in describe mode (see [`crate::script`]).

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Declared type of a config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// 64-bit signed integer
    #[serde(alias = "integer")]
    Int,
    /// 64-bit float
    #[serde(alias = "number")]
    Float,
    /// Boolean
    #[serde(alias = "boolean")]
    Bool,
    /// UTF-8 string
    #[serde(alias = "str")]
    String,
}

impl FieldKind {
    /// Name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::String => "string",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed config value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    Str(String),
}

impl FieldValue {
    /// Kind of this value.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Bool(_) => FieldKind::Bool,
            Self::Int(_) => FieldKind::Int,
            Self::Float(_) => FieldKind::Float,
            Self::Str(_) => FieldKind::String,
        }
    }

    /// Integer payload, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload; integers widen.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean payload, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to a JSON scalar.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::Str(v) => serde_json::Value::String(v.clone()),
        }
    }

    /// Convert an already-typed value to `kind`. Only `Int` widens into
    /// `Float`; every other mismatch is rejected.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the value does not fit `kind`.
    pub fn coerce_to(&self, kind: FieldKind) -> std::result::Result<Self, String> {
        match (kind, self) {
            (kind, value) if value.kind() == kind => Ok(value.clone()),
            (FieldKind::Float, Self::Int(_)) => self
                .as_float()
                .map(Self::Float)
                .ok_or_else(|| format!("expected {kind}, got {}", self.kind())),
            (kind, value) => Err(format!("expected {kind}, got {}", value.kind())),
        }
    }

    /// Coerce a JSON value to `kind`.
    ///
    /// Integers accept integral floats, floats accept integers; booleans and
    /// strings are strict.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the value does not fit `kind`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn coerce_json(value: &serde_json::Value, kind: FieldKind) -> std::result::Result<Self, String> {
        use serde_json::Value;

        match (kind, value) {
            (FieldKind::Bool, Value::Bool(b)) => Ok(Self::Bool(*b)),
            (FieldKind::Int, Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Self::Int(i));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
                        Ok(Self::Int(f as i64))
                    }
                    _ => Err(format!("expected int, got {n}")),
                }
            }
            (FieldKind::Float, Value::Number(n)) => n
                .as_f64()
                .map(Self::Float)
                .ok_or_else(|| format!("expected float, got {n}")),
            (FieldKind::String, Value::String(s)) => Ok(Self::Str(s.clone())),
            (kind, other) => Err(format!("expected {kind}, got {}", json_type_name(other))),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

pub(crate) const fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "mapping",
    }
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    name: String,
    #[serde(rename = "type")]
    kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<FieldValue>,
}

impl FieldSpec {
    /// Create a field with an optional default.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind, default: Option<FieldValue>) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
        }
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Default value, if any.
    #[must_use]
    pub const fn default_value(&self) -> Option<&FieldValue> {
        self.default.as_ref()
    }

    /// A field without a default must be supplied explicitly.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Ordered, immutable set of field descriptors.
///
/// ## Invariants
///
/// - field names are unique
/// - every default matches its field kind (`int` defaults widen for `float`
///   fields)
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigContract {
    name: String,
    fields: Vec<FieldSpec>,
}

impl ConfigContract {
    /// Build a contract from field descriptors.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on duplicate field names or a default whose
    /// type does not match the declared kind.
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        let mut checked = Vec::with_capacity(fields.len());

        for mut field in fields {
            if !seen.insert(field.name.clone()) {
                return Err(Error::InvalidInput(format!(
                    "duplicate field {:?} in {name}",
                    field.name
                )));
            }
            if let Some(default) = field.default.take() {
                let coerced = FieldValue::coerce_json(&default.to_json(), field.kind)
                    .map_err(|reason| {
                        Error::InvalidInput(format!(
                            "default for {name}.{}: {reason}",
                            field.name
                        ))
                    })?;
                field.default = Some(coerced);
            }
            checked.push(field);
        }

        Ok(Self {
            name,
            fields: checked,
        })
    }

    /// Start a builder for a contract named `Config`.
    #[must_use]
    pub fn builder() -> ConfigContractBuilder {
        ConfigContractBuilder::new("Config")
    }

    /// Contract (type) name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names sorted lexicographically.
    #[must_use]
    pub fn sorted_field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.iter().map(|f| f.name.clone()).collect();
        names.sort();
        names
    }

    /// JSON description of the contract (name, fields, types, defaults).
    #[must_use]
    pub fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.name,
            "fields": self.fields,
        })
    }
}

/// Builder for `ConfigContract`.
#[derive(Debug)]
pub struct ConfigContractBuilder {
    name: String,
    fields: Vec<FieldSpec>,
}

impl ConfigContractBuilder {
    /// Create a builder for a contract with the given type name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add an integer field with a default.
    #[must_use]
    pub fn int(mut self, name: impl Into<String>, default: i64) -> Self {
        self.fields
            .push(FieldSpec::new(name, FieldKind::Int, Some(FieldValue::Int(default))));
        self
    }

    /// Add a float field with a default.
    #[must_use]
    pub fn float(mut self, name: impl Into<String>, default: f64) -> Self {
        self.fields.push(FieldSpec::new(
            name,
            FieldKind::Float,
            Some(FieldValue::Float(default)),
        ));
        self
    }

    /// Add a boolean field with a default.
    #[must_use]
    pub fn bool(mut self, name: impl Into<String>, default: bool) -> Self {
        self.fields
            .push(FieldSpec::new(name, FieldKind::Bool, Some(FieldValue::Bool(default))));
        self
    }

    /// Add a string field with a default.
    #[must_use]
    pub fn string(mut self, name: impl Into<String>, default: impl Into<String>) -> Self {
        self.fields.push(FieldSpec::new(
            name,
            FieldKind::String,
            Some(FieldValue::Str(default.into())),
        ));
        self
    }

    /// Add a field with no default.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec::new(name, kind, None));
        self
    }

    /// Build the `ConfigContract`.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigContract::new`].
    pub fn build(self) -> Result<ConfigContract> {
        ConfigContract::new(self.name, self.fields)
    }
}

/// A validated config: every contract field populated, in contract order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigInstance {
    contract: String,
    values: Vec<(String, FieldValue)>,
}

impl ConfigInstance {
    pub(crate) const fn new(contract: String, values: Vec<(String, FieldValue)>) -> Self {
        Self { contract, values }
    }

    /// Name of the contract this instance satisfies.
    #[must_use]
    pub fn contract_name(&self) -> &str {
        &self.contract
    }

    /// Value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Iterate `(name, value)` pairs in contract order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for a contract with no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object in contract order.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let contract = ConfigContract::builder()
            .float("lr", 1e-3)
            .int("epochs", 10)
            .bool("debug", false)
            .build()
            .unwrap();

        let names: Vec<&str> = contract.fields().iter().map(FieldSpec::name).collect();
        assert_eq!(names, vec!["lr", "epochs", "debug"]);
        assert_eq!(contract.name(), "Config");
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = ConfigContract::builder()
            .int("epochs", 1)
            .int("epochs", 2)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate field"));
    }

    #[test]
    fn test_int_default_widens_for_float_field() {
        let contract = ConfigContract::new(
            "Config",
            vec![FieldSpec::new("lr", FieldKind::Float, Some(FieldValue::Int(1)))],
        )
        .unwrap();
        assert_eq!(contract.field("lr").unwrap().default_value(), Some(&FieldValue::Float(1.0)));
    }

    #[test]
    fn test_mismatched_default_rejected() {
        let result = ConfigContract::new(
            "Config",
            vec![FieldSpec::new(
                "epochs",
                FieldKind::Int,
                Some(FieldValue::Str("ten".to_string())),
            )],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_sorted_field_names() {
        let contract = ConfigContract::builder()
            .int("zeta", 1)
            .int("alpha", 1)
            .build()
            .unwrap();
        assert_eq!(contract.sorted_field_names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_coerce_json_rules() {
        let int = FieldValue::coerce_json(&serde_json::json!(5.0), FieldKind::Int).unwrap();
        assert_eq!(int, FieldValue::Int(5));
        assert!(FieldValue::coerce_json(&serde_json::json!(5.5), FieldKind::Int).is_err());
        let float = FieldValue::coerce_json(&serde_json::json!(3), FieldKind::Float).unwrap();
        assert_eq!(float, FieldValue::Float(3.0));
        assert!(FieldValue::coerce_json(&serde_json::json!("true"), FieldKind::Bool).is_err());
        assert!(FieldValue::coerce_json(&serde_json::json!(1), FieldKind::String).is_err());
    }

    #[test]
    fn test_field_spec_deserializes_from_descriptor() {
        let spec: FieldSpec =
            serde_json::from_str(r#"{"name": "lr", "type": "float", "default": 0.001}"#).unwrap();
        assert_eq!(spec.kind(), FieldKind::Float);
        assert_eq!(spec.default_value(), Some(&FieldValue::Float(0.001)));

        let required: FieldSpec = serde_json::from_str(r#"{"name": "seed", "type": "int"}"#).unwrap();
        assert!(required.is_required());
    }
}
