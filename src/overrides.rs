//! Override Parser - `--flag value` tokens into typed field values
//!
//! ## Grammar
//!
//! ```text
//! overrides := (flag value?)*
//! flag      := "--" name            (name: '-' and '_' are interchangeable)
//! ```
//!
//! Boolean fields may appear bare (`--debug` means `true`) or followed by an
//! explicit boolean token. Every other field requires a value.

use std::collections::BTreeMap;

use crate::contract::{ConfigContract, FieldKind, FieldValue};
use crate::{Error, Result};

const FLAG_PREFIX: &str = "--";

/// Field overrides, coerced to each field's declared type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideSet {
    values: BTreeMap<String, FieldValue>,
}

impl OverrideSet {
    /// Create an empty override set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value directly (already coerced by the caller).
    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.values.insert(field.into(), value);
    }

    /// Value for a field, if overridden.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Number of overridden fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing was overridden.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate overrides sorted by field name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for OverrideSet {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Parse override tokens against a contract.
///
/// # Errors
///
/// - `MalformedArgument` when a token that should be a flag lacks `--`
/// - `UnknownField` for a flag the contract does not declare (lists every
///   field, sorted)
/// - `MissingValue` for a non-boolean flag at the end of the tokens
/// - `InvalidValue` when a value does not parse as the field's type
///
/// # Example
///
/// ```
/// use ox_core::contract::{ConfigContract, FieldValue};
/// use ox_core::overrides::parse_overrides;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let contract = ConfigContract::builder().int("batch_size", 32).build()?;
/// let overrides = parse_overrides(&["--batch-size", "16"], &contract)?;
/// assert_eq!(overrides.get("batch_size"), Some(&FieldValue::Int(16)));
/// # Ok(())
/// # }
/// ```
pub fn parse_overrides<S: AsRef<str>>(tokens: &[S], contract: &ConfigContract) -> Result<OverrideSet> {
    let mut overrides = OverrideSet::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_ref();
        let Some(raw_name) = token.strip_prefix(FLAG_PREFIX) else {
            return Err(Error::MalformedArgument(token.to_string()));
        };
        let name = raw_name.replace('-', "_");

        let field = contract.field(&name).ok_or_else(|| Error::UnknownField {
            field: name.clone(),
            available: contract.sorted_field_names(),
        })?;

        let value = if field.kind() == FieldKind::Bool {
            match tokens.get(i + 1).map(AsRef::<str>::as_ref) {
                Some(next) if !next.starts_with(FLAG_PREFIX) => {
                    i += 1;
                    FieldValue::Bool(parse_bool(next, &name)?)
                }
                _ => FieldValue::Bool(true),
            }
        } else {
            let raw = tokens
                .get(i + 1)
                .map(AsRef::<str>::as_ref)
                .ok_or_else(|| Error::MissingValue(name.clone()))?;
            i += 1;
            coerce(raw, field.kind(), &name)?
        };

        overrides.insert(name, value);
        i += 1;
    }

    Ok(overrides)
}

fn parse_bool(raw: &str, flag: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::InvalidValue {
            flag: flag.to_string(),
            value: raw.to_string(),
            expected: "bool (true/false, yes/no, 1/0)".to_string(),
        }),
    }
}

fn coerce(raw: &str, kind: FieldKind, flag: &str) -> Result<FieldValue> {
    let invalid = || Error::InvalidValue {
        flag: flag.to_string(),
        value: raw.to_string(),
        expected: kind.to_string(),
    };

    match kind {
        FieldKind::Int => raw.parse().map(FieldValue::Int).map_err(|_| invalid()),
        // Config reaches the script as JSON, which has no inf or NaN.
        FieldKind::Float => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(FieldValue::Float(v)),
            _ => Err(Error::InvalidValue {
                flag: flag.to_string(),
                value: raw.to_string(),
                expected: "finite float".to_string(),
            }),
        },
        FieldKind::Bool => parse_bool(raw, flag).map(FieldValue::Bool),
        FieldKind::String => Ok(FieldValue::Str(raw.to_string())),
    }
}
