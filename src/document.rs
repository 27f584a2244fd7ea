//! YAML / JSON document reading shared by the resolver, the record store and
//! the project config.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Read a YAML document as JSON.
///
/// Blank or comment-only files, a bare `---` and an explicit `null` all read
/// as `None`.
pub(crate) fn read_yaml(path: &Path) -> Result<Option<Value>> {
    let text = read_text(path)?;
    if is_blank_yaml(&text) {
        return Ok(None);
    }

    let value: Value = serde_yaml::from_str(&text).map_err(|e| Error::parse(path, e))?;
    Ok(match value {
        Value::Null => None,
        other => Some(other),
    })
}

/// Read a YAML document that must be a mapping; absent documents are empty.
pub(crate) fn read_yaml_mapping(path: &Path) -> Result<Map<String, Value>> {
    match read_yaml(path)? {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(Error::InvalidInput(format!(
            "{} must contain a mapping at the top level, found {}",
            path.display(),
            crate::contract::json_type_name(&other)
        ))),
    }
}

/// Read a file, mapping a missing file to `NotFound`.
pub(crate) fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == IoErrorKind::NotFound {
            Error::NotFound(format!("File not found: {}", path.display()))
        } else {
            Error::Io(e)
        }
    })
}

fn is_blank_yaml(text: &str) -> bool {
    text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    })
}
