//! Project configuration read from `ox.yaml`
//!
//! ```yaml
//! project:
//!   name: my-project
//! tracker:
//!   backend: local          # only built-in backend
//!   output_dir: .ox/metrics # relative to the project root
//! ```
//!
//! Every key is optional. Unknown keys are ignored so newer files still load.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::read_yaml;
use crate::experiment::store::PROJECT_MARKER;
use crate::{Error, Result};

/// Parsed `ox.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project metadata
    pub project: ProjectSection,
    /// Tracker selection
    pub tracker: TrackerConfig,
}

/// `project:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    /// Display name; falls back to the root directory name
    pub name: Option<String>,
}

/// `tracker:` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Backend name
    pub backend: String,
    /// Metrics directory for the `local` backend
    pub output_dir: Option<String>,
    /// Remote project name, for backends that have one
    pub project: Option<String>,
    /// Remote team or user, for backends that have one
    pub entity: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            output_dir: None,
            project: None,
            entity: None,
        }
    }
}

impl ProjectConfig {
    /// Load `<root>/ox.yaml`. An empty file yields the defaults.
    ///
    /// # Errors
    ///
    /// `NotFound` when the file is missing, `ParseError` when it is malformed.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(PROJECT_MARKER);
        match read_yaml(&path)? {
            None => Ok(Self::default()),
            Some(value) => serde_json::from_value(value).map_err(|e| Error::parse(&path, e)),
        }
    }

    /// Configured name, or the root directory's name.
    #[must_use]
    pub fn display_name(&self, root: &Path) -> String {
        self.project
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_full_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(PROJECT_MARKER),
            "project:\n  name: vision\ntracker:\n  backend: local\n  output_dir: runs/metrics\n",
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.project.name.as_deref(), Some("vision"));
        assert_eq!(config.tracker.output_dir.as_deref(), Some("runs/metrics"));
        assert_eq!(config.display_name(dir.path()), "vision");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_MARKER), "# ox project\n").unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.tracker.backend, "local");
    }

    #[test]
    fn test_display_name_falls_back_to_directory() {
        let config = ProjectConfig::default();
        assert_eq!(config.display_name(Path::new("/work/my-proj")), "my-proj");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }
}
