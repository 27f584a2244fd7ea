//! Experiment Store - experiment records on disk
//!
//! ## Layout
//!
//! ```text
//! <root>/ox.yaml                                 project marker
//! <root>/studies/<study>/.../experiment.json     system-owned record
//! <root>/studies/<study>/.../config.yaml         user-owned side-car (optional)
//! ```
//!
//! Bulk operations (`load_all`, `find_by_id`, `running`) tolerate individual
//! bad records: each is skipped with a warning and the scan continues.
//! Single-record operations fail fast.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{Experiment, Status};
use crate::document::{read_text, read_yaml};
use crate::{Error, Result};

/// File marking a project root.
pub const PROJECT_MARKER: &str = "ox.yaml";
/// Directory under the root holding every study.
pub const STUDIES_DIR: &str = "studies";
/// Record file name.
pub const RECORD_FILE: &str = "experiment.json";
/// Side-car config file name.
pub const SIDECAR_FILE: &str = "config.yaml";

/// Walk `start` and its ancestors for the first directory containing
/// `ox.yaml`.
///
/// # Errors
///
/// `NotFound` when no ancestor is a project root.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_MARKER).is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "No {PROJECT_MARKER} found in {} or any parent directory.\nRun 'ox init <name>' to create one.",
                start.display()
            ))
        })
}

/// Every `studies/**/experiment.json` under `root`, sorted.
///
/// Subdirectories that cannot be read are skipped with a warning.
///
/// # Errors
///
/// `Io` when `studies/` itself cannot be read.
pub fn list_record_paths(root: &Path) -> Result<Vec<PathBuf>> {
    scan_record_paths(root).map(|(paths, _)| paths)
}

fn scan_record_paths(root: &Path) -> Result<(Vec<PathBuf>, Vec<SkippedRecord>)> {
    let studies = root.join(STUDIES_DIR);
    let mut paths = Vec::new();
    let mut skipped = Vec::new();
    if studies.is_dir() {
        for entry in fs::read_dir(&studies)? {
            collect_entry(entry, &mut paths, &mut skipped);
        }
    }
    paths.sort();
    Ok((paths, skipped))
}

fn collect_entry(
    entry: std::io::Result<fs::DirEntry>,
    out: &mut Vec<PathBuf>,
    skipped: &mut Vec<SkippedRecord>,
) {
    let entry = match entry {
        Ok(entry) => entry,
        Err(e) => {
            warn!(error = %e, "skipping unreadable directory entry under studies");
            return;
        }
    };
    let path = entry.path();
    match entry.file_type() {
        Ok(file_type) if file_type.is_dir() => match fs::read_dir(&path) {
            Ok(entries) => {
                for entry in entries {
                    collect_entry(entry, out, skipped);
                }
            }
            Err(e) => skip_dir(path, &e, skipped),
        },
        Ok(_) => {
            if entry.file_name() == RECORD_FILE {
                out.push(path);
            }
        }
        Err(e) => skip_dir(path, &e, skipped),
    }
}

fn skip_dir(path: PathBuf, error: &std::io::Error, skipped: &mut Vec<SkippedRecord>) {
    warn!(path = %path.display(), error = %error, "skipping unreadable directory under studies");
    skipped.push(SkippedRecord {
        path,
        reason: error.to_string(),
    });
}

/// Load one record and merge its side-car config.
///
/// # Errors
///
/// - `NotFound` when the record file does not exist
/// - `ParseError` naming the record for a malformed record, or naming the
///   side-car for a malformed side-car
pub fn load(path: &Path) -> Result<Experiment> {
    let text = read_text(path)?;
    let mut experiment: Experiment = serde_json::from_str(&text).map_err(|e| Error::parse(path, e))?;

    let sidecar = path.with_file_name(SIDECAR_FILE);
    if sidecar.is_file() {
        match read_yaml(&sidecar)? {
            None => {}
            Some(Value::Object(config)) => experiment.set_config(config),
            Some(_) => return Err(Error::parse(&sidecar, "side-car must contain a mapping")),
        }
    }

    Ok(experiment)
}

/// A record, or a directory of records, the bulk scan could not load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Record or directory path.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of a tolerant bulk scan.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Successfully loaded records, in path order.
    pub experiments: Vec<Experiment>,
    /// Records that failed to load.
    pub skipped: Vec<SkippedRecord>,
}

/// Load every record under `root`, skipping the ones that fail.
///
/// # Errors
///
/// `Io` only when `studies/` itself cannot be read.
pub fn load_all(root: &Path) -> Result<LoadReport> {
    let (paths, skipped) = scan_record_paths(root)?;
    let mut report = LoadReport {
        experiments: Vec::with_capacity(paths.len()),
        skipped,
    };
    for path in paths {
        match load(&path) {
            Ok(experiment) => report.experiments.push(experiment),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable experiment record");
                report.skipped.push(SkippedRecord {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }
    debug!(
        loaded = report.experiments.len(),
        skipped = report.skipped.len(),
        "scanned experiment records"
    );
    Ok(report)
}

/// Write the system-owned fields of `experiment` to `path`.
///
/// The record is written to a temp file in the same directory, synced, then
/// renamed over the target; readers see the old or the new record, never a
/// partial one. The side-car is never touched.
///
/// # Errors
///
/// `Io` on any filesystem failure.
pub fn save(experiment: &Experiment, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut json = serde_json::to_string_pretty(experiment)
        .map_err(|e| Error::InvalidInput(format!("cannot serialise experiment {}: {e}", experiment.id())))?;
    json.push('\n');

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;

    debug!(id = experiment.id(), path = %path.display(), "saved experiment record");
    Ok(())
}

/// Find the first record (in path order) whose id is `id`.
///
/// # Errors
///
/// `NotFound` when no loadable record has that id.
pub fn find_by_id(id: &str, root: &Path) -> Result<(Experiment, PathBuf)> {
    for path in list_record_paths(root)? {
        match load(&path) {
            Ok(experiment) if experiment.id() == id => return Ok((experiment, path)),
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable experiment record"),
        }
    }
    Err(Error::NotFound(format!(
        "Experiment not found: '{id}'.\nUse 'ox ls' to see available experiments."
    )))
}

/// Experiments currently in `running` status.
///
/// # Errors
///
/// `Io` when `studies/` cannot be read.
pub fn running(root: &Path) -> Result<Vec<Experiment>> {
    let report = load_all(root)?;
    Ok(ExperimentFilter::new().status(Status::Running).apply(report.experiments))
}

/// Normalise a study name the way study directories are named: lowercase,
/// spaces and underscores become hyphens.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.to_lowercase().replace([' ', '_'], "-")
}

/// Conjunctive filter over loaded experiments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentFilter {
    study: Option<String>,
    status: Option<Status>,
    tag: Option<String>,
}

impl ExperimentFilter {
    /// Filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match one study. The name is slugified first.
    #[must_use]
    pub fn study(mut self, study: &str) -> Self {
        self.study = Some(slugify(study));
        self
    }

    /// Match one status.
    #[must_use]
    pub const fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Match experiments carrying `tag`.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Whether one experiment passes every set criterion.
    #[must_use]
    pub fn matches(&self, experiment: &Experiment) -> bool {
        self.study.as_deref().map_or(true, |s| experiment.study() == s)
            && self.status.map_or(true, |s| experiment.status() == s)
            && self
                .tag
                .as_deref()
                .map_or(true, |t| experiment.tags().iter().any(|tag| tag == t))
    }

    /// Keep the matching experiments, preserving order.
    #[must_use]
    pub fn apply(&self, experiments: Vec<Experiment>) -> Vec<Experiment> {
        experiments.into_iter().filter(|e| self.matches(e)).collect()
    }
}

/// Counts over a project's experiments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    /// Distinct studies with at least one experiment.
    pub studies: usize,
    /// Total experiments.
    pub experiments: usize,
    /// Experiments per status; statuses with no experiments are absent.
    pub by_status: BTreeMap<Status, usize>,
}

impl StoreSummary {
    /// Summarise a loaded list.
    #[must_use]
    pub fn from_experiments(experiments: &[Experiment]) -> Self {
        let studies: BTreeSet<&str> = experiments.iter().map(Experiment::study).collect();
        let mut by_status = BTreeMap::new();
        for experiment in experiments {
            *by_status.entry(experiment.status()).or_insert(0) += 1;
        }
        Self {
            studies: studies.len(),
            experiments: experiments.len(),
            by_status,
        }
    }
}

/// Handle on one project's records.
#[derive(Debug, Clone)]
pub struct ExperimentStore {
    root: PathBuf,
}

impl ExperimentStore {
    /// Open the store rooted at `root`. Nothing is read until a query.
    #[must_use]
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the store for the project enclosing `start`.
    ///
    /// # Errors
    ///
    /// `NotFound` when `start` is not inside a project.
    pub fn discover(start: &Path) -> Result<Self> {
        find_project_root(start).map(Self::open)
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Conventional record path for an experiment: `studies/<study>/<id>/experiment.json`.
    #[must_use]
    pub fn record_path(&self, study: &str, id: &str) -> PathBuf {
        self.root.join(STUDIES_DIR).join(study).join(id).join(RECORD_FILE)
    }

    /// See [`load_all`].
    ///
    /// # Errors
    ///
    /// `Io` when `studies/` cannot be read.
    pub fn load_all(&self) -> Result<LoadReport> {
        load_all(&self.root)
    }

    /// See [`find_by_id`].
    ///
    /// # Errors
    ///
    /// `NotFound` when no loadable record has that id.
    pub fn find_by_id(&self, id: &str) -> Result<(Experiment, PathBuf)> {
        find_by_id(id, &self.root)
    }

    /// Loaded experiments that pass `filter`.
    ///
    /// # Errors
    ///
    /// `Io` when `studies/` cannot be read.
    pub fn list(&self, filter: &ExperimentFilter) -> Result<Vec<Experiment>> {
        Ok(filter.apply(self.load_all()?.experiments))
    }

    /// See [`running`].
    ///
    /// # Errors
    ///
    /// `Io` when `studies/` cannot be read.
    pub fn running(&self) -> Result<Vec<Experiment>> {
        running(&self.root)
    }

    /// Summarise every loadable record.
    ///
    /// # Errors
    ///
    /// `Io` when `studies/` cannot be read.
    pub fn summary(&self) -> Result<StoreSummary> {
        Ok(StoreSummary::from_experiments(&self.load_all()?.experiments))
    }
}
