//! Tracker - metric sink for a training run
//!
//! Run orchestration drives a tracker through `init_run`, any number of
//! `log` calls, then `finish`. The built-in [`LocalTracker`] appends JSON
//! lines to `<output_dir>/<run_id>_metrics.jsonl`:
//!
//! ```text
//! {"type":"config","run_id":"...","config":{...}}
//! {"type":"metrics","timestamp":"...","step":1,"loss":0.5}
//! {"type":"finish","run_id":"...","timestamp":"...","total_steps":1}
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::experiment::timestamp;
use crate::project::TrackerConfig;
use crate::{Error, Result};

/// Default metrics directory, relative to the project root.
pub const DEFAULT_OUTPUT_DIR: &str = ".ox/metrics";

/// Backends [`tracker_from_config`] can build.
pub const SUPPORTED_BACKENDS: &[&str] = &["local"];

/// Metric tracking backend.
pub trait Tracker {
    /// Start a run.
    ///
    /// # Errors
    ///
    /// Backend-specific; `Io` for file backends.
    fn init_run(&mut self, run_id: &str, config: &Value) -> Result<()>;

    /// Log a set of metrics, optionally at a step.
    ///
    /// # Errors
    ///
    /// Backend-specific.
    fn log(&mut self, metrics: &Map<String, Value>, step: Option<u64>) -> Result<()>;

    /// Close the run. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Backend-specific.
    fn finish(&mut self) -> Result<()>;
}

/// Appends JSON lines to a local file.
#[derive(Debug)]
pub struct LocalTracker {
    output_dir: PathBuf,
    run_id: Option<String>,
    file: Option<File>,
    total_steps: u64,
}

impl Default for LocalTracker {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

impl LocalTracker {
    /// Tracker writing under `output_dir`. Nothing is created until
    /// `init_run`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_id: None,
            file: None,
            total_steps: 0,
        }
    }

    /// Directory metric files are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Metrics file for a run id.
    #[must_use]
    pub fn metrics_path(&self, run_id: &str) -> PathBuf {
        self.output_dir.join(format!("{run_id}_metrics.jsonl"))
    }

    fn write(&mut self, entry: &Value) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(Error::InvalidInput(
                "tracker has no open run; call init_run first".to_string(),
            ));
        };
        let mut line = entry.to_string();
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl Tracker for LocalTracker {
    fn init_run(&mut self, run_id: &str, config: &Value) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.metrics_path(run_id);
        self.file = Some(OpenOptions::new().create(true).append(true).open(&path)?);
        self.run_id = Some(run_id.to_string());
        self.total_steps = 0;
        self.write(&json!({"type": "config", "run_id": run_id, "config": config}))?;
        info!(path = %path.display(), "local tracker logging");
        Ok(())
    }

    fn log(&mut self, metrics: &Map<String, Value>, step: Option<u64>) -> Result<()> {
        let mut entry = Map::new();
        entry.insert("type".to_string(), json!("metrics"));
        entry.insert("timestamp".to_string(), json!(timestamp::format(&timestamp::now())));
        if let Some(step) = step {
            entry.insert("step".to_string(), json!(step));
            self.total_steps = self.total_steps.max(step);
        }
        entry.extend(metrics.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write(&Value::Object(entry))
    }

    fn finish(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        let entry = json!({
            "type": "finish",
            "run_id": self.run_id,
            "timestamp": timestamp::format(&timestamp::now()),
            "total_steps": self.total_steps,
        });
        let written = self.write(&entry);
        self.file = None;
        debug!(run_id = ?self.run_id, "local tracker finished");
        written
    }
}

/// Build the tracker a project's `ox.yaml` asks for.
///
/// A relative `output_dir` resolves against `base_dir`, usually the project
/// root.
///
/// # Errors
///
/// `InvalidInput` for a backend that is not built in.
pub fn tracker_from_config(config: &TrackerConfig, base_dir: &Path) -> Result<Box<dyn Tracker>> {
    match config.backend.as_str() {
        "local" => {
            let output_dir = config.output_dir.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR);
            Ok(Box::new(LocalTracker::new(base_dir.join(output_dir))))
        }
        other => Err(Error::InvalidInput(format!(
            "Unknown tracker backend: {other:?}. Supported backends: {}",
            SUPPORTED_BACKENDS.join(", ")
        ))),
    }
}
