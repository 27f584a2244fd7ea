//! Run orchestration - discover, resolve, track, record
//!
//! ```text
//! discover script ─> parse overrides ─> resolve config        (fail fast, record untouched)
//!   └─ experiment id given?  record: running + git sha + command, saved
//! tracker.init_run(run id, config) ─> record.tracker_run_id, saved
//! entry point ─> tracker.finish() ─> record: completed | failed, saved
//! ```

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::contract::ConfigInstance;
use crate::experiment::{store, timestamp, Experiment, Status};
use crate::overrides::{parse_overrides, OverrideSet};
use crate::project::ProjectConfig;
use crate::resolve::resolve;
use crate::script::ScriptLoader;
use crate::tracker::{tracker_from_config, LocalTracker, Tracker};
use crate::{Error, Result};

/// Everything needed to start one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    script: PathBuf,
    config_path: Option<PathBuf>,
    experiment_id: Option<String>,
    overrides: Vec<String>,
    git_sha: Option<String>,
    project_root: Option<PathBuf>,
}

impl RunRequest {
    /// Run `script` with contract defaults only.
    #[must_use]
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            config_path: None,
            experiment_id: None,
            overrides: Vec::new(),
            git_sha: None,
            project_root: None,
        }
    }

    /// YAML file tier.
    #[must_use]
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Record the run against this experiment. Requires a project root.
    #[must_use]
    pub fn experiment(mut self, id: impl Into<String>) -> Self {
        self.experiment_id = Some(id.into());
        self
    }

    /// Raw `--flag value` override tokens.
    #[must_use]
    pub fn overrides<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Commit the working tree is at; stored on the experiment record.
    #[must_use]
    pub fn git_sha(mut self, sha: impl Into<String>) -> Self {
        self.git_sha = Some(sha.into());
        self
    }

    /// Project the run belongs to.
    #[must_use]
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Command line that reproduces this request.
    #[must_use]
    pub fn command_string(&self) -> String {
        build_command_string(
            &self.script.to_string_lossy(),
            self.config_path.as_deref().map(|p| p.to_string_lossy()).as_deref(),
            self.experiment_id.as_deref(),
            &self.overrides,
        )
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Identifier handed to the tracker
    pub run_id: String,
    /// Config the entry point ran with
    pub config: ConfigInstance,
    /// Final state of the experiment record, when one was given
    pub experiment: Option<Experiment>,
}

/// Runs scripts through a [`ScriptLoader`].
#[derive(Debug, Clone, Default)]
pub struct Runner {
    loader: ScriptLoader,
}

impl Runner {
    /// Runner using a custom loader.
    #[must_use]
    pub const fn with_loader(loader: ScriptLoader) -> Self {
        Self { loader }
    }

    /// Execute a run.
    ///
    /// # Errors
    ///
    /// - discovery, override and resolution errors, before anything is
    ///   written
    /// - `InvalidInput` when an experiment is requested without a project root
    /// - `NotFound` when the experiment does not exist
    /// - `EntryFailed` when the entry point fails; the record is saved as
    ///   `failed` and the tracker finished first
    pub fn run(&self, request: &RunRequest, tracker: &mut dyn Tracker) -> Result<RunOutcome> {
        let script = self.loader.discover(&request.script)?;
        let overrides = if request.overrides.is_empty() {
            OverrideSet::new()
        } else {
            parse_overrides(&request.overrides, &script.contract)?
        };
        let config = resolve(&script.contract, request.config_path.as_deref(), Some(&overrides))?;

        let mut record = match &request.experiment_id {
            Some(id) => Some(start_experiment(request, id)?),
            None => None,
        };

        let run_id = request.experiment_id.clone().unwrap_or_else(generate_run_id);
        tracker.init_run(&run_id, &config.to_json())?;
        if let Some((experiment, path)) = record.as_mut() {
            experiment.set_tracker_run_id(Some(run_id.clone()));
            store::save(experiment, path)?;
        }

        info!(run_id = %run_id, script = %request.script.display(), "run started");
        let result = script.entry.invoke(&config, tracker);
        let finished = tracker.finish();

        if let Some((experiment, path)) = record.as_mut() {
            let status = if result.is_ok() { Status::Completed } else { Status::Failed };
            experiment.set_status(status);
            store::save(experiment, path)?;
        }

        match &result {
            Ok(()) => info!(run_id = %run_id, "run completed"),
            Err(e) => warn!(run_id = %run_id, error = %e, "run failed"),
        }
        result?;
        finished?;

        Ok(RunOutcome {
            run_id,
            config,
            experiment: record.map(|(experiment, _)| experiment),
        })
    }
}

fn start_experiment(request: &RunRequest, id: &str) -> Result<(Experiment, PathBuf)> {
    let root = request.project_root.as_deref().ok_or_else(|| {
        Error::InvalidInput(
            "Cannot use --experiment outside an ox project.\nRun from within your project directory."
                .to_string(),
        )
    })?;
    let (mut experiment, path) = store::find_by_id(id, root)?;
    experiment.set_git_sha(request.git_sha.clone());
    experiment.set_command(Some(request.command_string()));
    experiment.set_status(Status::Running);
    store::save(&experiment, &path)?;
    Ok((experiment, path))
}

/// Run with the default script loader.
///
/// # Errors
///
/// See [`Runner::run`].
pub fn run(request: &RunRequest, tracker: &mut dyn Tracker) -> Result<RunOutcome> {
    Runner::default().run(request, tracker)
}

/// Tracker for a run: the project's configured backend, or a default local
/// tracker outside a project.
///
/// # Errors
///
/// `ParseError` for a malformed `ox.yaml`; `InvalidInput` for an unknown
/// backend.
pub fn project_tracker(root: Option<&Path>) -> Result<Box<dyn Tracker>> {
    match root {
        Some(root) => {
            let config = ProjectConfig::load(root)?;
            tracker_from_config(&config.tracker, root)
        }
        None => {
            warn!("not inside an ox project; using a local tracker with defaults");
            Ok(Box::new(LocalTracker::default()))
        }
    }
}

/// `run-<timestamp>` with `:` replaced and `+` removed, safe as a file name.
#[must_use]
pub fn generate_run_id() -> String {
    format!("run-{}", timestamp::format(&timestamp::now()))
        .replace(':', "-")
        .replace('+', "")
}

/// `ox run <script> [--config p] [--experiment id] [-- overrides...]`
#[must_use]
pub fn build_command_string<S: AsRef<str>>(
    script: &str,
    config_path: Option<&str>,
    experiment_id: Option<&str>,
    overrides: &[S],
) -> String {
    let mut parts = vec!["ox", "run", script];
    if let Some(path) = config_path {
        parts.extend(["--config", path]);
    }
    if let Some(id) = experiment_id {
        parts.extend(["--experiment", id]);
    }
    if !overrides.is_empty() {
        parts.push("--");
        parts.extend(overrides.iter().map(|token| token.as_ref()));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_string_full() {
        let cmd = build_command_string("train.py", Some("c.yaml"), Some("baseline"), &["--lr", "0.1"]);
        assert_eq!(cmd, "ox run train.py --config c.yaml --experiment baseline -- --lr 0.1");
    }

    #[test]
    fn test_command_string_minimal() {
        assert_eq!(build_command_string::<&str>("train.py", None, None, &[]), "ox run train.py");
    }

    #[test]
    fn test_request_command_string() {
        let request = RunRequest::new("train.py").experiment("e1").overrides(["--debug"]);
        assert_eq!(request.command_string(), "ox run train.py --experiment e1 -- --debug");
    }

    #[test]
    fn test_generated_run_id_is_filename_safe() {
        let id = generate_run_id();
        assert!(id.starts_with("run-"));
        assert!(!id.contains(':'));
        assert!(!id.contains('+'));
    }

    #[test]
    fn test_project_tracker_outside_project() {
        assert!(project_tracker(None).is_ok());
    }
}
