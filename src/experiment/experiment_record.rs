//! Experiment - durable record of one experiment

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{timestamp, Status};

/// A tracked experiment, persisted as `experiment.json`.
///
/// System-owned fields serialise in declaration order. `config` comes from the
/// user-owned `config.yaml` side-car and is never written by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    id: String,
    study: String,
    status: Status,
    #[serde(with = "timestamp")]
    created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    git_sha: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, skip_serializing)]
    config: Map<String, Value>,
    #[serde(default)]
    tracker_run_id: Option<String>,
}

impl Experiment {
    /// Create a new experiment in `created` status, stamped now.
    #[must_use]
    pub fn new(id: impl Into<String>, study: impl Into<String>) -> Self {
        ExperimentBuilder::new(id, study).build()
    }

    /// Create a builder for an experiment with optional fields.
    #[must_use]
    pub fn builder(id: impl Into<String>, study: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(id, study)
    }

    /// Experiment identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning study.
    #[must_use]
    pub fn study(&self) -> &str {
        &self.study
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last-update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Git commit the last run started from.
    #[must_use]
    pub fn git_sha(&self) -> Option<&str> {
        self.git_sha.as_deref()
    }

    /// Command line that last ran this experiment.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Tags, in insertion order.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Side-car config (empty when there is none).
    #[must_use]
    pub const fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Identifier the tracker assigned to the last run.
    #[must_use]
    pub fn tracker_run_id(&self) -> Option<&str> {
        self.tracker_run_id.as_deref()
    }

    /// Set the status and touch the record.
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        self.touch();
    }

    /// Record the git commit a run started from.
    pub fn set_git_sha(&mut self, sha: Option<String>) {
        self.git_sha = sha;
    }

    /// Record the command line a run was started with.
    pub fn set_command(&mut self, command: Option<String>) {
        self.command = command;
    }

    /// Record the tracker's run identifier.
    pub fn set_tracker_run_id(&mut self, run_id: Option<String>) {
        self.tracker_run_id = run_id;
    }

    /// Append a tag. Duplicates are kept.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.push(tag.into());
    }

    /// Replace the in-memory side-car config.
    pub fn set_config(&mut self, config: Map<String, Value>) {
        self.config = config;
    }

    /// Advance `updated_at`.
    ///
    /// The new value is strictly greater than the old one even when the clock
    /// has not moved, so every save orders after the previous one.
    pub fn touch(&mut self) {
        let now = timestamp::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
    }

    /// Flatten to a query row: fixed fields first, then config keys that do
    /// not shadow a fixed field.
    #[must_use]
    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for (key, value) in &self.config {
            if !row.contains_key(key) {
                row.insert(key.clone(), value.clone());
            }
        }
        row
    }
}

/// Builder for [`Experiment`].
#[derive(Debug)]
pub struct ExperimentBuilder {
    id: String,
    study: String,
    status: Status,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    git_sha: Option<String>,
    command: Option<String>,
    tags: Vec<String>,
    config: Map<String, Value>,
    tracker_run_id: Option<String>,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: impl Into<String>, study: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            study: study.into(),
            status: Status::Created,
            created_at: timestamp::now(),
            updated_at: None,
            git_sha: None,
            command: None,
            tags: Vec::new(),
            config: Map::new(),
            tracker_run_id: None,
        }
    }

    /// Set the initial status.
    #[must_use]
    pub const fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Set a custom creation timestamp (useful for testing).
    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set a custom update timestamp; defaults to `created_at`.
    #[must_use]
    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Set the git commit.
    #[must_use]
    pub fn git_sha(mut self, sha: impl Into<String>) -> Self {
        self.git_sha = Some(sha.into());
        self
    }

    /// Set the command line.
    #[must_use]
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the side-car config.
    #[must_use]
    pub fn config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Set the tracker run id.
    #[must_use]
    pub fn tracker_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.tracker_run_id = Some(run_id.into());
        self
    }

    /// Build the `Experiment`. `updated_at` never precedes `created_at`.
    #[must_use]
    pub fn build(self) -> Experiment {
        let created_at = timestamp::truncate(self.created_at);
        let updated_at = self
            .updated_at
            .map_or(created_at, timestamp::truncate)
            .max(created_at);
        Experiment {
            id: self.id,
            study: self.study,
            status: self.status,
            created_at,
            updated_at,
            git_sha: self.git_sha,
            command: self.command,
            tags: self.tags,
            config: self.config,
            tracker_run_id: self.tracker_run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_experiment_new() {
        let exp = Experiment::new("baseline", "lr-sweep");
        assert_eq!(exp.id(), "baseline");
        assert_eq!(exp.study(), "lr-sweep");
        assert_eq!(exp.status(), Status::Created);
        assert_eq!(exp.created_at(), exp.updated_at());
        assert!(exp.tags().is_empty());
    }

    #[test]
    fn test_serialized_field_order_excludes_config() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let exp = Experiment::builder("e1", "s1")
            .created_at(ts)
            .config(json!({"lr": 0.1}).as_object().unwrap().clone())
            .build();

        let value = serde_json::to_value(&exp).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["id", "study", "status", "created_at", "updated_at", "git_sha", "command", "tags", "tracker_run_id"]
        );
        assert_eq!(value["created_at"], "2025-01-01T00:00:00.000000+00:00");
        assert_eq!(value["git_sha"], Value::Null);
    }

    #[test]
    fn test_touch_strictly_increases() {
        let future = timestamp::now() + Duration::hours(1);
        let mut exp = Experiment::builder("e1", "s1").created_at(future).build();
        let before = exp.updated_at();
        exp.touch();
        assert!(exp.updated_at() > before);
        exp.touch();
        assert_eq!(exp.updated_at(), before + Duration::microseconds(2));
    }

    #[test]
    fn test_set_status_touches() {
        let mut exp = Experiment::new("e1", "s1");
        let before = exp.updated_at();
        exp.set_status(Status::Running);
        assert_eq!(exp.status(), Status::Running);
        assert!(exp.updated_at() > before);
        assert!(exp.updated_at() >= exp.created_at());
    }

    #[test]
    fn test_builder_clamps_updated_at() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let exp = Experiment::builder("e1", "s1").created_at(created).updated_at(earlier).build();
        assert_eq!(exp.updated_at(), created);
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let exp: Experiment = serde_json::from_value(json!({
            "id": "e1",
            "study": "s1",
            "status": "completed",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T01:00:00.123456+00:00"
        }))
        .unwrap();
        assert_eq!(exp.status(), Status::Completed);
        assert!(exp.git_sha().is_none());
        assert!(exp.tags().is_empty());
        assert!(exp.config().is_empty());
    }

    #[test]
    fn test_to_row_config_never_shadows_fixed_fields() {
        let exp = Experiment::builder("e1", "s1")
            .tag("baseline")
            .config(json!({"id": "shadow", "lr": 0.1}).as_object().unwrap().clone())
            .build();
        let row = exp.to_row();
        assert_eq!(row["id"], "e1");
        assert_eq!(row["lr"], 0.1);
        assert_eq!(row.keys().last().map(String::as_str), Some("lr"));
    }
}
