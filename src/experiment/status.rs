//! Experiment status - lifecycle state machine

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Status of an experiment.
///
/// ```text
/// created ──> running ──> completed
///    │           │──────> failed
///    └───────────┴──────> cancelled   (external, manual)
/// ```
///
/// The store persists whatever status the caller sets; the transition table
/// in [`Status::can_transition_to`] is advisory for orchestration code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Scaffolded, never run.
    Created,
    /// A run is in progress.
    Running,
    /// Entry point returned successfully.
    Completed,
    /// Entry point failed.
    Failed,
    /// Cancelled by user or system.
    Cancelled,
}

impl Status {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Created,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal lifecycle step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running)
                | (Self::Running, Self::Completed | Self::Failed)
                | (Self::Created | Self::Running, Self::Cancelled)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown status {s:?}; expected one of: created, running, completed, failed, cancelled"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&Status::Running).unwrap(), "\"running\"");
        let parsed: Status = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, Status::Cancelled);
    }

    #[test]
    fn test_status_lifecycle() {
        assert!(Status::Created.can_transition_to(Status::Running));
        assert!(Status::Running.can_transition_to(Status::Completed));
        assert!(Status::Running.can_transition_to(Status::Failed));
        assert!(Status::Created.can_transition_to(Status::Cancelled));
        assert!(!Status::Created.can_transition_to(Status::Completed));
        assert!(!Status::Completed.can_transition_to(Status::Running));
        assert!(!Status::Failed.can_transition_to(Status::Cancelled));
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<Status> = Status::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Status::Completed, Status::Failed, Status::Cancelled]);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("running".parse::<Status>().unwrap(), Status::Running);
        assert!("Running".parse::<Status>().is_err());
    }
}
