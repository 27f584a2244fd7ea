//! Experiment records and their on-disk store
//!
//! ## Record Overview
//!
//! ```text
//! Experiment ── status: created → running → {completed, failed}
//!     │                 └──────────┴──────→ cancelled
//!     └── config  (read from the config.yaml side-car, never written)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use ox_core::experiment::{store, Experiment, Status};
//!
//! # fn main() -> ox_core::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("studies/lr-sweep/baseline/experiment.json");
//!
//! let mut experiment = Experiment::new("baseline", "lr-sweep");
//! experiment.set_status(Status::Running);
//! store::save(&experiment, &path)?;
//!
//! assert_eq!(store::load(&path)?, experiment);
//! # Ok(())
//! # }
//! ```

mod experiment_record;
mod status;
pub mod store;
pub mod timestamp;

pub use experiment_record::{Experiment, ExperimentBuilder};
pub use status::Status;
pub use store::{ExperimentFilter, ExperimentStore, LoadReport, SkippedRecord, StoreSummary};
