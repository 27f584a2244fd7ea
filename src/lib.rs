//! # ox-core: experiment management for training scripts
//!
//! **Version**: 0.1.0
//!
//! ox-core turns a training script that declares its own config schema into a
//! tracked, queryable experiment:
//!
//! - **Discovery** ([`script`]): a script describes its `Config` contract and
//!   `main` entry point through a small stdout protocol
//! - **Overrides** ([`overrides`]): `--flag value` tokens typed against the
//!   contract
//! - **Resolution** ([`resolve`]): defaults < YAML file < CLI, validated with
//!   per-field diagnostics
//! - **Records** ([`experiment`]): one `experiment.json` per experiment, with a
//!   user-owned `config.yaml` side-car
//! - **Queries** ([`query`]): SQL `WHERE` predicates over flattened records,
//!   evaluated with Arrow
//!
//! ## Example Usage
//!
//! ```rust
//! use ox_core::contract::ConfigContract;
//! use ox_core::experiment::{store, Experiment};
//! use ox_core::overrides::parse_overrides;
//! use ox_core::query::query_records;
//! use ox_core::resolve::resolve;
//!
//! # fn main() -> ox_core::Result<()> {
//! let contract = ConfigContract::builder().float("lr", 1e-3).int("epochs", 10).build()?;
//! let overrides = parse_overrides(&["--epochs", "3"], &contract)?;
//! let config = resolve(&contract, None, Some(&overrides))?;
//!
//! let experiment = Experiment::builder("baseline", "lr-sweep")
//!     .config(config.to_json().as_object().cloned().unwrap_or_default())
//!     .build();
//! let rows = query_records("epochs < 5 AND study = 'lr-sweep'", &[experiment])?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod contract;
mod document;
pub mod error;
pub mod experiment;
pub mod logging;
pub mod overrides;
pub mod project;
pub mod query;
pub mod resolve;
pub mod runner;
pub mod script;
pub mod tracker;

pub use error::{Error, ErrorKind, Result};
