//! dbroll applies versioned sets of database change-scripts incrementally.
//!
//! An [`archive::Archive`] declares versions through `database.xml` manifests.
//! The [`planner::MigrationPlanner`] compares them with the history kept by a
//! [`db::VersionStore`] and produces a [`planner::Plan`], which an
//! [`executor::TaskExecutor`] runs inside a single transaction. The
//! [`updater::Updater`] wires these together.

pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod models;
pub mod planner;
pub mod tasks;
pub mod updater;
pub mod version;

pub use error::{Error, Result};
