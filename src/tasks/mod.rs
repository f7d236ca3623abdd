//! Units of change work scheduled by the planner.
//!
//! Tasks are plain values: a task remembers the version and manifest location
//! it came from, and receives the archive, connection and history store through
//! [`TaskContext`] when it runs.

mod record;
mod script;

use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;

use crate::archive::Archive;
use crate::db::VersionStore;
use crate::error::Result;
use crate::manifest::ManifestElement;
use crate::version::Version;

pub use record::RecordVersionTask;
pub use script::{BatchSplitter, ScriptTask, ScriptTaskFactory, DEFAULT_SEPARATOR};

/// Everything a running task may touch.
pub struct TaskContext<'a> {
    pub conn: &'a Connection,
    pub archive: &'a dyn Archive,
    pub store: &'a dyn VersionStore,
}

/// One unit of change work.
pub trait Task: Send + Sync + fmt::Debug {
    /// Zero-based position within the owning version.
    fn order(&self) -> usize;

    /// Identity recorded in the history store. Compared case-insensitively.
    fn name(&self) -> &str;

    fn description(&self) -> String;

    fn execute(&self, ctx: &TaskContext<'_>) -> Result<()>;
}

/// Where a manifest element was declared.
#[derive(Debug, Clone)]
pub struct TaskSource {
    pub version: Version,
    pub manifest_location: String,
}

/// Builds tasks from manifest elements. Factories are asked in registration
/// order and the first one that accepts an element builds its task.
pub trait TaskFactory: Send + Sync {
    fn can_create(&self, element: &ManifestElement) -> bool;

    fn create(
        &self,
        element: &ManifestElement,
        order: usize,
        source: &TaskSource,
    ) -> Result<Arc<dyn Task>>;
}
