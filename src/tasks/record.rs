use chrono::Utc;

use super::{Task, TaskContext};
use crate::error::Result;
use crate::models::ExecutedVersion;
use crate::version::Version;

/// Writes version history once every real task of a version has run.
///
/// The planner appends exactly one of these after the tasks it scheduled for a
/// version. When resuming the boundary version it carries the existing record
/// so the new tasks are appended to it instead of creating a second row.
#[derive(Debug, Clone)]
pub struct RecordVersionTask {
    order: usize,
    name: String,
    version: Version,
    existing: Option<ExecutedVersion>,
    tasks: Vec<(String, usize)>,
}

impl RecordVersionTask {
    pub fn new(version: Version, existing: Option<ExecutedVersion>, order: usize) -> Self {
        Self {
            order,
            name: format!("record version {}", version),
            version,
            existing,
            tasks: Vec::new(),
        }
    }

    /// Register a scheduled task to be recorded when this task runs.
    pub fn push_task(&mut self, name: &str, order: usize) {
        self.tasks.push((name.to_string(), order));
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn is_update(&self) -> bool {
        self.existing.is_some()
    }

    /// The history record as it will look after this task runs.
    pub fn record(&self) -> ExecutedVersion {
        let mut record = self
            .existing
            .clone()
            .unwrap_or_else(|| ExecutedVersion::new(self.version.clone()));
        for (name, order) in &self.tasks {
            record.add_task(name, *order);
        }
        record.updated_at = Utc::now();
        record
    }
}

impl Task for RecordVersionTask {
    fn order(&self) -> usize {
        self.order
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        if self.is_update() {
            format!("Update history for version {}", self.version)
        } else {
            format!("Record version {} in history", self.version)
        }
    }

    fn execute(&self, ctx: &TaskContext<'_>) -> Result<()> {
        ctx.store.record_version(ctx.conn, &self.record())
    }
}
