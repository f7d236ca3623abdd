//! Turns "what is installed" and "what the archive declares" into a task queue.
//!
//! Versions are visited in ascending order. Versions below the current one are
//! skipped, versions above the target end the walk. A version that has never
//! been recorded runs every task ([`PlanMode::Fresh`]); the version equal to the
//! current one (the boundary version) runs only tasks whose names are not yet
//! recorded ([`PlanMode::Resume`]). Every version that contributes tasks is
//! closed by a [`RecordVersionTask`].

use std::sync::Arc;

use crate::archive::Archive;
use crate::db::VersionStore;
use crate::error::{Error, Result};
use crate::models::ExecutedVersion;
use crate::tasks::{RecordVersionTask, Task};
use crate::version::Version;

/// How the tasks of one version are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// The version was never recorded; every task runs.
    Fresh,
    /// The version is the current one; only unrecorded tasks run.
    Resume,
}

/// An ordered queue of tasks ending at a target version.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    target: Option<Version>,
    tasks: Vec<Arc<dyn Task>>,
}

impl Plan {
    pub fn target(&self) -> Option<&Version> {
        self.target.as_ref()
    }

    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// An empty plan means the database is up to date.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.description()).collect()
    }
}

pub struct MigrationPlanner<'a> {
    store: &'a dyn VersionStore,
}

impl<'a> MigrationPlanner<'a> {
    pub fn new(store: &'a dyn VersionStore) -> Self {
        Self { store }
    }

    /// Compute the plan that brings `current` up to `target`.
    ///
    /// Without an explicit target the archive's greatest version is used. An
    /// explicit target the archive does not contain fails with
    /// [`Error::VersionNotFound`] before anything is scheduled.
    pub fn plan(
        &self,
        archive: &dyn Archive,
        current: Option<&ExecutedVersion>,
        target: Option<&Version>,
    ) -> Result<Plan> {
        let target = match target {
            Some(version) => version.clone(),
            None => match archive.max_version() {
                Some(version) => version,
                None => {
                    tracing::warn!("Archive {} declares no versions", archive.name());
                    return Ok(Plan::default());
                }
            },
        };

        if !archive.contains_version(&target) {
            return Err(Error::VersionNotFound(target.to_string()));
        }

        let mut tasks: Vec<Arc<dyn Task>> = Vec::new();

        for descriptor in archive.sorted_versions() {
            let version = descriptor.version();

            if current.is_some_and(|c| &c.version > version) {
                continue;
            }
            if version > &target {
                break;
            }

            let mode = match current {
                Some(c) if &c.version == version => PlanMode::Resume,
                _ => PlanMode::Fresh,
            };

            let mut scheduled: Vec<Arc<dyn Task>> = Vec::new();
            for task in descriptor.tasks() {
                let run = match mode {
                    PlanMode::Fresh => true,
                    PlanMode::Resume => !self.store.has_executed_task(current, version, &**task),
                };
                if run {
                    scheduled.push(Arc::clone(task));
                }
            }

            let Some(last) = scheduled.last() else {
                continue;
            };

            let existing = match mode {
                PlanMode::Resume => current.cloned(),
                PlanMode::Fresh => None,
            };
            let mut record = RecordVersionTask::new(version.clone(), existing, last.order() + 1);
            for task in &scheduled {
                record.push_task(task.name(), task.order());
            }

            tracing::debug!(
                "Scheduling {} tasks for version {} ({:?})",
                scheduled.len(),
                version,
                mode
            );
            tasks.extend(scheduled);
            tasks.push(Arc::new(record));
        }

        tracing::info!("Planned {} tasks up to version {}", tasks.len(), target);

        Ok(Plan {
            target: Some(target),
            tasks,
        })
    }
}
