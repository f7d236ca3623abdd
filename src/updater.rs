use std::sync::Arc;

use serde::Serialize;

use crate::archive::Archive;
use crate::db::{Database, VersionStore};
use crate::error::Result;
use crate::executor::{ProgressSink, RunMode};
use crate::planner::{MigrationPlanner, Plan};
use crate::tasks::TaskContext;
use crate::version::Version;

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Nothing to do.
    UpToDate,
    /// Every task ran and the transaction was committed.
    Applied { target: Version, tasks: usize },
    /// Every task ran and the transaction was discarded.
    Verified { target: Version, tasks: usize },
    /// Tasks were reported, not run.
    Simulated { target: Version, tasks: usize },
}

/// Plans and applies archive versions to a database.
///
/// A whole run shares one transaction: it either commits every scheduled task
/// together with the version history or leaves the database untouched.
pub struct Updater<'a> {
    store: &'a dyn VersionStore,
    sink: Arc<dyn ProgressSink>,
}

impl<'a> Updater<'a> {
    pub fn new(store: &'a dyn VersionStore, sink: Arc<dyn ProgressSink>) -> Self {
        Self { store, sink }
    }

    /// Read the current version once and plan against it.
    pub fn plan(
        &self,
        db: &Database,
        archive: &dyn Archive,
        target: Option<&Version>,
    ) -> Result<Plan> {
        let conn = db.connection();
        let current = if self.store.schema_exists(conn)? {
            self.store.current_version(conn)?
        } else {
            None
        };

        MigrationPlanner::new(self.store).plan(archive, current.as_ref(), target)
    }

    pub fn run(
        &self,
        db: &mut Database,
        archive: &dyn Archive,
        target: Option<&Version>,
        mode: RunMode,
    ) -> Result<UpdateOutcome> {
        let plan = self.plan(db, archive, target)?;
        let Some(target) = plan.target().cloned().filter(|_| !plan.is_empty()) else {
            self.sink.write_line("The database is already up to date.");
            return Ok(UpdateOutcome::UpToDate);
        };

        let mut executor = mode.executor(Arc::clone(&self.sink));
        for task in plan.tasks() {
            executor.add_task(Arc::clone(task));
        }

        if mode == RunMode::Simulate {
            let ctx = TaskContext {
                conn: db.connection(),
                archive,
                store: self.store,
            };
            let tasks = executor.execute_tasks(&ctx)?;
            return Ok(UpdateOutcome::Simulated { target, tasks });
        }

        let tx = db.connection_mut().transaction()?;
        self.store.ensure_schema(&tx)?;

        let ctx = TaskContext {
            conn: &tx,
            archive,
            store: self.store,
        };
        let tasks = executor.execute_tasks(&ctx)?;

        if executor.commits() {
            tx.commit()?;
            tracing::info!("Committed {} tasks up to version {}", tasks, target);
            Ok(UpdateOutcome::Applied { target, tasks })
        } else {
            tx.rollback()?;
            tracing::info!(
                "Verified {} tasks up to version {}, changes discarded",
                tasks,
                target
            );
            Ok(UpdateOutcome::Verified { target, tasks })
        }
    }
}
