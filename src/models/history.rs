use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::version::Version;

/// A database version recorded in the history store.
///
/// `id` is `None` until the record has been written once; `created_at` is
/// stamped on first insert and `updated_at` on every write.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedVersion {
    pub id: Option<Uuid>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tasks in execution order.
    pub tasks: Vec<ExecutedTask>,
}

impl ExecutedVersion {
    /// A fresh, not yet persisted record for `version`.
    pub fn new(version: Version) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            version,
            created_at: now,
            updated_at: now,
            tasks: Vec::new(),
        }
    }

    /// True if a task with this name (ignoring case) is already recorded.
    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| same_task_name(&t.name, name))
    }

    /// Append a task unless one with the same name is already recorded.
    pub fn add_task(&mut self, name: &str, order: usize) {
        if !self.has_task(name) {
            self.tasks.push(ExecutedTask::new(name, order));
        }
    }
}

/// Task identity: names compare with full Unicode case folding.
pub fn same_task_name(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// A task recorded against an [`ExecutedVersion`].
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedTask {
    pub id: Option<Uuid>,
    pub name: String,
    pub order: usize,
    pub updated_at: DateTime<Utc>,
}

impl ExecutedTask {
    pub fn new(name: impl Into<String>, order: usize) -> Self {
        Self {
            id: None,
            name: name.into(),
            order,
            updated_at: Utc::now(),
        }
    }
}
