//! Runs a planned task queue.
//!
//! Executors never open or close transactions themselves. The caller opens one
//! transaction around the whole queue and asks [`TaskExecutor::commits`] whether
//! to commit it afterwards.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::tasks::{Task, TaskContext};

/// Receives the run transcript.
pub trait ProgressSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Prints the transcript to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn write_line(&self, line: &str) {
        println!("{}", line);
    }
}

/// Sends the transcript to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn write_line(&self, line: &str) {
        tracing::info!("{}", line);
    }
}

/// Keeps the transcript in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("sink lock poisoned").clone()
    }
}

impl ProgressSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .expect("sink lock poisoned")
            .push(line.to_string());
    }
}

/// What happens to the work a run performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Run every task and commit.
    #[default]
    Commit,
    /// Run every task for real, then discard the transaction.
    Verify,
    /// Report what would run without touching the database.
    Simulate,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Verify => "verify",
            Self::Simulate => "simulate",
        }
    }

    pub fn executor(&self, sink: Arc<dyn ProgressSink>) -> Box<dyn TaskExecutor> {
        match self {
            Self::Commit => Box::new(CommittingExecutor::new(sink)),
            Self::Verify => Box::new(VerifyExecutor::new(sink)),
            Self::Simulate => Box::new(SimulatingExecutor::new(sink)),
        }
    }
}

/// Tasks waiting to run and the sink their progress goes to.
pub struct TaskQueue {
    tasks: Vec<Arc<dyn Task>>,
    sink: Arc<dyn ProgressSink>,
}

impl TaskQueue {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            tasks: Vec::new(),
            sink,
        }
    }

    pub fn push(&mut self, task: Arc<dyn Task>) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn take(&mut self) -> Vec<Arc<dyn Task>> {
        std::mem::take(&mut self.tasks)
    }

    /// Execute and drain every queued task in order, reporting progress.
    fn run(&mut self, ctx: &TaskContext<'_>) -> Result<usize> {
        let tasks = self.take();
        let total = tasks.len();

        for (i, task) in tasks.iter().enumerate() {
            let step = i + 1;
            self.sink.write_line(&format!(
                "Started task {} of {}: {}",
                step,
                total,
                task.description()
            ));

            task.execute(ctx)?;

            self.sink.write_line(&format!(
                "Finished task {} of {}, {}% complete",
                step,
                total,
                step * 100 / total
            ));
        }

        Ok(total)
    }
}

/// A sequential task queue.
///
/// Implementors expose their [`TaskQueue`] and decide how it runs and whether
/// the caller commits.
pub trait TaskExecutor {
    fn queue(&self) -> &TaskQueue;

    fn queue_mut(&mut self) -> &mut TaskQueue;

    fn add_task(&mut self, task: Arc<dyn Task>) {
        self.queue_mut().push(task);
    }

    fn has_tasks(&self) -> bool {
        !self.queue().is_empty()
    }

    fn task_count(&self) -> usize {
        self.queue().len()
    }

    /// Whether the caller should commit the transaction after a successful run.
    fn commits(&self) -> bool;

    /// Run or report every queued task in order, emptying the queue.
    ///
    /// Stops at the first failing task and returns its error.
    fn execute_tasks(&mut self, ctx: &TaskContext<'_>) -> Result<usize>;
}

/// Runs every task; the caller commits afterwards.
pub struct CommittingExecutor {
    queue: TaskQueue,
}

impl CommittingExecutor {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            queue: TaskQueue::new(sink),
        }
    }
}

impl TaskExecutor for CommittingExecutor {
    fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    fn queue_mut(&mut self) -> &mut TaskQueue {
        &mut self.queue
    }

    fn commits(&self) -> bool {
        true
    }

    fn execute_tasks(&mut self, ctx: &TaskContext<'_>) -> Result<usize> {
        self.queue.run(ctx)
    }
}

/// Runs every task for real so scripts are exercised, but never commits.
pub struct VerifyExecutor {
    queue: TaskQueue,
}

impl VerifyExecutor {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            queue: TaskQueue::new(sink),
        }
    }
}

impl TaskExecutor for VerifyExecutor {
    fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    fn queue_mut(&mut self) -> &mut TaskQueue {
        &mut self.queue
    }

    fn commits(&self) -> bool {
        false
    }

    fn execute_tasks(&mut self, ctx: &TaskContext<'_>) -> Result<usize> {
        self.queue.run(ctx)
    }
}

/// Reports the plan without executing anything.
pub struct SimulatingExecutor {
    queue: TaskQueue,
}

impl SimulatingExecutor {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            queue: TaskQueue::new(sink),
        }
    }
}

impl TaskExecutor for SimulatingExecutor {
    fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    fn queue_mut(&mut self) -> &mut TaskQueue {
        &mut self.queue
    }

    fn commits(&self) -> bool {
        false
    }

    fn execute_tasks(&mut self, _ctx: &TaskContext<'_>) -> Result<usize> {
        let tasks = self.queue.take();
        let total = tasks.len();
        for (i, task) in tasks.iter().enumerate() {
            self.queue.sink.write_line(&format!(
                "Would perform task {} of {}: {}",
                i + 1,
                total,
                task.description()
            ));
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{Archive, VersionDescriptor};
    use crate::db::{Database, SqliteVersionStore};
    use crate::version::VersionScheme;

    #[derive(Debug)]
    struct NoteTask(&'static str);

    impl Task for NoteTask {
        fn order(&self) -> usize {
            0
        }

        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> String {
            format!("note {}", self.0)
        }

        fn execute(&self, ctx: &TaskContext<'_>) -> Result<()> {
            ctx.conn
                .execute("INSERT INTO notes (name) VALUES (?)", [self.0])?;
            Ok(())
        }
    }

    struct EmptyArchive;

    impl Archive for EmptyArchive {
        fn name(&self) -> &str {
            "empty"
        }

        fn versions(&self) -> &[VersionDescriptor] {
            &[]
        }

        fn get_file(&self, _path: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn resolve_script_path(&self, _manifest_location: &str, script_file: &str) -> String {
            script_file.to_string()
        }
    }

    fn note_count(db: &Database) -> i64 {
        db.connection()
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
            .unwrap()
    }

    fn run(mode: RunMode) -> (i64, Vec<String>, bool) {
        let db = Database::open_memory().unwrap();
        db.connection()
            .execute_batch("CREATE TABLE notes (name TEXT)")
            .unwrap();
        let store = SqliteVersionStore::new(VersionScheme::Dotted);
        let sink = Arc::new(MemorySink::new());
        let mut executor = mode.executor(sink.clone());

        executor.add_task(Arc::new(NoteTask("a")));
        executor.add_task(Arc::new(NoteTask("b")));
        assert!(executor.has_tasks());
        assert_eq!(executor.task_count(), 2);

        let ctx = TaskContext {
            conn: db.connection(),
            archive: &EmptyArchive,
            store: &store,
        };
        assert_eq!(executor.execute_tasks(&ctx).unwrap(), 2);
        assert!(!executor.has_tasks());

        (note_count(&db), sink.lines(), executor.commits())
    }

    #[test]
    fn test_commit_runs_tasks_and_commits() {
        let (count, lines, commits) = run(RunMode::Commit);
        assert_eq!(count, 2);
        assert_eq!(lines.len(), 4);
        assert!(commits);
    }

    #[test]
    fn test_verify_runs_tasks_without_committing() {
        let (count, lines, commits) = run(RunMode::Verify);
        assert_eq!(count, 2);
        assert_eq!(lines[3], "Finished task 2 of 2, 100% complete");
        assert!(!commits);
    }

    #[test]
    fn test_simulate_only_reports() {
        let (count, lines, commits) = run(RunMode::Simulate);
        assert_eq!(count, 0);
        assert_eq!(
            lines,
            vec!["Would perform task 1 of 2: note a", "Would perform task 2 of 2: note b"]
        );
        assert!(!commits);
    }
}
