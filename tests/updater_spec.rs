mod test_support;

use std::error::Error as _;

use dbroll::archive::Archive;
use dbroll::db::{SqliteVersionStore, VersionStore};
use dbroll::executor::{MemorySink, RunMode, TaskExecutor, VerifyExecutor};
use dbroll::tasks::{Task, TaskContext};
use dbroll::updater::{UpdateOutcome, Updater};
use dbroll::Error;
use speculate2::speculate;
use test_support::*;

const FAILING_SCRIPT: &str = "CREATE TABLE one (id INTEGER);
GO
INSERT INTO missing (id) VALUES (1);
GO
CREATE TABLE three (id INTEGER);";

fn row_count(db: &dbroll::db::Database, table: &str) -> i64 {
    db.connection()
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .expect("Query failed")
}

speculate! {
    before {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        let mut db = memory_db();
        let store = SqliteVersionStore::default();
        let sink = sink();
        let updater = Updater::new(&store, sink.clone());
    }

    describe "commit mode" {
        it "applies every version and records history" {
            write_version(root, "1.0", "1.0", &[
                ("tables.sql", "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);\nGO\nCREATE INDEX idx_users_name ON users(name);"),
            ]);
            write_version(root, "1.1", "1.1", &[
                ("seed.sql", "INSERT INTO users (name) VALUES ('ada');\ngo\nINSERT INTO users (name) VALUES ('grace');"),
            ]);
            let archive = open_dir(root);

            let outcome = updater.run(&mut db, &archive, None, RunMode::Commit).expect("Run failed");

            assert_eq!(outcome, UpdateOutcome::Applied { target: version("1.1"), tasks: 4 });
            assert_eq!(row_count(&db, "users"), 2);

            let history = store.executed_versions(db.connection()).expect("Query failed");
            let versions: Vec<String> = history.iter().map(|v| v.version.to_string()).collect();
            assert_eq!(versions, vec!["1.0", "1.1"]);
            assert_eq!(history[1].tasks[0].name, "seed.sql");
            let current = store.current_version(db.connection()).expect("Query failed");
            assert_eq!(current.map(|c| c.version), Some(version("1.1")));
        }

        it "reports progress for every task" {
            write_version(root, "1.0", "1.0", &[("a.sql", "CREATE TABLE a (id INTEGER);")]);
            let archive = open_dir(root);

            updater.run(&mut db, &archive, None, RunMode::Commit).expect("Run failed");

            assert_eq!(sink.lines(), vec![
                "Started task 1 of 2: Run script \"a.sql\" for version 1.0",
                "Finished task 1 of 2, 50% complete",
                "Started task 2 of 2: Record version 1.0 in history",
                "Finished task 2 of 2, 100% complete",
            ]);
        }

        it "reports an up to date database" {
            write_version(root, "1.0", "1.0", &[("a.sql", "CREATE TABLE a (id INTEGER);")]);
            let archive = open_dir(root);
            updater.run(&mut db, &archive, None, RunMode::Commit).expect("Run failed");

            let outcome = updater.run(&mut db, &archive, None, RunMode::Commit).expect("Run failed");

            assert_eq!(outcome, UpdateOutcome::UpToDate);
            assert_eq!(sink.lines().last().map(String::as_str), Some("The database is already up to date."));
        }

        it "keeps nothing from a run in which any task fails" {
            write_version(root, "1.0", "1.0", &[("a.sql", "CREATE TABLE a (id INTEGER);")]);
            write_version(root, "1.1", "1.1", &[("broken.sql", FAILING_SCRIPT)]);
            let archive = open_dir(root);

            let err = updater.run(&mut db, &archive, None, RunMode::Commit).unwrap_err();

            assert!(matches!(err, Error::TaskExecution { .. }));
            assert!(!table_exists(&db, "a"));
            assert!(!table_exists(&db, "one"));
            assert!(!store.schema_exists(db.connection()).expect("Query failed"));
        }

        it "reports a script missing from the archive" {
            write_version(root, "1.0", "1.0", &[("a.sql", "SELECT 1;")]);
            std::fs::remove_file(root.join("1.0/a.sql")).unwrap();
            let archive = open_dir(root);

            let err = updater.run(&mut db, &archive, None, RunMode::Commit).unwrap_err();

            assert_eq!(err.to_string(), "the script file \"1.0/a.sql\" does not exist in the archive.");
        }

        it "runs scripts from a zip archive" {
            let path = root.join("release.zip");
            write_zip(&path, &[
                ("db/1.0/database.xml", &manifest("1.0", &["a.sql"])),
                ("db/1.0/a.sql", "CREATE TABLE zipped (id INTEGER);\nGO\nINSERT INTO zipped VALUES (7);"),
            ]);
            let archive = open_zip(&path);

            updater.run(&mut db, &archive, None, RunMode::Commit).expect("Run failed");

            assert_eq!(row_count(&db, "zipped"), 1);
        }
    }

    describe "script task" {
        it "stops at the failing batch and wraps its error" {
            write_version(root, "1.0", "1.0", &[("broken.sql", FAILING_SCRIPT)]);
            let archive = open_dir(root);
            let task = archive.versions()[0].tasks()[0].clone();
            let ctx = TaskContext { conn: db.connection(), archive: &archive, store: &store };

            let err = task.execute(&ctx).unwrap_err();

            let cause = err.source().expect("error has a source").to_string();
            assert!(cause.contains("no such table: missing"), "{}", cause);
            assert_eq!(err.to_string(), format!("Failed to execute script \"1.0/broken.sql\". {}", cause));
            assert!(table_exists(&db, "one"));
            assert!(!table_exists(&db, "three"));
        }

        it "strips a byte order mark" {
            write_version(root, "1.0", "1.0", &[("bom.sql", "\u{feff}CREATE TABLE bom (id INTEGER);")]);
            let archive = open_dir(root);
            let task = archive.versions()[0].tasks()[0].clone();
            let ctx = TaskContext { conn: db.connection(), archive: &archive, store: &store };

            task.execute(&ctx).expect("Script failed");

            assert!(table_exists(&db, "bom"));
        }
    }

    describe "verify mode" {
        it "runs every script but keeps no changes" {
            write_version(root, "1.0", "1.0", &[
                ("a.sql", "CREATE TABLE a (id INTEGER);"),
                ("b.sql", "INSERT INTO a (id) VALUES (1);"),
            ]);
            let archive = open_dir(root);

            let outcome = updater.run(&mut db, &archive, None, RunMode::Verify).expect("Run failed");

            assert_eq!(outcome, UpdateOutcome::Verified { target: version("1.0"), tasks: 3 });
            assert!(!table_exists(&db, "a"));
            assert!(!store.schema_exists(db.connection()).expect("Query failed"));
            assert_eq!(sink.lines().len(), 6);
        }

        it "surfaces failures from scripts it runs" {
            write_version(root, "1.0", "1.0", &[("broken.sql", FAILING_SCRIPT)]);
            let archive = open_dir(root);

            let err = updater.run(&mut db, &archive, None, RunMode::Verify).unwrap_err();

            assert!(err.to_string().starts_with("Failed to execute script \"1.0/broken.sql\". "));
            assert!(!table_exists(&db, "one"));
        }

        it "leaves existing history untouched" {
            write_version(root, "1.0", "1.0", &[("a.sql", "CREATE TABLE a (id INTEGER);")]);
            updater.run(&mut db, &open_dir(root), None, RunMode::Commit).expect("Run failed");
            write_version(root, "1.1", "1.1", &[("b.sql", "CREATE TABLE b (id INTEGER);")]);

            updater.run(&mut db, &open_dir(root), None, RunMode::Verify).expect("Run failed");

            let history = store.executed_versions(db.connection()).expect("Query failed");
            assert_eq!(history.len(), 1);
            assert!(!table_exists(&db, "b"));
        }

        it "executes batches against the connection while the run is open" {
            write_version(root, "1.0", "1.0", &[("a.sql", "CREATE TABLE a (id INTEGER);\nGO\nINSERT INTO a VALUES (1);")]);
            let archive = open_dir(root);
            let verify_sink = std::sync::Arc::new(MemorySink::new());
            let mut executor = VerifyExecutor::new(verify_sink);
            for task in archive.versions()[0].tasks() {
                executor.add_task(task.clone());
            }

            let tx = db.connection_mut().transaction().expect("Failed to begin");
            let ctx = TaskContext { conn: &tx, archive: &archive, store: &store };
            let ran = executor.execute_tasks(&ctx).expect("Run failed");
            let inside: i64 = tx.query_row("SELECT COUNT(*) FROM a", [], |row| row.get(0)).unwrap();
            assert!(!executor.commits());
            tx.rollback().expect("Failed to roll back");

            assert_eq!(ran, 1);
            assert_eq!(inside, 1);
            assert!(!executor.has_tasks());
            assert!(!table_exists(&db, "a"));
        }
    }

    describe "simulate mode" {
        it "reports the plan without touching the database" {
            write_version(root, "1.0", "1.0", &[("a.sql", "CREATE TABLE a (id INTEGER);")]);
            let archive = open_dir(root);

            let outcome = updater.run(&mut db, &archive, None, RunMode::Simulate).expect("Run failed");

            assert_eq!(outcome, UpdateOutcome::Simulated { target: version("1.0"), tasks: 2 });
            assert_eq!(sink.lines(), vec![
                "Would perform task 1 of 2: Run script \"a.sql\" for version 1.0",
                "Would perform task 2 of 2: Record version 1.0 in history",
            ]);
            assert!(!table_exists(&db, "a"));
            assert!(!store.schema_exists(db.connection()).expect("Query failed"));
        }

        it "does not need the scripts to exist" {
            write_version(root, "1.0", "1.0", &[("a.sql", "SELECT 1;")]);
            std::fs::remove_file(root.join("1.0/a.sql")).unwrap();
            let archive = open_dir(root);

            let outcome = updater.run(&mut db, &archive, None, RunMode::Simulate).expect("Run failed");

            assert!(matches!(outcome, UpdateOutcome::Simulated { tasks: 2, .. }));
        }
    }
}
