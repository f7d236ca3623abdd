use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dbroll::archive::ArchiveRegistry;
use dbroll::config::Settings;
use dbroll::db::{Database, SqliteVersionStore, VersionStore};
use dbroll::executor::{ConsoleSink, RunMode};
use dbroll::updater::{UpdateOutcome, Updater};

#[derive(Parser)]
#[command(name = "dbroll")]
#[command(about = "Apply versioned database change-scripts incrementally")]
struct Cli {
    /// Target database (overrides DBROLL_DATABASE)
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Version scheme: dotted or integer (overrides DBROLL_VERSION_SCHEME)
    #[arg(long, global = true)]
    scheme: Option<String>,

    /// Batch separator line (overrides DBROLL_BATCH_SEPARATOR)
    #[arg(long, global = true)]
    separator: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the database up to a version from an archive
    Update {
        /// Archive directory or zip file
        archive: String,

        /// Version to update to (defaults to the newest in the archive)
        #[arg(short, long)]
        target: Option<String>,

        /// Show what would run without touching the database
        #[arg(long, conflicts_with = "verify")]
        simulate: bool,

        /// Run every script, then roll everything back
        #[arg(long)]
        verify: bool,
    },
    /// List the versions declared by an archive
    Versions {
        /// Archive directory or zip file
        archive: String,
    },
    /// Show the version history recorded in the database
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Logs go to stderr so stdout carries only the run transcript.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dbroll=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(database) = cli.database {
        settings.database = Some(database);
    }
    if let Some(scheme) = cli.scheme {
        settings.scheme = scheme;
    }
    if let Some(separator) = cli.separator {
        settings.separator = separator;
    }

    settings.validate()?;
    let scheme = settings.version_scheme()?;
    let store = SqliteVersionStore::new(scheme);

    match cli.command {
        Commands::Update {
            archive,
            target,
            simulate,
            verify,
        } => {
            let parser = settings.manifest_parser()?;
            let archive = ArchiveRegistry::default()
                .open(&archive, &parser)
                .with_context(|| format!("Failed to open archive {}", archive))?;
            let target = target.map(|t| scheme.parse(&t)).transpose()?;
            let mode = if simulate {
                RunMode::Simulate
            } else if verify {
                RunMode::Verify
            } else {
                RunMode::Commit
            };

            let mut db = Database::connect(settings.database()?)?;
            let updater = Updater::new(&store, Arc::new(ConsoleSink));
            match updater.run(&mut db, &*archive, target.as_ref(), mode)? {
                UpdateOutcome::UpToDate => {}
                UpdateOutcome::Applied { target, tasks } => {
                    println!("Updated the database to version {} ({} tasks).", target, tasks)
                }
                UpdateOutcome::Verified { target, tasks } => println!(
                    "Verified {} tasks up to version {}; no changes were kept.",
                    tasks, target
                ),
                UpdateOutcome::Simulated { target, tasks } => println!(
                    "{} tasks would be performed to reach version {}.",
                    tasks, target
                ),
            }
        }
        Commands::Versions { archive } => {
            let parser = settings.manifest_parser()?;
            let archive = ArchiveRegistry::default()
                .open(&archive, &parser)
                .with_context(|| format!("Failed to open archive {}", archive))?;
            for descriptor in archive.sorted_versions() {
                println!(
                    "{}\t{} tasks\t{}",
                    descriptor.version(),
                    descriptor.tasks().len(),
                    descriptor.location()
                );
            }
        }
        Commands::Status { json } => {
            let db = Database::connect(settings.database()?)?;
            let conn = db.connection();
            let history = if store.schema_exists(conn)? {
                store.executed_versions(conn)?
            } else {
                Vec::new()
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else if let Some(current) = history.last() {
                println!(
                    "Current version: {} (updated {})",
                    current.version,
                    current.updated_at.to_rfc3339()
                );
                for task in &current.tasks {
                    println!("  {}. {}", task.order, task.name);
                }
            } else {
                println!("No versions have been applied.");
            }
        }
    }

    Ok(())
}
