//! Sources of versioned manifests and script files.
//!
//! An archive is opened through an [`ArchiveRegistry`], which asks each
//! registered [`ArchiveFactory`] in turn whether it understands a locator.
//! Two backends ship with the crate: a directory tree and a zip container.
//!
//! Version discovery order is unspecified. Use [`Archive::sorted_versions`]
//! (or sort by [`VersionDescriptor::version`]) before relying on order.

mod container;
mod directory;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::manifest::ManifestParser;
use crate::tasks::Task;
use crate::version::Version;

pub use container::{ContainerArchive, ContainerArchiveFactory};
pub use directory::{DirectoryArchive, DirectoryArchiveFactory};

/// One version declared by an archive, with its tasks in execution order.
#[derive(Debug, Clone)]
pub struct VersionDescriptor {
    version: Version,
    location: String,
    tasks: Vec<Arc<dyn Task>>,
}

impl VersionDescriptor {
    pub fn new(
        version: Version,
        location: impl Into<String>,
        mut tasks: Vec<Arc<dyn Task>>,
    ) -> Self {
        tasks.sort_by_key(|t| t.order());
        Self {
            version,
            location: location.into(),
            tasks,
        }
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Where the manifest lives inside its archive.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        &self.tasks
    }
}

/// A source of version descriptors and the files their tasks reference.
pub trait Archive: Send + Sync {
    /// Human readable name, usually the locator it was opened from.
    fn name(&self) -> &str;

    /// Every version in the archive, in no particular order.
    fn versions(&self) -> &[VersionDescriptor];

    /// Raw content of a file, or `None` if the archive has no such file.
    fn get_file(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Logical path of a script referenced by the manifest at `manifest_location`.
    fn resolve_script_path(&self, manifest_location: &str, script_file: &str) -> String;

    fn contains_version(&self, version: &Version) -> bool {
        self.versions().iter().any(|v| v.version() == version)
    }

    fn sorted_versions(&self) -> Vec<VersionDescriptor> {
        let mut versions = self.versions().to_vec();
        versions.sort_by(|a, b| a.version().cmp(b.version()));
        versions
    }

    fn max_version(&self) -> Option<Version> {
        self.versions().iter().map(|v| v.version()).max().cloned()
    }
}

/// Recognizes and opens one kind of archive.
pub trait ArchiveFactory: Send + Sync {
    fn can_open(&self, locator: &str) -> bool;

    fn open(&self, locator: &str, parser: &ManifestParser) -> Result<Box<dyn Archive>>;
}

/// Ordered set of archive backends.
pub struct ArchiveRegistry {
    factories: Vec<Box<dyn ArchiveFactory>>,
}

impl ArchiveRegistry {
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    pub fn register(&mut self, factory: Box<dyn ArchiveFactory>) {
        self.factories.push(factory);
    }

    /// Open `locator` with the first backend that accepts it.
    pub fn open(&self, locator: &str, parser: &ManifestParser) -> Result<Box<dyn Archive>> {
        if locator.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "archive location must not be empty".to_string(),
            ));
        }

        let factory = self
            .factories
            .iter()
            .find(|f| f.can_open(locator))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "\"{}\" is not a directory or archive that can be opened",
                    locator
                ))
            })?;

        let archive = factory.open(locator, parser)?;
        tracing::info!(
            "Opened archive {} ({} versions)",
            archive.name(),
            archive.versions().len()
        );
        Ok(archive)
    }
}

impl Default for ArchiveRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(DirectoryArchiveFactory));
        registry.register(Box::new(ContainerArchiveFactory));
        registry
    }
}

/// Fail if two manifests declare the same version value.
fn ensure_unique_versions(versions: &[VersionDescriptor]) -> Result<()> {
    let mut sorted: Vec<&VersionDescriptor> = versions.iter().collect();
    sorted.sort_by(|a, b| {
        a.version()
            .cmp(b.version())
            .then_with(|| a.location().cmp(b.location()))
    });

    match sorted.windows(2).find(|w| w[0].version() == w[1].version()) {
        Some(pair) => Err(Error::malformed(
            pair[1].location(),
            format!(
                "version {} is already declared by {}",
                pair[1].version(),
                pair[0].location()
            ),
        )),
        None => Ok(()),
    }
}

/// Convert Windows separators to forward slashes.
fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}
