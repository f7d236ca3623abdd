use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rayon::prelude::*;

use super::{
    ensure_unique_versions, normalize_separators, Archive, ArchiveFactory, VersionDescriptor,
};
use crate::error::{Error, Result};
use crate::manifest::{ManifestParser, MANIFEST_FILE_NAME};

/// Opens any existing directory as a [`DirectoryArchive`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryArchiveFactory;

impl ArchiveFactory for DirectoryArchiveFactory {
    fn can_open(&self, locator: &str) -> bool {
        !locator.trim().is_empty() && Path::new(locator).is_dir()
    }

    fn open(&self, locator: &str, parser: &ManifestParser) -> Result<Box<dyn Archive>> {
        Ok(Box::new(DirectoryArchive::open(locator, parser)?))
    }
}

/// A directory tree holding any number of `database.xml` manifests.
///
/// Manifest locations are paths relative to the root, with forward slashes.
/// Scripts resolve against the name of the directory that directly contains
/// their manifest, so `1.0/database.xml` + `tables.sql` is `1.0/tables.sql`.
#[derive(Debug)]
pub struct DirectoryArchive {
    name: String,
    root: PathBuf,
    versions: Vec<VersionDescriptor>,
}

impl DirectoryArchive {
    /// Open `root` and parse every manifest below it.
    ///
    /// Manifests are parsed in parallel, so the resulting version order is not
    /// deterministic.
    pub fn open(root: impl AsRef<Path>, parser: &ManifestParser) -> Result<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(Error::InvalidArgument(
                "archive directory must not be empty".to_string(),
            ));
        }
        if !root.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "archive directory \"{}\" does not exist",
                root.display()
            )));
        }

        let manifests = find_manifests(root)?;
        let collected = Mutex::new(Vec::with_capacity(manifests.len()));

        manifests.par_iter().try_for_each(|path| -> Result<()> {
            let location = relative_location(root, path);
            let document = std::fs::read(path)?;
            let descriptor = parser.parse(&document, &location)?;
            collected
                .lock()
                .expect("manifest collector poisoned")
                .push(descriptor);
            Ok(())
        })?;

        let versions = collected
            .into_inner()
            .expect("manifest collector poisoned");
        ensure_unique_versions(&versions)?;

        Ok(Self {
            name: root.display().to_string(),
            root: root.to_path_buf(),
            versions,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Archive for DirectoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn versions(&self) -> &[VersionDescriptor] {
        &self.versions
    }

    fn get_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.root.join(normalize_separators(path));
        if !full.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(full)?))
    }

    fn resolve_script_path(&self, manifest_location: &str, script_file: &str) -> String {
        let script = normalize_separators(script_file);
        let location = normalize_separators(manifest_location);
        let directory = Path::new(&location)
            .parent()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned());

        match directory {
            Some(dir) => format!("{}/{}", dir, script),
            None => script,
        }
    }
}

/// Every file named `database.xml` below `dir`, at any depth.
///
/// Symbolic links are not followed.
fn find_manifests(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_symlink() {
            tracing::debug!("Not following symbolic link {}", path.display());
        } else if file_type.is_dir() {
            files.extend(find_manifests(&path)?);
        } else if entry.file_name() == MANIFEST_FILE_NAME {
            files.push(path);
        }
    }

    Ok(files)
}

fn relative_location(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    normalize_separators(&relative.to_string_lossy())
}
