use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use zip::result::ZipError;
use zip::ZipArchive;

use super::{
    ensure_unique_versions, normalize_separators, Archive, ArchiveFactory, VersionDescriptor,
};
use crate::error::{Error, Result};
use crate::manifest::{ManifestParser, MANIFEST_FILE_NAME};

const ZIP_SIGNATURES: [&[u8; 4]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];

/// Opens zip files, recognized by their leading signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerArchiveFactory;

impl ArchiveFactory for ContainerArchiveFactory {
    fn can_open(&self, locator: &str) -> bool {
        let path = Path::new(locator);
        if locator.trim().is_empty() || !path.is_file() {
            return false;
        }

        let mut signature = [0u8; 4];
        File::open(path)
            .and_then(|mut f| f.read_exact(&mut signature))
            .map(|_| ZIP_SIGNATURES.iter().any(|s| **s == signature))
            .unwrap_or(false)
    }

    fn open(&self, locator: &str, parser: &ManifestParser) -> Result<Box<dyn Archive>> {
        Ok(Box::new(ContainerArchive::open(locator, parser)?))
    }
}

/// A zip file whose entries named `database.xml` are manifests.
///
/// Manifest locations are entry names. Scripts resolve against the full
/// directory portion of the manifest entry.
pub struct ContainerArchive {
    name: String,
    zip: Mutex<ZipArchive<File>>,
    versions: Vec<VersionDescriptor>,
}

impl ContainerArchive {
    /// Open the zip at `path` and parse its manifests one after another.
    pub fn open(path: impl AsRef<Path>, parser: &ManifestParser) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument(
                "archive file must not be empty".to_string(),
            ));
        }
        if !path.is_file() {
            return Err(Error::InvalidArgument(format!(
                "archive file \"{}\" does not exist",
                path.display()
            )));
        }

        let mut zip = ZipArchive::new(File::open(path)?)?;
        let mut versions = Vec::new();

        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            if !entry.is_file() || !is_manifest(entry.name()) {
                continue;
            }

            let location = entry.name().to_string();
            let mut document = Vec::new();
            entry.read_to_end(&mut document)?;
            versions.push(parser.parse(&document, &location)?);
        }
        ensure_unique_versions(&versions)?;

        Ok(Self {
            name: path.display().to_string(),
            zip: Mutex::new(zip),
            versions,
        })
    }
}

impl Archive for ContainerArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn versions(&self) -> &[VersionDescriptor] {
        &self.versions
    }

    fn get_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let wanted = normalize_separators(path);
        let mut zip = self.zip.lock().expect("archive lock poisoned");

        let Some(entry_name) = zip
            .file_names()
            .find(|name| normalize_separators(name) == wanted)
            .map(str::to_string)
        else {
            return Ok(None);
        };

        let mut entry = match zip.by_name(&entry_name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !entry.is_file() {
            return Ok(None);
        }

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        Ok(Some(content))
    }

    fn resolve_script_path(&self, manifest_location: &str, script_file: &str) -> String {
        let location = normalize_separators(manifest_location);
        let script = normalize_separators(script_file);
        match location.rfind('/') {
            Some(i) => format!("{}/{}", &location[..i], script),
            None => script,
        }
    }
}

fn is_manifest(entry_name: &str) -> bool {
    entry_name
        .rsplit(['/', '\\'])
        .next()
        .map(|file| file == MANIFEST_FILE_NAME)
        .unwrap_or(false)
}
