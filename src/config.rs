//! Runtime settings.
//!
//! Settings are layered: a JSON settings file, then environment variables,
//! then command-line flags (applied by the binary). Recognized variables:
//! - `DBROLL_DATABASE` - target database path or `:memory:`
//! - `DBROLL_VERSION_SCHEME` - `dotted` (default) or `integer`
//! - `DBROLL_BATCH_SEPARATOR` - script batch separator (default `GO`)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::manifest::ManifestParser;
use crate::tasks::{BatchSplitter, DEFAULT_SEPARATOR};
use crate::version::VersionScheme;

const APP_NAME: &str = "dbroll";
const SETTINGS_FILE: &str = "settings.json";

pub const DATABASE_VAR: &str = "DBROLL_DATABASE";
pub const SCHEME_VAR: &str = "DBROLL_VERSION_SCHEME";
pub const SEPARATOR_VAR: &str = "DBROLL_BATCH_SEPARATOR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Target database locator.
    pub database: Option<String>,
    /// Version scheme name, see [`VersionScheme::from_str`].
    pub scheme: String,
    /// Line that splits a script into batches.
    pub separator: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: None,
            scheme: VersionScheme::default().as_str().to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl Settings {
    /// Settings file, then environment. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let settings = match default_settings_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        settings.with_env(|name| std::env::var(name).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content).map_err(|e| {
            Error::InvalidArgument(format!(
                "failed to parse settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay values found through `lookup`, normally the process environment.
    ///
    /// Blank values are ignored; an unknown scheme is rejected here.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(database) = lookup(DATABASE_VAR).filter(|v| !v.trim().is_empty()) {
            self.database = Some(database);
        }
        if let Some(scheme) = lookup(SCHEME_VAR).filter(|v| !v.trim().is_empty()) {
            self.scheme = scheme;
        }
        if let Some(separator) = lookup(SEPARATOR_VAR).filter(|v| !v.trim().is_empty()) {
            self.separator = separator;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that the scheme is known and the separator usable.
    pub fn validate(&self) -> Result<()> {
        self.version_scheme()?;
        self.splitter()?;
        Ok(())
    }

    pub fn version_scheme(&self) -> Result<VersionScheme> {
        VersionScheme::from_str(&self.scheme).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "unknown version scheme \"{}\" (expected dotted or integer)",
                self.scheme
            ))
        })
    }

    pub fn splitter(&self) -> Result<BatchSplitter> {
        BatchSplitter::new(&self.separator)
    }

    /// A manifest parser for these settings, with the built-in script task.
    pub fn manifest_parser(&self) -> Result<ManifestParser> {
        Ok(ManifestParser::with_script_tasks(
            self.version_scheme()?,
            self.splitter()?,
        ))
    }

    pub fn database(&self) -> Result<&str> {
        self.database.as_deref().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "no database given; pass --database or set {}",
                DATABASE_VAR
            ))
        })
    }
}

/// `<config dir>/dbroll/settings.json`, if the platform has a config dir.
pub fn default_settings_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push(APP_NAME);
    path.push(SETTINGS_FILE);
    Some(path)
}
