//! Error types for dbroll.

use thiserror::Error;

/// Errors raised while discovering, planning or applying database versions.
#[derive(Debug, Error)]
pub enum Error {
    /// An archive locator or other caller-supplied argument was unusable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Version text did not match the active version scheme.
    #[error("Invalid version format: \"{0}\"")]
    InvalidVersionFormat(String),

    /// A manifest document was missing required data.
    #[error("Malformed manifest \"{location}\": {reason}")]
    MalformedManifest { location: String, reason: String },

    /// An explicit target version does not exist in the archive.
    #[error("Version {0} was not found in the archive")]
    VersionNotFound(String),

    /// A task failed while running. The message is shown to the user verbatim.
    #[error("{message}")]
    TaskExecution {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The connection layer cannot serve the requested database.
    #[error("Unsupported connection: {0}")]
    UnsupportedConnection(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl Error {
    pub(crate) fn malformed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedManifest {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn task(message: impl Into<String>) -> Self {
        Self::TaskExecution {
            message: message.into(),
            source: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
