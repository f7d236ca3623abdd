use std::sync::Arc;

use regex::Regex;

use super::{Task, TaskContext, TaskFactory, TaskSource};
use crate::error::{Error, Result};
use crate::manifest::ManifestElement;
use crate::version::Version;

/// Batch separator used when none is configured.
pub const DEFAULT_SEPARATOR: &str = "GO";

const SCRIPT_ELEMENT: &str = "script";
const FILE_ATTRIBUTE: &str = "file";
const UTF8_BOM: &str = "\u{feff}";

/// Splits a script into batches on lines that hold only the separator.
///
/// The separator matches case-insensitively and only when it is alone on its
/// line (surrounding spaces and tabs are allowed). Batches are trimmed and
/// empty ones dropped, so a separator on the first or last line produces no
/// empty batch.
#[derive(Debug, Clone)]
pub struct BatchSplitter {
    separator: String,
    pattern: Regex,
}

impl BatchSplitter {
    pub fn new(separator: &str) -> Result<Self> {
        let separator = separator.trim();
        if separator.is_empty() {
            return Err(Error::InvalidArgument(
                "batch separator must not be empty".to_string(),
            ));
        }

        let pattern = Regex::new(&format!(
            r"(?im)^[ \t]*{}[ \t\r]*$",
            regex::escape(separator)
        ))
        .map_err(|e| Error::InvalidArgument(format!("invalid batch separator: {}", e)))?;

        Ok(Self {
            separator: separator.to_string(),
            pattern,
        })
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn split<'s>(&self, script: &'s str) -> Vec<&'s str> {
        self.pattern
            .split(script)
            .map(str::trim)
            .filter(|batch| !batch.is_empty())
            .collect()
    }
}

impl Default for BatchSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR).expect("default separator is a valid pattern")
    }
}

/// Runs one SQL file from the archive, batch by batch.
#[derive(Debug, Clone)]
pub struct ScriptTask {
    order: usize,
    file: String,
    version: Version,
    manifest_location: String,
    splitter: BatchSplitter,
}

impl ScriptTask {
    pub fn new(
        order: usize,
        file: impl Into<String>,
        source: &TaskSource,
        splitter: BatchSplitter,
    ) -> Self {
        Self {
            order,
            file: file.into(),
            version: source.version.clone(),
            manifest_location: source.manifest_location.clone(),
            splitter,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    fn load(&self, ctx: &TaskContext<'_>, path: &str) -> Result<String> {
        let bytes = ctx.archive.get_file(path)?.ok_or_else(|| {
            Error::task(format!(
                "the script file \"{}\" does not exist in the archive.",
                path
            ))
        })?;

        let text = String::from_utf8(bytes).map_err(|e| Error::TaskExecution {
            message: format!("the script file \"{}\" is not valid UTF-8.", path),
            source: Some(Box::new(e)),
        })?;

        Ok(match text.strip_prefix(UTF8_BOM) {
            Some(stripped) => stripped.to_string(),
            None => text,
        })
    }
}

impl Task for ScriptTask {
    fn order(&self) -> usize {
        self.order
    }

    fn name(&self) -> &str {
        &self.file
    }

    fn description(&self) -> String {
        format!("Run script \"{}\" for version {}", self.file, self.version)
    }

    fn execute(&self, ctx: &TaskContext<'_>) -> Result<()> {
        let path = ctx
            .archive
            .resolve_script_path(&self.manifest_location, &self.file);
        let script = self.load(ctx, &path)?;
        let batches = self.splitter.split(&script);

        for (i, batch) in batches.iter().enumerate() {
            tracing::debug!("Executing batch {} of {} from {}", i + 1, batches.len(), path);
            ctx.conn
                .execute_batch(batch)
                .map_err(|e| Error::TaskExecution {
                    message: format!("Failed to execute script \"{}\". {}", path, e),
                    source: Some(Box::new(e)),
                })?;
        }

        Ok(())
    }
}

/// Builds a [`ScriptTask`] from `<script file="relative/path.sql"/>`.
#[derive(Debug, Clone, Default)]
pub struct ScriptTaskFactory {
    splitter: BatchSplitter,
}

impl ScriptTaskFactory {
    pub fn new(splitter: BatchSplitter) -> Self {
        Self { splitter }
    }
}

impl TaskFactory for ScriptTaskFactory {
    fn can_create(&self, element: &ManifestElement) -> bool {
        element.name == SCRIPT_ELEMENT
    }

    fn create(
        &self,
        element: &ManifestElement,
        order: usize,
        source: &TaskSource,
    ) -> Result<Arc<dyn Task>> {
        let file = element
            .attribute(FILE_ATTRIBUTE)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| {
                Error::malformed(
                    source.manifest_location.clone(),
                    format!("<script> element {} has no \"file\" attribute", order),
                )
            })?;

        Ok(Arc::new(ScriptTask::new(
            order,
            file,
            source,
            self.splitter.clone(),
        )))
    }
}
