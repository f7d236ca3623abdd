//! Manifest parsing.
//!
//! A manifest declares one version and its tasks:
//!
//! ```xml
//! <database version="1.1">
//!     <script file="tables.sql"/>
//!     <script file="views.sql"/>
//! </database>
//! ```
//!
//! Each child element is offered to the registered [`TaskFactory`]s in order.
//! A task's execution order is the zero-based position of its element among
//! the root's child elements.

use std::sync::Arc;

use crate::archive::VersionDescriptor;
use crate::error::{Error, Result};
use crate::tasks::{BatchSplitter, ScriptTaskFactory, TaskFactory, TaskSource};
use crate::version::VersionScheme;

/// File name every manifest must have.
pub const MANIFEST_FILE_NAME: &str = "database.xml";

const VERSION_ATTRIBUTE: &str = "version";

/// A child element of a manifest, detached from the XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestElement {
    pub name: String,
    attributes: Vec<(String, String)>,
}

impl ManifestElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Turns manifest documents into [`VersionDescriptor`]s.
#[derive(Clone)]
pub struct ManifestParser {
    scheme: VersionScheme,
    factories: Vec<Arc<dyn TaskFactory>>,
}

impl ManifestParser {
    /// A parser with no task factories registered.
    pub fn new(scheme: VersionScheme) -> Self {
        Self {
            scheme,
            factories: Vec::new(),
        }
    }

    /// A parser that understands the built-in `<script>` element.
    pub fn with_script_tasks(scheme: VersionScheme, splitter: BatchSplitter) -> Self {
        let mut parser = Self::new(scheme);
        parser.register(Arc::new(ScriptTaskFactory::new(splitter)));
        parser
    }

    /// Add a factory after the ones already registered.
    pub fn register(&mut self, factory: Arc<dyn TaskFactory>) {
        self.factories.push(factory);
    }

    pub fn scheme(&self) -> VersionScheme {
        self.scheme
    }

    pub fn parse(&self, document: &[u8], location: &str) -> Result<VersionDescriptor> {
        if location.trim().is_empty() {
            return Err(Error::malformed(location, "manifest location is empty"));
        }
        if document.is_empty() {
            return Err(Error::malformed(location, "manifest document is empty"));
        }

        let text = std::str::from_utf8(document)
            .map_err(|e| Error::malformed(location, format!("not valid UTF-8: {}", e)))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let xml = roxmltree::Document::parse(text)
            .map_err(|e| Error::malformed(location, e.to_string()))?;
        let root = xml.root_element();

        let version_text = root.attribute(VERSION_ATTRIBUTE).ok_or_else(|| {
            Error::malformed(location, "root element has no \"version\" attribute")
        })?;
        let version = self
            .scheme
            .parse(version_text)
            .map_err(|e| Error::malformed(location, e.to_string()))?;

        let source = TaskSource {
            version: version.clone(),
            manifest_location: location.to_string(),
        };

        let mut tasks = Vec::new();
        for (order, node) in root.children().filter(|n| n.is_element()).enumerate() {
            let element = node.attributes().fold(
                ManifestElement::new(node.tag_name().name()),
                |element, attr| element.with_attribute(attr.name(), attr.value()),
            );

            match self.factories.iter().find(|f| f.can_create(&element)) {
                Some(factory) => tasks.push(factory.create(&element, order, &source)?),
                None => tracing::warn!(
                    "Skipping unrecognized element <{}> at position {} in {}",
                    element.name,
                    order,
                    location
                ),
            }
        }

        tracing::debug!(
            "Parsed manifest {} (version {}, {} tasks)",
            location,
            version,
            tasks.len()
        );

        Ok(VersionDescriptor::new(version, location, tasks))
    }
}
