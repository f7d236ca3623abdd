#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use dbroll::archive::{ContainerArchive, DirectoryArchive};
use dbroll::db::Database;
use dbroll::executor::MemorySink;
use dbroll::manifest::ManifestParser;
use dbroll::tasks::BatchSplitter;
use dbroll::version::{Version, VersionScheme};
use zip::write::SimpleFileOptions;

pub fn parser() -> ManifestParser {
    ManifestParser::with_script_tasks(VersionScheme::Dotted, BatchSplitter::default())
}

pub fn version(text: &str) -> Version {
    VersionScheme::Dotted.parse(text).expect("valid version")
}

pub fn manifest(version: &str, scripts: &[&str]) -> String {
    let mut xml = format!("<database version=\"{}\">\n", version);
    for script in scripts {
        xml.push_str(&format!("    <script file=\"{}\"/>\n", script));
    }
    xml.push_str("</database>\n");
    xml
}

/// Write `<root>/<dir>/database.xml` declaring `scripts`, plus each script file.
pub fn write_version(root: &Path, dir: &str, version: &str, scripts: &[(&str, &str)]) {
    let version_dir = root.join(dir);
    fs::create_dir_all(&version_dir).expect("Failed to create version directory");

    let names: Vec<&str> = scripts.iter().map(|(name, _)| *name).collect();
    fs::write(version_dir.join("database.xml"), manifest(version, &names))
        .expect("Failed to write manifest");

    for (name, sql) in scripts {
        fs::write(version_dir.join(name), sql).expect("Failed to write script");
    }
}

pub fn open_dir(root: &Path) -> DirectoryArchive {
    DirectoryArchive::open(root, &parser()).expect("Failed to open archive")
}

/// Write a zip at `path` holding `entries` (name, content).
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).expect("Failed to create zip");
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("Failed to start zip entry");
        zip.write_all(content.as_bytes())
            .expect("Failed to write zip entry");
    }
    zip.finish().expect("Failed to finish zip");
}

pub fn open_zip(path: &Path) -> ContainerArchive {
    ContainerArchive::open(path, &parser()).expect("Failed to open zip archive")
}

pub fn memory_db() -> Database {
    Database::open_memory().expect("Failed to create in-memory database")
}

pub fn sink() -> Arc<MemorySink> {
    Arc::new(MemorySink::new())
}

pub fn table_exists(db: &Database, name: &str) -> bool {
    let count: i32 = db
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?",
            [name],
            |row| row.get(0),
        )
        .expect("Query failed");
    count > 0
}
