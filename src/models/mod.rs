//! Persisted history models for dbroll.
//!
//! # Core Concepts
//!
//! - [`ExecutedVersion`]: one row per database version that has had at least one
//!   task committed. The version with the greatest value is the *current* version.
//! - [`ExecutedTask`]: one row per task that ran for a version. Task names are
//!   compared case-insensitively when deciding whether a task already ran.
//!
//! Both are created or extended only by the record-version task scheduled at the
//! end of each version in a plan, so they change only when the whole run commits.

mod history;

pub use history::*;
