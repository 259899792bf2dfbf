//! Business logic on top of the parser, git and publisher layers.

pub mod orchestrator;
pub mod packager;
pub mod version_service;

pub use orchestrator::PublishOrchestrator;
pub use packager::{ArchiveEntry, Packager};
pub use version_service::{VersionInfo, VersionService};
