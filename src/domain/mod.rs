//! Core domain types: versions, projects, and workflow outcomes.

pub mod outcome;
pub mod project;
pub mod version;

pub use outcome::{
    PlatformOutcome, Progress, PublishFailure, PublishOutcome, PublishStep, ReleaseRecord,
    RemoteOutcome, RemoteSyncState, RunStatus, Stage,
};
pub use project::{Project, ProjectType, RemoteDescriptor};
pub use version::{BumpKind, Version};
