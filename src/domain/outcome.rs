use std::fmt;
use std::path::PathBuf;

/// Workflow stage of a publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Syncing,
    Packaging,
    Publishing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Syncing => "syncing",
            Stage::Packaging => "packaging",
            Stage::Publishing => "publishing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Per-remote snapshot taken during a sync pass. Derived fresh on each
/// refresh, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSyncState {
    pub remote: String,
    pub has_local_changes: bool,
    /// None when the remote has no tracking branch (unknown, not zero)
    pub ahead: Option<usize>,
    pub behind: Option<usize>,
    pub last_fetch_error: Option<String>,
}

/// Result of syncing one remote during a publish run.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOutcome {
    pub remote: String,
    pub pushed: bool,
    pub tags_pushed: bool,
    /// Remote was ahead of us; push was skipped and surfaced for the caller
    pub behind_remote: bool,
    pub error: Option<String>,
}

impl RemoteOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.behind_remote
    }
}

/// A created (or pre-existing) release on a hosting platform.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseRecord {
    pub url: String,
    pub id: Option<u64>,
}

/// Sub-step of a publisher's publish operation, attached to failures so
/// callers can retry exactly the failed part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    CheckExisting,
    CreateRelease,
    UploadAsset,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishStep::CheckExisting => "check existing release",
            PublishStep::CreateRelease => "create release",
            PublishStep::UploadAsset => "upload asset",
        };
        f.write_str(name)
    }
}

/// Structured failure from a publisher, tagged with the failed sub-step.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishFailure {
    pub step: PublishStep,
    pub reason: String,
}

impl PublishFailure {
    pub fn new(step: PublishStep, reason: impl Into<String>) -> Self {
        PublishFailure {
            step,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.reason)
    }
}

/// Result of publishing to one platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformOutcome {
    pub platform: String,
    pub result: Result<ReleaseRecord, PublishFailure>,
}

/// Overall status of one orchestration run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Every remote and platform succeeded
    Done,
    /// Some units succeeded and some failed; per-unit detail in the outcome
    PartiallyFailed,
    /// Fatal error before or during a stage; no further stages ran
    Failed { stage: Stage, reason: String },
    /// Another run for the same project path was already in flight
    Busy,
}

/// Aggregate result of one publish orchestration run. The orchestrator
/// never throws past its boundary: callers always receive this.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    pub status: RunStatus,
    pub sync: Vec<RemoteOutcome>,
    pub archive: Option<PathBuf>,
    pub platforms: Vec<PlatformOutcome>,
}

impl PublishOutcome {
    pub fn failed(stage: Stage, reason: impl Into<String>) -> Self {
        PublishOutcome {
            status: RunStatus::Failed {
                stage,
                reason: reason.into(),
            },
            sync: Vec::new(),
            archive: None,
            platforms: Vec::new(),
        }
    }

    pub fn busy() -> Self {
        PublishOutcome {
            status: RunStatus::Busy,
            sync: Vec::new(),
            archive: None,
            platforms: Vec::new(),
        }
    }

    /// CLI exit code: 0 success, 1 partial failure, 2 fatal
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Done => 0,
            RunStatus::PartiallyFailed => 1,
            RunStatus::Failed { .. } | RunStatus::Busy => 2,
        }
    }
}

/// Progress notification delivered through the caller-supplied callback.
/// Advisory only: a panicking callback never aborts the workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    StageChanged(Stage),
    RemoteSynced { remote: String, ok: bool },
    PlatformPublished { platform: String, ok: bool },
    Message(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let done = PublishOutcome {
            status: RunStatus::Done,
            sync: vec![],
            archive: None,
            platforms: vec![],
        };
        assert_eq!(done.exit_code(), 0);

        let partial = PublishOutcome {
            status: RunStatus::PartiallyFailed,
            ..done.clone()
        };
        assert_eq!(partial.exit_code(), 1);

        assert_eq!(PublishOutcome::failed(Stage::Syncing, "no repo").exit_code(), 2);
        assert_eq!(PublishOutcome::busy().exit_code(), 2);
    }

    #[test]
    fn test_publish_failure_display() {
        let failure = PublishFailure::new(PublishStep::UploadAsset, "HTTP 500");
        assert_eq!(failure.to_string(), "upload asset failed: HTTP 500");
    }

    #[test]
    fn test_remote_outcome_success() {
        let ok = RemoteOutcome {
            remote: "origin".to_string(),
            pushed: true,
            tags_pushed: true,
            behind_remote: false,
            error: None,
        };
        assert!(ok.is_success());

        let behind = RemoteOutcome {
            behind_remote: true,
            ..ok.clone()
        };
        assert!(!behind.is_success());
    }
}
