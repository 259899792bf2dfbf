use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for verman operations
#[derive(Error, Debug)]
pub enum VermanError {
    #[error("Version content error: {0}")]
    Parse(String),

    #[error("No version parser registered for project type '{0}'")]
    UnsupportedProjectType(String),

    #[error("Fetch from remote '{remote}' failed: {reason}")]
    Fetch { remote: String, reason: String },

    #[error("Push to remote '{remote}' rejected: {reason}")]
    Rejected { remote: String, reason: String },

    #[error("Tag '{0}' already exists")]
    TagExists(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Version file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in verman
pub type Result<T> = std::result::Result<T, VermanError>;

impl VermanError {
    /// Create a parse error with context
    pub fn parse(msg: impl Into<String>) -> Self {
        VermanError::Parse(msg.into())
    }

    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        VermanError::Config(msg.into())
    }

    /// Create a fetch error bound to a remote name
    pub fn fetch(remote: impl Into<String>, reason: impl Into<String>) -> Self {
        VermanError::Fetch {
            remote: remote.into(),
            reason: reason.into(),
        }
    }

    /// Create a rejected-push error bound to a remote name
    pub fn rejected(remote: impl Into<String>, reason: impl Into<String>) -> Self {
        VermanError::Rejected {
            remote: remote.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that abort one unit of work but not its siblings
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VermanError::Fetch { .. }
                | VermanError::Rejected { .. }
                | VermanError::TagExists(_)
                | VermanError::Timeout(_)
                | VermanError::AlreadyExists(_)
        )
    }
}

impl From<reqwest::Error> for VermanError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VermanError::Timeout(err.to_string())
        } else {
            VermanError::Http(err.to_string())
        }
    }
}
