//! Git operations abstraction layer.
//!
//! The [GitRepository] trait defines the narrow synchronous contract the
//! workflow needs; expected conditions come back as structured results,
//! never as raw command output or cross-boundary panics. Implementations:
//!
//! - [repository::Git2Repository]: real implementation using the `git2` crate
//! - [mock::MockRepository]: configurable test double

pub mod mock;
pub mod repository;

pub use mock::MockRepository;
pub use repository::Git2Repository;

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::error::Result;

/// One configured remote with its sync position relative to the current
/// branch's tracking ref.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStatus {
    pub name: String,
    pub url: String,
    /// None when the remote has no tracking branch: unknown, not zero
    pub ahead: Option<usize>,
    pub behind: Option<usize>,
}

/// Narrow synchronous contract over repository inspection and mutation.
///
/// All implementors are `Send + Sync`; methods return structured results
/// for expected conditions (nothing to commit, conflicted rebase) instead
/// of erroring.
pub trait GitRepository: Send + Sync {
    /// Whether the path actually holds a repository.
    fn is_repository(&self) -> bool;

    /// True if the working tree or index differs from HEAD.
    fn local_changes(&self) -> Result<bool>;

    /// Name of the checked-out branch; None on detached HEAD.
    fn current_branch(&self) -> Result<Option<String>>;

    /// All configured remotes with ahead/behind counts.
    fn remotes(&self) -> Result<Vec<RemoteStatus>>;

    /// Fetch branches and tags from one remote. Failures surface as
    /// `FetchError` carrying the remote name.
    fn fetch(&self, remote: &str) -> Result<()>;

    /// Commit staged (or, with `include_all`, all) changes. A clean tree
    /// is a no-op success: returns `Ok(false)`.
    fn commit(&self, message: &str, include_all: bool) -> Result<bool>;

    /// Push a branch. Non-fast-forward rejections surface as
    /// `RejectedError`; the caller decides whether to force or abort.
    fn push(&self, remote: &str, branch: &str) -> Result<()>;

    /// Push all tags to a remote.
    fn push_tags(&self, remote: &str) -> Result<()>;

    /// Pull with rebase. On conflict, returns `(false, conflicted_paths)`
    /// and leaves the tree as it was; surfacing a manual-resolution path
    /// is the caller's concern.
    fn pull_rebase(&self, remote: &str, branch: &str) -> Result<(bool, Vec<PathBuf>)>;

    /// Create a tag at HEAD. Fails with `TagExistsError` if present;
    /// never silently overwritten.
    fn create_tag(&self, name: &str, message: &str) -> Result<()>;

    /// Newest version-shaped tag reachable from HEAD, walking history.
    fn latest_tag(&self) -> Result<Option<String>>;
}

/// Extract "owner/repo" from an HTTPS or SSH remote URL.
pub fn repo_slug_from_url(url: &str) -> Option<String> {
    static HTTPS: OnceLock<Regex> = OnceLock::new();
    static SSH: OnceLock<Regex> = OnceLock::new();
    let https = HTTPS.get_or_init(|| Regex::new(r"https?://[^/]+/([^/]+/[^/]+?)(?:\.git)?/?$").unwrap());
    let ssh = SSH.get_or_init(|| Regex::new(r"git@[^:]+:([^/]+/[^/]+?)(?:\.git)?$").unwrap());

    https
        .captures(url)
        .or_else(|| ssh.captures(url))
        .map(|c| c[1].to_string())
}

/// Guess the hosting platform from a remote URL.
pub fn platform_from_url(url: &str) -> Option<&'static str> {
    let lower = url.to_lowercase();
    if lower.contains("github.com") {
        Some("github")
    } else if lower.contains("gitee.com") {
        Some("gitee")
    } else if lower.contains("gitea") || lower.contains("git.") {
        Some("gitea")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_https() {
        assert_eq!(
            repo_slug_from_url("https://github.com/user/repo.git"),
            Some("user/repo".to_string())
        );
        assert_eq!(
            repo_slug_from_url("https://gitee.com/user/repo"),
            Some("user/repo".to_string())
        );
    }

    #[test]
    fn test_slug_from_ssh() {
        assert_eq!(
            repo_slug_from_url("git@github.com:user/repo.git"),
            Some("user/repo".to_string())
        );
    }

    #[test]
    fn test_slug_unparseable() {
        assert_eq!(repo_slug_from_url("not a url"), None);
    }

    #[test]
    fn test_platform_detection() {
        assert_eq!(platform_from_url("https://github.com/u/r"), Some("github"));
        assert_eq!(platform_from_url("git@gitee.com:u/r.git"), Some("gitee"));
        assert_eq!(platform_from_url("https://gitea.example.com/u/r"), Some("gitea"));
        assert_eq!(platform_from_url("https://example.org/u/r"), None);
    }
}
