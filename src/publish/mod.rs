//! Release publication to git hosting platforms.
//!
//! Each platform implements [Publisher]; the [PublisherRegistry] maps
//! platform names to factories so additional platforms can be plugged in
//! without touching the orchestration code.

pub mod gitea;
pub mod gitee;
pub mod github;

pub use gitea::GiteaPublisher;
pub use gitee::GiteePublisher;
pub use github::GithubPublisher;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::domain::{PublishFailure, PublishStep, ReleaseRecord};
use crate::error::Result;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A release publisher for one hosting platform.
pub trait Publisher: Send + Sync {
    /// Platform identifier, e.g. `github`.
    fn platform(&self) -> &str;

    /// Create a release for `tag` on `repo` (an `owner/name` slug) and
    /// attach `asset` when given.
    ///
    /// Failures carry the sub-step they occurred in. A release that already
    /// exists for the tag is a [PublishStep::CheckExisting] failure; the
    /// caller must not attempt to re-create it.
    fn publish(
        &self,
        repo: &str,
        tag: &str,
        name: &str,
        body: &str,
        asset: Option<&Path>,
    ) -> std::result::Result<ReleaseRecord, PublishFailure>;

    /// Verify the token can read the repository. No side effects.
    fn validate_config(&self, repo: &str) -> Result<()>;
}

/// Construction-time options shared by all publisher factories.
#[derive(Debug, Clone, Default)]
pub struct PublisherOptions {
    /// Base URL for self-hosted platforms (Gitea).
    pub base_url: Option<String>,
    /// Per-request HTTP timeout. Defaults to 30 seconds.
    pub timeout: Option<Duration>,
}

impl PublisherOptions {
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// Builds a publisher from a token and options. Returns `Ok(None)` when the
/// options are insufficient for this platform (e.g. Gitea without a base URL).
pub type PublisherFactory =
    fn(token: &str, options: &PublisherOptions) -> Result<Option<Box<dyn Publisher>>>;

/// Maps platform names to publisher factories.
///
/// Registration is last-write-wins, so a caller can override a builtin
/// platform with its own implementation.
pub struct PublisherRegistry {
    factories: HashMap<String, PublisherFactory>,
}

impl PublisherRegistry {
    /// An empty registry with no platforms.
    pub fn new() -> Self {
        PublisherRegistry {
            factories: HashMap::new(),
        }
    }

    /// A registry with the builtin GitHub, Gitee and Gitea publishers.
    pub fn with_builtin_publishers() -> Self {
        let mut registry = Self::new();
        registry.register("github", github::factory);
        registry.register("gitee", gitee::factory);
        registry.register("gitea", gitea::factory);
        registry
    }

    pub fn register(&mut self, platform: impl Into<String>, factory: PublisherFactory) {
        self.factories.insert(platform.into(), factory);
    }

    /// Instantiate a publisher for `platform`. `Ok(None)` when the platform
    /// is unknown or the options are insufficient for it.
    pub fn get(
        &self,
        platform: &str,
        token: &str,
        options: &PublisherOptions,
    ) -> Result<Option<Box<dyn Publisher>>> {
        match self.factories.get(platform) {
            Some(factory) => factory(token, options),
            None => Ok(None),
        }
    }

    /// Registered platform names, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for PublisherRegistry {
    fn default() -> Self {
        Self::with_builtin_publishers()
    }
}

pub(crate) fn http_client(options: &PublisherOptions) -> Result<reqwest::blocking::Client> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("verman/", env!("CARGO_PKG_VERSION")))
        .timeout(options.timeout())
        .build()?;
    Ok(client)
}

pub(crate) fn step_failure(step: PublishStep, error: &reqwest::Error) -> PublishFailure {
    let reason = if error.is_timeout() {
        "request timed out".to_string()
    } else {
        error.to_string()
    };
    PublishFailure { step, reason }
}

pub(crate) fn read_asset(path: &Path) -> std::result::Result<(String, Vec<u8>), PublishFailure> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PublishFailure {
            step: PublishStep::UploadAsset,
            reason: format!("asset path has no file name: {}", path.display()),
        })?;
    let bytes = std::fs::read(path).map_err(|e| PublishFailure {
        step: PublishStep::UploadAsset,
        reason: format!("cannot read asset {}: {}", path.display(), e),
    })?;
    Ok((filename, bytes))
}
