use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use log::{info, warn};

use crate::config::ConfigStore;
use crate::domain::{
    PlatformOutcome, Progress, Project, ProjectType, PublishFailure, PublishOutcome, PublishStep,
    RemoteOutcome, RunStatus, Stage, Version,
};
use crate::git::GitRepository;
use crate::publish::{Publisher, PublisherOptions, PublisherRegistry};
use crate::services::packager::Packager;

/// Process-wide set of project paths with a publish run in flight.
static IN_FLIGHT: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();

/// Holds a project path in the in-flight set; released on drop, including
/// on panic.
struct RunGuard {
    path: PathBuf,
}

impl RunGuard {
    fn acquire(path: &Path) -> Option<RunGuard> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let set = IN_FLIGHT.get_or_init(|| Mutex::new(HashSet::new()));
        let mut in_flight = set.lock().unwrap_or_else(|p| p.into_inner());
        if in_flight.insert(canonical.clone()) {
            Some(RunGuard { path: canonical })
        } else {
            None
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let set = IN_FLIGHT.get_or_init(|| Mutex::new(HashSet::new()));
        let mut in_flight = set.lock().unwrap_or_else(|p| p.into_inner());
        in_flight.remove(&self.path);
    }
}

/// Drives the full publish workflow: sync remotes, package, publish
/// releases. Collects per-unit failures instead of aborting siblings and
/// always returns a [PublishOutcome]; nothing escapes its boundary.
pub struct PublishOrchestrator<'a> {
    project: &'a Project,
    repo: &'a dyn GitRepository,
    registry: &'a PublisherRegistry,
    config: &'a dyn ConfigStore,
    progress: Option<Box<dyn Fn(&Progress) + 'a>>,
}

impl<'a> PublishOrchestrator<'a> {
    pub fn new(
        project: &'a Project,
        repo: &'a dyn GitRepository,
        registry: &'a PublisherRegistry,
        config: &'a dyn ConfigStore,
    ) -> Self {
        PublishOrchestrator {
            project,
            repo,
            registry,
            config,
            progress: None,
        }
    }

    /// Attach a progress callback. Advisory only: panics inside the
    /// callback are caught and logged, never abort the run.
    pub fn with_progress(mut self, callback: impl Fn(&Progress) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    fn emit(&self, event: Progress) {
        if let Some(callback) = &self.progress {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                warn!("progress callback panicked; continuing");
            }
        }
    }

    /// Resolve a publisher per configured platform. Missing tokens or
    /// unknown platforms become per-platform failures; only a project
    /// where no platform is usable at all is fatal.
    fn resolve_publishers(
        &self,
    ) -> Vec<(String, std::result::Result<Box<dyn Publisher>, PublishFailure>)> {
        self.project
            .publish_to
            .iter()
            .map(|platform| {
                let resolved = match self.config.token(platform) {
                    None => Err(PublishFailure::new(
                        PublishStep::CheckExisting,
                        "no token configured",
                    )),
                    Some(token) => {
                        let options = PublisherOptions {
                            base_url: if platform == "gitea" {
                                self.config.gitea_url()
                            } else {
                                None
                            },
                            timeout: None,
                        };
                        match self.registry.get(platform, &token, &options) {
                            Ok(Some(publisher)) => Ok(publisher),
                            Ok(None) => Err(PublishFailure::new(
                                PublishStep::CheckExisting,
                                "platform not available",
                            )),
                            Err(e) => Err(PublishFailure::new(
                                PublishStep::CheckExisting,
                                e.to_string(),
                            )),
                        }
                    }
                };
                (platform.clone(), resolved)
            })
            .collect()
    }

    /// Run the workflow for an already-bumped `version`.
    ///
    /// When `commit_message` is given, local changes are committed before
    /// syncing. A second run for the same project path while one is in
    /// flight returns a `Busy` outcome without touching the repository.
    pub fn run(
        &self,
        version: Version,
        commit_message: Option<&str>,
        packager: &Packager,
    ) -> PublishOutcome {
        let _guard = match RunGuard::acquire(&self.project.path) {
            Some(guard) => guard,
            None => return PublishOutcome::busy(),
        };

        // Fatal preconditions, checked before any mutating step.
        if !self.repo.is_repository() {
            return PublishOutcome::failed(Stage::Idle, "not a git repository");
        }
        let publishers = self.resolve_publishers();
        if !publishers.is_empty() && publishers.iter().all(|(_, r)| r.is_err()) {
            return PublishOutcome::failed(
                Stage::Idle,
                "no usable credentials for any configured platform",
            );
        }

        let tag = version.tag();
        let mut outcome = PublishOutcome {
            status: RunStatus::Done,
            sync: Vec::new(),
            archive: None,
            platforms: Vec::new(),
        };

        // Syncing

        self.emit(Progress::StageChanged(Stage::Syncing));

        if let Some(message) = commit_message {
            match self.repo.commit(message, true) {
                Ok(true) => self.emit(Progress::Message(format!("committed: {}", message))),
                Ok(false) => {}
                Err(e) => {
                    outcome.status = RunStatus::Failed {
                        stage: Stage::Syncing,
                        reason: format!("commit failed: {}", e),
                    };
                    return outcome;
                }
            }
        }

        match self.repo.create_tag(&tag, &format!("Release {}", tag)) {
            Ok(()) => info!("created tag {}", tag),
            Err(crate::error::VermanError::TagExists(_)) => {
                // Existing tag for this version is reused, not an error.
                self.emit(Progress::Message(format!("tag {} already exists", tag)));
            }
            Err(e) => {
                outcome.status = RunStatus::Failed {
                    stage: Stage::Syncing,
                    reason: format!("cannot create tag {}: {}", tag, e),
                };
                return outcome;
            }
        }

        let branch = match self.repo.current_branch() {
            Ok(Some(branch)) => branch,
            Ok(None) => "main".to_string(),
            Err(e) => {
                outcome.status = RunStatus::Failed {
                    stage: Stage::Syncing,
                    reason: format!("cannot determine branch: {}", e),
                };
                return outcome;
            }
        };

        let remotes = match self.repo.remotes() {
            Ok(remotes) => remotes,
            Err(e) => {
                outcome.status = RunStatus::Failed {
                    stage: Stage::Syncing,
                    reason: format!("cannot list remotes: {}", e),
                };
                return outcome;
            }
        };

        for remote in &remotes {
            let result = self.sync_remote(&remote.name, &branch);
            self.emit(Progress::RemoteSynced {
                remote: remote.name.clone(),
                ok: result.is_success(),
            });
            outcome.sync.push(result);
        }

        // Packaging

        self.emit(Progress::StageChanged(Stage::Packaging));
        let archive = if self.project.project_type == ProjectType::PythonApp {
            packager.create_dist_archive(version)
        } else {
            packager.create_archive(version)
        };
        let archive = match archive {
            Ok(path) => path,
            Err(e) => {
                outcome.status = RunStatus::Failed {
                    stage: Stage::Packaging,
                    reason: e.to_string(),
                };
                return outcome;
            }
        };
        outcome.archive = Some(archive.clone());

        // Publishing

        self.emit(Progress::StageChanged(Stage::Publishing));
        let release_name = format!("{} {}", self.project.name(), tag);
        let release_body = format!("Release {}", tag);

        for (platform, resolved) in publishers {
            let result = match resolved {
                Err(failure) => Err(failure),
                Ok(publisher) => match self.project.repos.get(&platform) {
                    None => Err(PublishFailure::new(
                        PublishStep::CheckExisting,
                        "no repository configured",
                    )),
                    Some(slug) => publisher.publish(
                        slug,
                        &tag,
                        &release_name,
                        &release_body,
                        Some(&archive),
                    ),
                },
            };
            self.emit(Progress::PlatformPublished {
                platform: platform.clone(),
                ok: result.is_ok(),
            });
            outcome.platforms.push(PlatformOutcome {
                platform,
                result,
            });
        }

        let all_remotes_ok = outcome.sync.iter().all(|r| r.is_success());
        let all_platforms_ok = outcome.platforms.iter().all(|p| p.result.is_ok());
        outcome.status = if all_remotes_ok && all_platforms_ok {
            RunStatus::Done
        } else {
            RunStatus::PartiallyFailed
        };

        self.emit(Progress::StageChanged(Stage::Done));
        outcome
    }

    /// Fetch, compare and push one remote. A remote that is ahead of us is
    /// surfaced as `behind_remote` and never silently rebased over.
    fn sync_remote(&self, remote: &str, branch: &str) -> RemoteOutcome {
        let mut result = RemoteOutcome {
            remote: remote.to_string(),
            pushed: false,
            tags_pushed: false,
            behind_remote: false,
            error: None,
        };

        if let Err(e) = self.repo.fetch(remote) {
            result.error = Some(e.to_string());
            return result;
        }

        match self.repo.remotes() {
            Ok(remotes) => {
                if let Some(status) = remotes.iter().find(|r| r.name == remote) {
                    if status.behind.unwrap_or(0) > 0 {
                        result.behind_remote = true;
                        return result;
                    }
                }
            }
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        }

        if let Err(e) = self.repo.push(remote, branch) {
            result.error = Some(e.to_string());
            return result;
        }
        result.pushed = true;

        if let Err(e) = self.repo.push_tags(remote) {
            result.error = Some(e.to_string());
            return result;
        }
        result.tags_pushed = true;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::git::mock::MockRepository;
    use std::collections::HashMap;

    fn sample_project(path: &Path, publish_to: Vec<&str>) -> Project {
        let repos = publish_to
            .iter()
            .map(|p| (p.to_string(), format!("owner/{}-repo", p)))
            .collect::<HashMap<_, _>>();
        Project {
            path: path.to_path_buf(),
            project_type: ProjectType::PlainText,
            remotes: Vec::new(),
            publish_to: publish_to.into_iter().map(|s| s.to_string()).collect(),
            repos,
            exclude: Vec::new(),
        }
    }

    struct StubPublisher {
        platform: String,
        fail: bool,
    }

    impl Publisher for StubPublisher {
        fn platform(&self) -> &str {
            &self.platform
        }

        fn publish(
            &self,
            repo: &str,
            tag: &str,
            _name: &str,
            _body: &str,
            _asset: Option<&Path>,
        ) -> std::result::Result<crate::domain::ReleaseRecord, PublishFailure> {
            if self.fail {
                Err(PublishFailure::new(
                    PublishStep::CreateRelease,
                    "simulated platform outage",
                ))
            } else {
                Ok(crate::domain::ReleaseRecord {
                    url: format!("https://example.com/{}/releases/{}", repo, tag),
                    id: Some(1),
                })
            }
        }

        fn validate_config(&self, _repo: &str) -> Result<()> {
            Ok(())
        }
    }

    // The token doubles as the behavior switch because factories are plain
    // fn pointers.
    fn stub_factory(
        token: &str,
        _options: &PublisherOptions,
    ) -> Result<Option<Box<dyn Publisher>>> {
        Ok(Some(Box::new(StubPublisher {
            platform: "stub".to_string(),
            fail: token == "fail",
        })))
    }

    struct MemoryConfig {
        tokens: HashMap<String, String>,
    }

    impl MemoryConfig {
        fn new(tokens: &[(&str, &str)]) -> Self {
            MemoryConfig {
                tokens: tokens
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    impl ConfigStore for MemoryConfig {
        fn projects(&self) -> Vec<Project> {
            Vec::new()
        }
        fn project(&self, _path: &Path) -> Option<Project> {
            None
        }
        fn add_project(&mut self, _project: Project) -> Result<()> {
            Ok(())
        }
        fn update_project(&mut self, _project: Project) -> Result<()> {
            Ok(())
        }
        fn remove_project(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }
        fn token(&self, platform: &str) -> Option<String> {
            self.tokens.get(platform).cloned()
        }
        fn set_token(&mut self, _platform: &str, _token: &str, _url: Option<&str>) -> Result<()> {
            Ok(())
        }
        fn gitea_url(&self) -> Option<String> {
            None
        }
        fn archive_dir(&self) -> Option<PathBuf> {
            None
        }
        fn set_archive_dir(&mut self, _dir: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn stub_registry(platforms: &[&str]) -> PublisherRegistry {
        let mut registry = PublisherRegistry::new();
        for platform in platforms {
            registry.register(*platform, stub_factory);
        }
        registry
    }

    fn project_dir() -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("version.txt"), "1.0.0\n").unwrap();
        dir
    }

    #[test]
    fn test_platform_failure_does_not_abort_siblings() {
        let dir = project_dir();
        let archive_dir = tempfile::TempDir::new().unwrap();
        let project = sample_project(dir.path(), vec!["alpha", "beta", "gamma"]);
        let repo = MockRepository::new();
        repo.add_remote("origin", "https://github.com/o/r.git", 1, 0);
        let registry = stub_registry(&["alpha", "beta", "gamma"]);
        let config = MemoryConfig::new(&[("alpha", "ok"), ("beta", "fail"), ("gamma", "ok")]);
        let packager = Packager::new(dir.path(), "demo", archive_dir.path());

        let orchestrator = PublishOrchestrator::new(&project, &repo, &registry, &config);
        let outcome = orchestrator.run(Version::new(1, 0, 0), None, &packager);

        assert_eq!(outcome.status, RunStatus::PartiallyFailed);
        assert_eq!(outcome.platforms.len(), 3);
        assert!(outcome.platforms[0].result.is_ok());
        assert!(outcome.platforms[1].result.is_err());
        assert!(outcome.platforms[2].result.is_ok());
    }

    #[test]
    fn test_full_run_success() {
        let dir = project_dir();
        let archive_dir = tempfile::TempDir::new().unwrap();
        let project = sample_project(dir.path(), vec!["alpha"]);
        let repo = MockRepository::new();
        repo.add_remote("origin", "https://github.com/o/r.git", 0, 0);
        let registry = stub_registry(&["alpha"]);
        let config = MemoryConfig::new(&[("alpha", "ok")]);
        let packager = Packager::new(dir.path(), "demo", archive_dir.path());

        let orchestrator = PublishOrchestrator::new(&project, &repo, &registry, &config);
        let outcome = orchestrator.run(Version::new(1, 0, 0), Some("release 1.0.0"), &packager);

        assert_eq!(outcome.status, RunStatus::Done);
        assert_eq!(outcome.exit_code(), 0);
        assert!(outcome.archive.is_some());
        assert_eq!(repo.tags(), vec!["v1.0.0"]);
        let calls = repo.calls();
        assert!(calls.contains(&"push:origin:main".to_string()));
        assert!(calls.contains(&"push_tags:origin".to_string()));
    }

    #[test]
    fn test_behind_remote_is_surfaced_not_pushed() {
        let dir = project_dir();
        let archive_dir = tempfile::TempDir::new().unwrap();
        let project = sample_project(dir.path(), vec!["alpha"]);
        let repo = MockRepository::new();
        repo.add_remote("origin", "https://github.com/o/r.git", 0, 2);
        let registry = stub_registry(&["alpha"]);
        let config = MemoryConfig::new(&[("alpha", "ok")]);
        let packager = Packager::new(dir.path(), "demo", archive_dir.path());

        let orchestrator = PublishOrchestrator::new(&project, &repo, &registry, &config);
        let outcome = orchestrator.run(Version::new(1, 0, 0), None, &packager);

        assert_eq!(outcome.status, RunStatus::PartiallyFailed);
        assert!(outcome.sync[0].behind_remote);
        assert!(!outcome.sync[0].pushed);
        assert!(!repo.calls().contains(&"push:origin:main".to_string()));
    }

    #[test]
    fn test_failing_remote_does_not_abort_siblings() {
        let dir = project_dir();
        let archive_dir = tempfile::TempDir::new().unwrap();
        let project = sample_project(dir.path(), vec!["alpha"]);
        let repo = MockRepository::new();
        repo.add_remote("backup", "https://gitee.com/o/r.git", 0, 0);
        repo.add_remote("origin", "https://github.com/o/r.git", 0, 0);
        repo.fail_fetch("backup");
        let registry = stub_registry(&["alpha"]);
        let config = MemoryConfig::new(&[("alpha", "ok")]);
        let packager = Packager::new(dir.path(), "demo", archive_dir.path());

        let orchestrator = PublishOrchestrator::new(&project, &repo, &registry, &config);
        let outcome = orchestrator.run(Version::new(1, 0, 0), None, &packager);

        assert_eq!(outcome.status, RunStatus::PartiallyFailed);
        assert_eq!(outcome.sync.len(), 2);
        let backup = outcome.sync.iter().find(|r| r.remote == "backup").unwrap();
        let origin = outcome.sync.iter().find(|r| r.remote == "origin").unwrap();
        assert!(backup.error.is_some());
        assert!(origin.is_success());
    }

    #[test]
    fn test_rejected_push_is_surfaced_as_remote_error() {
        let dir = project_dir();
        let archive_dir = tempfile::TempDir::new().unwrap();
        let project = sample_project(dir.path(), vec!["alpha"]);
        let repo = MockRepository::new();
        repo.add_remote("origin", "https://github.com/o/r.git", 1, 0);
        repo.reject_push("origin");
        let registry = stub_registry(&["alpha"]);
        let config = MemoryConfig::new(&[("alpha", "ok")]);
        let packager = Packager::new(dir.path(), "demo", archive_dir.path());

        let orchestrator = PublishOrchestrator::new(&project, &repo, &registry, &config);
        let outcome = orchestrator.run(Version::new(1, 0, 0), None, &packager);

        assert_eq!(outcome.status, RunStatus::PartiallyFailed);
        assert!(!outcome.sync[0].pushed);
        assert!(!outcome.sync[0].tags_pushed);
        assert!(outcome.sync[0].error.as_deref().unwrap().contains("origin"));
    }

    #[test]
    fn test_detached_head_pushes_main() {
        let dir = project_dir();
        let archive_dir = tempfile::TempDir::new().unwrap();
        let project = sample_project(dir.path(), vec!["alpha"]);
        let repo = MockRepository::new();
        repo.add_remote("origin", "https://github.com/o/r.git", 0, 0);
        repo.set_branch(None);
        let registry = stub_registry(&["alpha"]);
        let config = MemoryConfig::new(&[("alpha", "ok")]);
        let packager = Packager::new(dir.path(), "demo", archive_dir.path());

        let orchestrator = PublishOrchestrator::new(&project, &repo, &registry, &config);
        let outcome = orchestrator.run(Version::new(1, 0, 0), None, &packager);

        assert_eq!(outcome.status, RunStatus::Done);
        assert!(repo.calls().contains(&"push:origin:main".to_string()));
    }

    #[test]
    fn test_no_credentials_at_all_is_fatal() {
        let dir = project_dir();
        let archive_dir = tempfile::TempDir::new().unwrap();
        let project = sample_project(dir.path(), vec!["alpha"]);
        let repo = MockRepository::new();
        let registry = stub_registry(&["alpha"]);
        let config = MemoryConfig::new(&[]);
        let packager = Packager::new(dir.path(), "demo", archive_dir.path());

        let orchestrator = PublishOrchestrator::new(&project, &repo, &registry, &config);
        let outcome = orchestrator.run(Version::new(1, 0, 0), None, &packager);

        assert!(matches!(outcome.status, RunStatus::Failed { .. }));
        assert!(repo.calls().is_empty());
        assert_eq!(outcome.exit_code(), 2);
    }

    #[test]
    fn test_existing_tag_is_reused() {
        let dir = project_dir();
        let archive_dir = tempfile::TempDir::new().unwrap();
        let project = sample_project(dir.path(), vec!["alpha"]);
        let repo = MockRepository::new();
        repo.add_remote("origin", "https://github.com/o/r.git", 0, 0);
        repo.add_tag("v1.0.0");
        let registry = stub_registry(&["alpha"]);
        let config = MemoryConfig::new(&[("alpha", "ok")]);
        let packager = Packager::new(dir.path(), "demo", archive_dir.path());

        let orchestrator = PublishOrchestrator::new(&project, &repo, &registry, &config);
        let outcome = orchestrator.run(Version::new(1, 0, 0), None, &packager);

        assert_eq!(outcome.status, RunStatus::Done);
    }

    #[test]
    fn test_panicking_progress_callback_is_contained() {
        let dir = project_dir();
        let archive_dir = tempfile::TempDir::new().unwrap();
        let project = sample_project(dir.path(), vec!["alpha"]);
        let repo = MockRepository::new();
        repo.add_remote("origin", "https://github.com/o/r.git", 0, 0);
        let registry = stub_registry(&["alpha"]);
        let config = MemoryConfig::new(&[("alpha", "ok")]);
        let packager = Packager::new(dir.path(), "demo", archive_dir.path());

        let orchestrator = PublishOrchestrator::new(&project, &repo, &registry, &config)
            .with_progress(|_| panic!("listener bug"));
        let outcome = orchestrator.run(Version::new(1, 0, 0), None, &packager);

        assert_eq!(outcome.status, RunStatus::Done);
    }

    #[test]
    fn test_run_guard_released_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let guard = RunGuard::acquire(dir.path()).unwrap();
        assert!(RunGuard::acquire(dir.path()).is_none());
        drop(guard);
        assert!(RunGuard::acquire(dir.path()).is_some());
    }

    #[test]
    fn test_run_guard_disjoint_paths() {
        let a = tempfile::TempDir::new().unwrap();
        let b = tempfile::TempDir::new().unwrap();
        let _guard_a = RunGuard::acquire(a.path()).unwrap();
        assert!(RunGuard::acquire(b.path()).is_some());
    }
}
