use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Result, VermanError};
use crate::git::{GitRepository, RemoteStatus};

/// In-memory repository double for testing without actual git operations.
///
/// State lives behind a [Mutex] because the trait exposes everything through
/// `&self`. Every mutating call is recorded so tests can assert on the
/// sequence of operations.
pub struct MockRepository {
    inner: Mutex<MockState>,
}

struct MockState {
    branch: Option<String>,
    remotes: Vec<RemoteStatus>,
    tags: Vec<String>,
    dirty: bool,
    failing_remotes: HashSet<String>,
    rejecting_remotes: HashSet<String>,
    conflict_paths: Vec<PathBuf>,
    calls: Vec<String>,
}

impl MockRepository {
    /// Create a clean mock on branch `main` with no remotes or tags.
    pub fn new() -> Self {
        MockRepository {
            inner: Mutex::new(MockState {
                branch: Some("main".to_string()),
                remotes: Vec::new(),
                tags: Vec::new(),
                dirty: false,
                failing_remotes: HashSet::new(),
                rejecting_remotes: HashSet::new(),
                conflict_paths: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Add a remote with known ahead/behind counts.
    pub fn add_remote(&self, name: &str, url: &str, ahead: usize, behind: usize) {
        let mut state = self.inner.lock().unwrap();
        state.remotes.push(RemoteStatus {
            name: name.to_string(),
            url: url.to_string(),
            ahead: Some(ahead),
            behind: Some(behind),
        });
    }

    /// Add an existing tag.
    pub fn add_tag(&self, name: impl Into<String>) {
        self.inner.lock().unwrap().tags.push(name.into());
    }

    /// Mark the working tree as having uncommitted changes.
    pub fn set_dirty(&self, dirty: bool) {
        self.inner.lock().unwrap().dirty = dirty;
    }

    pub fn set_branch(&self, branch: Option<&str>) {
        self.inner.lock().unwrap().branch = branch.map(|b| b.to_string());
    }

    /// Make fetch fail for this remote.
    pub fn fail_fetch(&self, remote: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing_remotes
            .insert(remote.to_string());
    }

    /// Make push be rejected by this remote.
    pub fn reject_push(&self, remote: &str) {
        self.inner
            .lock()
            .unwrap()
            .rejecting_remotes
            .insert(remote.to_string());
    }

    /// Make the next pull_rebase stop on conflicts in these paths.
    pub fn set_conflicts(&self, paths: Vec<PathBuf>) {
        self.inner.lock().unwrap().conflict_paths = paths;
    }

    /// The recorded call log, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.inner.lock().unwrap().tags.clone()
    }
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl GitRepository for MockRepository {
    fn is_repository(&self) -> bool {
        true
    }

    fn local_changes(&self) -> Result<bool> {
        Ok(self.inner.lock().unwrap().dirty)
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap().branch.clone())
    }

    fn remotes(&self) -> Result<Vec<RemoteStatus>> {
        Ok(self.inner.lock().unwrap().remotes.clone())
    }

    fn fetch(&self, remote: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(format!("fetch:{}", remote));
        if state.failing_remotes.contains(remote) {
            return Err(VermanError::fetch(remote, "simulated network failure"));
        }
        Ok(())
    }

    fn commit(&self, message: &str, _include_all: bool) -> Result<bool> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(format!("commit:{}", message));
        let had_changes = state.dirty;
        state.dirty = false;
        Ok(had_changes)
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(format!("push:{}:{}", remote, branch));
        if state.rejecting_remotes.contains(remote) {
            return Err(VermanError::rejected(remote, "non-fast-forward"));
        }
        Ok(())
    }

    fn push_tags(&self, remote: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(format!("push_tags:{}", remote));
        if state.rejecting_remotes.contains(remote) {
            return Err(VermanError::rejected(remote, "non-fast-forward"));
        }
        Ok(())
    }

    fn pull_rebase(&self, remote: &str, branch: &str) -> Result<(bool, Vec<PathBuf>)> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(format!("pull_rebase:{}:{}", remote, branch));
        if state.conflict_paths.is_empty() {
            Ok((true, Vec::new()))
        } else {
            Ok((false, state.conflict_paths.clone()))
        }
    }

    fn create_tag(&self, name: &str, _message: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(format!("create_tag:{}", name));
        if state.tags.iter().any(|t| t == name) {
            return Err(VermanError::TagExists(name.to_string()));
        }
        state.tags.push(name.to_string());
        Ok(())
    }

    fn latest_tag(&self) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap().tags.last().cloned())
    }
}
