use git2::{build::CheckoutBuilder, Repository as Git2Repo};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

use crate::domain::Version;
use crate::error::{Result, VermanError};
use crate::git::RemoteStatus;

/// Wrapper around git2::Repository implementing the [crate::git::GitRepository]
/// contract.
pub struct Git2Repository {
    repo: Git2Repo,
}

impl Git2Repository {
    /// Open the repository at exactly this path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Git2Repo::open(path)?;
        Ok(Git2Repository { repo })
    }

    /// Whether a path holds a git repository, without keeping it open.
    pub fn is_repository_at<P: AsRef<Path>>(path: P) -> bool {
        Git2Repo::open(path).is_ok()
    }

    fn credential_callbacks<'a>() -> git2::RemoteCallbacks<'a> {
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, allowed_types| {
            if allowed_types.contains(git2::CredentialType::SSH_KEY) {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                for key in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                    let key_path = PathBuf::from(&home).join(".ssh").join(key);
                    if key_path.exists() {
                        if let Ok(cred) = git2::Cred::ssh_key(
                            username_from_url.unwrap_or("git"),
                            None,
                            &key_path,
                            None,
                        ) {
                            return Ok(cred);
                        }
                    }
                }
                if let Ok(cred) =
                    git2::Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
                {
                    return Ok(cred);
                }
            }
            git2::Cred::default()
        });
        callbacks
    }

    fn head_oid(&self) -> Result<git2::Oid> {
        let head = self.repo.head()?;
        head.target()
            .ok_or_else(|| VermanError::config("HEAD is detached or invalid"))
    }
}

impl super::GitRepository for Git2Repository {
    fn is_repository(&self) -> bool {
        true
    }

    fn local_changes(&self) -> Result<bool> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(|s| s.to_string())),
            Ok(_) => Ok(None),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remotes(&self) -> Result<Vec<RemoteStatus>> {
        let branch = self.current_branch()?;
        let head_oid = self.repo.head().ok().and_then(|h| h.target());

        let mut result = Vec::new();
        for name in self.repo.remotes()?.iter().flatten() {
            let remote = self.repo.find_remote(name)?;
            let url = remote.url().unwrap_or_default().to_string();

            // Ahead/behind against the remote's copy of the current branch;
            // unknown (not zero) when there is no tracking ref.
            let mut ahead = None;
            let mut behind = None;
            if let (Some(branch), Some(local_oid)) = (branch.as_deref(), head_oid) {
                let tracking = format!("refs/remotes/{}/{}", name, branch);
                if let Ok(reference) = self.repo.find_reference(&tracking) {
                    if let Some(remote_oid) = reference.target() {
                        let (a, b) = self.repo.graph_ahead_behind(local_oid, remote_oid)?;
                        ahead = Some(a);
                        behind = Some(b);
                    }
                }
            }

            result.push(RemoteStatus {
                name: name.to_string(),
                url,
                ahead,
                behind,
            });
        }

        // Stable ordering with origin first, matching display expectations.
        result.sort_by(|a, b| {
            if a.name == "origin" {
                std::cmp::Ordering::Less
            } else if b.name == "origin" {
                std::cmp::Ordering::Greater
            } else {
                a.name.cmp(&b.name)
            }
        });

        Ok(result)
    }

    fn fetch(&self, remote: &str) -> Result<()> {
        let mut r = self
            .repo
            .find_remote(remote)
            .map_err(|e| VermanError::fetch(remote, format!("remote not found: {}", e)))?;

        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(Self::credential_callbacks());

        let refspec_heads = format!("+refs/heads/*:refs/remotes/{}/*", remote);
        let refspecs = &[refspec_heads.as_str(), "+refs/tags/*:refs/tags/*"];
        r.fetch(refspecs, Some(&mut fetch_options), None)
            .map_err(|e| VermanError::fetch(remote, e.to_string()))
    }

    fn commit(&self, message: &str, include_all: bool) -> Result<bool> {
        if !self.local_changes()? {
            // Nothing to commit is a no-op success.
            return Ok(false);
        }

        let mut index = self.repo.index()?;
        if include_all {
            index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
            index.write()?;
        }

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = self.repo.signature()?;

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|h| h.target())
            .and_then(|oid| self.repo.find_commit(oid).ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        Ok(true)
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        let mut r = self
            .repo
            .find_remote(remote)
            .map_err(|e| VermanError::rejected(remote, format!("remote not found: {}", e)))?;

        let rejection: RefCell<Option<String>> = RefCell::new(None);

        let mut callbacks = Self::credential_callbacks();
        callbacks.push_update_reference(|refname, status| {
            if let Some(status) = status {
                *rejection.borrow_mut() = Some(format!("{}: {}", refname, status));
            }
            Ok(())
        });

        let mut push_options = git2::PushOptions::new();
        push_options.remote_callbacks(callbacks);

        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        r.push(&[refspec.as_str()], Some(&mut push_options))
            .map_err(|e| VermanError::rejected(remote, e.to_string()))?;

        let rejected = rejection.borrow_mut().take();
        match rejected {
            Some(reason) => Err(VermanError::rejected(remote, reason)),
            None => Ok(()),
        }
    }

    fn push_tags(&self, remote: &str) -> Result<()> {
        let mut r = self
            .repo
            .find_remote(remote)
            .map_err(|e| VermanError::rejected(remote, format!("remote not found: {}", e)))?;

        let mut push_options = git2::PushOptions::new();
        push_options.remote_callbacks(Self::credential_callbacks());

        r.push(&["refs/tags/*:refs/tags/*"], Some(&mut push_options))
            .map_err(|e| VermanError::rejected(remote, e.to_string()))
    }

    fn pull_rebase(&self, remote: &str, branch: &str) -> Result<(bool, Vec<PathBuf>)> {
        let tracking = format!("refs/remotes/{}/{}", remote, branch);
        let reference = self
            .repo
            .find_reference(&tracking)
            .map_err(|e| VermanError::fetch(remote, format!("no tracking ref {}: {}", tracking, e)))?;
        let upstream = self.repo.reference_to_annotated_commit(&reference)?;

        let mut opts = git2::RebaseOptions::new();
        let mut checkout = CheckoutBuilder::new();
        checkout.allow_conflicts(true);
        opts.checkout_options(checkout);

        let mut rebase = self.repo.rebase(None, Some(&upstream), None, Some(&mut opts))?;
        let sig = self.repo.signature()?;

        while let Some(op) = rebase.next() {
            op?;
            let index = self.repo.index()?;
            if index.has_conflicts() {
                let mut paths = Vec::new();
                for conflict in index.conflicts()? {
                    let conflict = conflict?;
                    let entry = conflict.our.or(conflict.their);
                    if let Some(entry) = entry {
                        paths.push(PathBuf::from(
                            String::from_utf8_lossy(&entry.path).into_owned(),
                        ));
                    }
                }
                rebase.abort()?;
                return Ok((false, paths));
            }
            rebase.commit(None, &sig, None)?;
        }

        rebase.finish(None)?;
        Ok((true, Vec::new()))
    }

    fn create_tag(&self, name: &str, message: &str) -> Result<()> {
        let tag_ref = format!("refs/tags/{}", name);
        if self.repo.find_reference(&tag_ref).is_ok() {
            return Err(VermanError::TagExists(name.to_string()));
        }

        let head = self.repo.head()?.peel_to_commit()?;
        if message.is_empty() {
            self.repo.tag_lightweight(name, head.as_object(), false)?;
        } else {
            let sig = self.repo.signature()?;
            self.repo.tag(name, head.as_object(), &sig, message, false)?;
        }
        Ok(())
    }

    fn latest_tag(&self) -> Result<Option<String>> {
        let head_oid = self.head_oid()?;

        // Map tag target OIDs to names, handling annotated and lightweight
        // tags. Several version tags on one commit keep the highest version.
        let mut tag_oids: std::collections::HashMap<git2::Oid, (Version, String)> =
            std::collections::HashMap::new();
        for tag_name in self.repo.tag_names(None)?.iter().flatten() {
            let Some(version) = Version::from_tag(tag_name) else {
                continue;
            };
            if let Ok(tag_ref) = self.repo.find_reference(&format!("refs/tags/{}", tag_name)) {
                if let Ok(obj) = tag_ref.peel(git2::ObjectType::Any) {
                    match tag_oids.get(&obj.id()) {
                        Some((existing, _)) if *existing >= version => {}
                        _ => {
                            tag_oids.insert(obj.id(), (version, tag_name.to_string()));
                        }
                    }
                }
            }
        }

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(head_oid)?;
        for oid in revwalk.flatten() {
            if let Some((_, tag_name)) = tag_oids.get(&oid) {
                return Ok(Some(tag_name.clone()));
            }
        }

        Ok(None)
    }
}

// SAFETY: Git2Repository wraps git2::Repository which is Send.
// libgit2 is thread-safe for the read operations we expose via &self.
unsafe impl Sync for Git2Repository {}
