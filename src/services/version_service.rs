use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::domain::{BumpKind, ProjectType, Version};
use crate::error::{Result, VermanError};
use crate::git::{repository::Git2Repository, GitRepository};
use crate::parser::ParserRegistry;

/// Snapshot of a project's version state, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub file_path: Option<PathBuf>,
    pub exists: bool,
    pub parseable: bool,
    pub version: Option<Version>,
}

/// Reads, bumps and seeds project version files through the parser registry.
pub struct VersionService<'a> {
    registry: &'a ParserRegistry,
}

impl<'a> VersionService<'a> {
    pub fn new(registry: &'a ParserRegistry) -> Self {
        VersionService { registry }
    }

    /// Current version of the project, or `None` when no version is
    /// recorded yet. VCS-state-only projects derive it from the newest
    /// version-shaped tag instead of a file.
    pub fn get_version(&self, path: &Path, ty: ProjectType) -> Result<Option<Version>> {
        if ty.is_vcs_only() {
            return self.latest_tag_version(path);
        }

        let parser = self
            .registry
            .get(ty)
            .ok_or_else(|| VermanError::UnsupportedProjectType(ty.as_str().to_string()))?;
        let file = match parser.version_file() {
            Some(file) => path.join(file),
            None => return Ok(None),
        };
        if !file.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&file)?;
        parser.extract(&content)
    }

    /// Bump the version and write it back with a minimal textual edit.
    ///
    /// A missing but creatable version file counts as `0.0.0`; the file is
    /// seeded with the bumped value. VCS-state-only projects record the
    /// bumped value as a new tag instead of touching any file.
    pub fn bump_version(&self, path: &Path, ty: ProjectType, kind: BumpKind) -> Result<Version> {
        if ty.is_vcs_only() {
            let repo = Git2Repository::open(path)?;
            let current = repo
                .latest_tag()?
                .and_then(|t| Version::from_tag(&t))
                .unwrap_or(Version::ZERO);
            let next = current.bump(kind);
            repo.create_tag(&next.tag(), "")?;
            debug!("tagged {} at {}", next.tag(), path.display());
            return Ok(next);
        }

        let parser = self
            .registry
            .get(ty)
            .ok_or_else(|| VermanError::UnsupportedProjectType(ty.as_str().to_string()))?;
        let file = parser
            .version_file()
            .map(|f| path.join(f))
            .ok_or_else(|| VermanError::UnsupportedProjectType(ty.as_str().to_string()))?;

        if !file.exists() {
            let next = Version::ZERO.bump(kind);
            let content = parser.initial_content(next).ok_or_else(|| {
                VermanError::config(format!(
                    "no version file at {} and project type '{}' cannot create one",
                    file.display(),
                    ty.as_str()
                ))
            })?;
            fs::write(&file, content)?;
            debug!("seeded {} with {}", file.display(), next);
            return Ok(next);
        }

        let content = fs::read_to_string(&file)?;
        let current = parser.extract(&content)?.ok_or_else(|| {
            VermanError::parse(format!("no version found in {}", file.display()))
        })?;
        let next = current.bump(kind);
        let updated = parser.apply(&content, next)?;
        fs::write(&file, updated)?;
        debug!("bumped {} from {} to {}", file.display(), current, next);
        Ok(next)
    }

    /// Seed a fresh version file at `0.0.1`.
    pub fn create_version_file(&self, path: &Path, ty: ProjectType) -> Result<PathBuf> {
        let parser = self
            .registry
            .get(ty)
            .ok_or_else(|| VermanError::UnsupportedProjectType(ty.as_str().to_string()))?;
        let file = parser
            .version_file()
            .map(|f| path.join(f))
            .ok_or_else(|| VermanError::UnsupportedProjectType(ty.as_str().to_string()))?;

        if file.exists() {
            return Err(VermanError::AlreadyExists(file));
        }

        let content = parser.initial_content(Version::INITIAL).ok_or_else(|| {
            VermanError::config(format!(
                "project type '{}' does not support creating a version file",
                ty.as_str()
            ))
        })?;
        fs::write(&file, content)?;
        Ok(file)
    }

    /// Full version state of a project, for display.
    pub fn version_info(&self, path: &Path, ty: ProjectType) -> Result<VersionInfo> {
        if ty.is_vcs_only() {
            let version = self.latest_tag_version(path)?;
            return Ok(VersionInfo {
                file_path: None,
                exists: false,
                parseable: version.is_some(),
                version,
            });
        }

        let parser = self
            .registry
            .get(ty)
            .ok_or_else(|| VermanError::UnsupportedProjectType(ty.as_str().to_string()))?;
        let file = parser.version_file().map(|f| path.join(f));

        let (exists, version, parseable) = match &file {
            Some(file) if file.exists() => {
                let content = fs::read_to_string(file)?;
                match parser.extract(&content) {
                    Ok(version) => (true, version, version.is_some()),
                    Err(_) => (true, None, false),
                }
            }
            _ => (false, None, false),
        };

        Ok(VersionInfo {
            file_path: file,
            exists,
            parseable,
            version,
        })
    }

    fn latest_tag_version(&self, path: &Path) -> Result<Option<Version>> {
        let repo = Git2Repository::open(path)?;
        Ok(repo.latest_tag()?.and_then(|t| Version::from_tag(&t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service_registry() -> ParserRegistry {
        ParserRegistry::with_builtin_parsers()
    }

    #[test]
    fn test_get_version_missing_file() {
        let dir = TempDir::new().unwrap();
        let registry = service_registry();
        let service = VersionService::new(&registry);

        let version = service
            .get_version(dir.path(), ProjectType::PlainText)
            .unwrap();
        assert_eq!(version, None);
    }

    #[test]
    fn test_bump_seeds_missing_file() {
        let dir = TempDir::new().unwrap();
        let registry = service_registry();
        let service = VersionService::new(&registry);

        let version = service
            .bump_version(dir.path(), ProjectType::PlainText, BumpKind::Patch)
            .unwrap();
        assert_eq!(version, Version::new(0, 0, 1));
        assert!(dir.path().join("version.txt").exists());
    }

    #[test]
    fn test_bump_patch_npm() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            "{\n  \"name\": \"demo\",\n  \"version\": \"2.1.9\"\n}\n",
        )
        .unwrap();

        let registry = service_registry();
        let service = VersionService::new(&registry);
        let version = service
            .bump_version(dir.path(), ProjectType::Npm, BumpKind::Patch)
            .unwrap();
        assert_eq!(version, Version::new(2, 1, 10));

        let content = fs::read_to_string(dir.path().join("package.json")).unwrap();
        assert!(content.contains("\"version\": \"2.1.10\""));
        assert!(content.contains("\"name\": \"demo\""));
    }

    #[test]
    fn test_bump_minor_resets_patch() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("version.txt"), "1.4.9\n").unwrap();

        let registry = service_registry();
        let service = VersionService::new(&registry);
        let version = service
            .bump_version(dir.path(), ProjectType::PlainText, BumpKind::Minor)
            .unwrap();
        assert_eq!(version, Version::new(1, 5, 0));
    }

    fn init_repo_with_commit(dir: &TempDir) -> git2::Repository {
        let repo = git2::Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Test User").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }
        fs::write(dir.path().join("README"), "demo\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        {
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = repo.signature().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn test_bump_vcs_only_records_new_tag() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo_with_commit(&dir);
        let head = repo.head().unwrap().target().unwrap();
        let object = repo.find_object(head, None).unwrap();
        repo.tag_lightweight("v1.0.0", &object, false).unwrap();

        let registry = service_registry();
        let service = VersionService::new(&registry);
        let bumped = service
            .bump_version(dir.path(), ProjectType::GitOnly, BumpKind::Patch)
            .unwrap();
        assert_eq!(bumped, Version::new(1, 0, 1));

        // The bump must survive a re-resolution from tag state.
        assert_eq!(
            service.get_version(dir.path(), ProjectType::GitOnly).unwrap(),
            Some(Version::new(1, 0, 1))
        );
        assert!(repo.find_reference("refs/tags/v1.0.1").is_ok());
        assert!(!dir.path().join("version.txt").exists());
    }

    #[test]
    fn test_bump_unparseable_content_is_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("version.txt"), "not a version\n").unwrap();

        let registry = service_registry();
        let service = VersionService::new(&registry);
        let result = service.bump_version(dir.path(), ProjectType::PlainText, BumpKind::Patch);
        assert!(matches!(result, Err(VermanError::Parse(_))));
    }

    #[test]
    fn test_create_version_file() {
        let dir = TempDir::new().unwrap();
        let registry = service_registry();
        let service = VersionService::new(&registry);

        let file = service
            .create_version_file(dir.path(), ProjectType::PlainText)
            .unwrap();
        assert_eq!(
            fs::read_to_string(&file).unwrap().trim(),
            "0.0.1"
        );

        assert!(matches!(
            service.create_version_file(dir.path(), ProjectType::PlainText),
            Err(VermanError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_unregistered_type_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let registry = ParserRegistry::new();
        let service = VersionService::new(&registry);

        assert!(matches!(
            service.get_version(dir.path(), ProjectType::Npm),
            Err(VermanError::UnsupportedProjectType(_))
        ));
    }

    #[test]
    fn test_version_info_unparseable_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("version.txt"), "garbage\n").unwrap();

        let registry = service_registry();
        let service = VersionService::new(&registry);
        let info = service
            .version_info(dir.path(), ProjectType::PlainText)
            .unwrap();
        assert!(info.exists);
        assert!(!info.parseable);
        assert_eq!(info.version, None);
    }
}
