//! Persistent configuration: registered projects, platform tokens and the
//! archive directory.
//!
//! The [ConfigStore] trait keeps callers independent of the storage format;
//! [JsonConfigStore] is the file-backed implementation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::Project;
use crate::error::{Result, VermanError};

/// Read/write access to the persistent configuration.
///
/// Mutating methods persist immediately; there is no separate flush step.
pub trait ConfigStore: Send {
    fn projects(&self) -> Vec<Project>;
    fn project(&self, path: &Path) -> Option<Project>;
    /// Fails with [VermanError::AlreadyExists] when a project with the same
    /// path is registered.
    fn add_project(&mut self, project: Project) -> Result<()>;
    fn update_project(&mut self, project: Project) -> Result<()>;
    fn remove_project(&mut self, path: &Path) -> Result<()>;

    fn token(&self, platform: &str) -> Option<String>;
    fn set_token(&mut self, platform: &str, token: &str, url: Option<&str>) -> Result<()>;
    fn gitea_url(&self) -> Option<String>;

    fn archive_dir(&self) -> Option<PathBuf>;
    fn set_archive_dir(&mut self, dir: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct TokenEntry {
    token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archive_dir: Option<PathBuf>,
    #[serde(default)]
    tokens: HashMap<String, TokenEntry>,
    #[serde(default)]
    projects: Vec<Project>,
}

/// File-backed configuration at `~/.config/verman/config.json`.
pub struct JsonConfigStore {
    path: PathBuf,
    file: ConfigFile,
}

impl JsonConfigStore {
    /// Open the store at the default per-user location.
    pub fn new() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| VermanError::config("cannot determine config directory"))?;
        Self::with_path(base.join("verman").join("config.json"))
    }

    /// Open the store at an explicit path. Missing files yield an empty
    /// configuration; malformed JSON is an error.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        let file = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| VermanError::config(format!("invalid config file: {}", e)))?
        } else {
            ConfigFile::default()
        };
        Ok(JsonConfigStore { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.file)
            .map_err(|e| VermanError::config(format!("cannot serialize config: {}", e)))?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl ConfigStore for JsonConfigStore {
    fn projects(&self) -> Vec<Project> {
        self.file.projects.clone()
    }

    fn project(&self, path: &Path) -> Option<Project> {
        self.file.projects.iter().find(|p| p.path == path).cloned()
    }

    fn add_project(&mut self, project: Project) -> Result<()> {
        if self.file.projects.iter().any(|p| p.path == project.path) {
            return Err(VermanError::AlreadyExists(project.path.clone()));
        }
        self.file.projects.push(project);
        self.save()
    }

    fn update_project(&mut self, project: Project) -> Result<()> {
        match self.file.projects.iter_mut().find(|p| p.path == project.path) {
            Some(existing) => {
                *existing = project;
                self.save()
            }
            None => Err(VermanError::config(format!(
                "project not registered: {}",
                project.path.display()
            ))),
        }
    }

    fn remove_project(&mut self, path: &Path) -> Result<()> {
        let before = self.file.projects.len();
        self.file.projects.retain(|p| p.path != path);
        if self.file.projects.len() == before {
            return Err(VermanError::config(format!(
                "project not registered: {}",
                path.display()
            )));
        }
        self.save()
    }

    fn token(&self, platform: &str) -> Option<String> {
        self.file
            .tokens
            .get(platform)
            .map(|t| t.token.clone())
            .filter(|t| !t.is_empty())
    }

    fn set_token(&mut self, platform: &str, token: &str, url: Option<&str>) -> Result<()> {
        self.file.tokens.insert(
            platform.to_string(),
            TokenEntry {
                token: token.to_string(),
                url: url.map(|u| u.to_string()),
            },
        );
        self.save()
    }

    fn gitea_url(&self) -> Option<String> {
        self.file
            .tokens
            .get("gitea")
            .and_then(|t| t.url.clone())
            .filter(|u| !u.is_empty())
    }

    fn archive_dir(&self) -> Option<PathBuf> {
        self.file.archive_dir.clone()
    }

    fn set_archive_dir(&mut self, dir: &Path) -> Result<()> {
        self.file.archive_dir = Some(dir.to_path_buf());
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProjectType;
    use tempfile::TempDir;

    fn sample_project(path: &Path) -> Project {
        Project {
            path: path.to_path_buf(),
            project_type: ProjectType::Npm,
            remotes: Vec::new(),
            publish_to: vec!["github".to_string()],
            repos: HashMap::new(),
            exclude: Vec::new(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let dir = TempDir::new().unwrap();
        let store = JsonConfigStore::with_path(dir.path().join("config.json")).unwrap();
        assert!(store.projects().is_empty());
        assert_eq!(store.token("github"), None);
        assert_eq!(store.archive_dir(), None);
    }

    #[test]
    fn test_round_trip_persists() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");

        let mut store = JsonConfigStore::with_path(config_path.clone()).unwrap();
        store
            .add_project(sample_project(Path::new("/tmp/demo")))
            .unwrap();
        store.set_token("github", "ghp_abc", None).unwrap();
        store
            .set_token("gitea", "gta_xyz", Some("https://git.example.com"))
            .unwrap();
        store.set_archive_dir(Path::new("/tmp/archives")).unwrap();

        let reloaded = JsonConfigStore::with_path(config_path).unwrap();
        assert_eq!(reloaded.projects().len(), 1);
        assert_eq!(reloaded.token("github"), Some("ghp_abc".to_string()));
        assert_eq!(reloaded.token("gitea"), Some("gta_xyz".to_string()));
        assert_eq!(
            reloaded.gitea_url(),
            Some("https://git.example.com".to_string())
        );
        assert_eq!(
            reloaded.archive_dir(),
            Some(PathBuf::from("/tmp/archives"))
        );
    }

    #[test]
    fn test_duplicate_project_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonConfigStore::with_path(dir.path().join("config.json")).unwrap();

        store
            .add_project(sample_project(Path::new("/tmp/demo")))
            .unwrap();
        assert!(matches!(
            store.add_project(sample_project(Path::new("/tmp/demo"))),
            Err(VermanError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_update_and_remove_project() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonConfigStore::with_path(dir.path().join("config.json")).unwrap();
        let path = Path::new("/tmp/demo");

        store.add_project(sample_project(path)).unwrap();

        let mut updated = sample_project(path);
        updated.project_type = ProjectType::Python;
        store.update_project(updated).unwrap();
        assert_eq!(
            store.project(path).unwrap().project_type,
            ProjectType::Python
        );

        store.remove_project(path).unwrap();
        assert!(store.project(path).is_none());
        assert!(store.remove_project(path).is_err());
    }

    #[test]
    fn test_empty_token_is_none() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonConfigStore::with_path(dir.path().join("config.json")).unwrap();
        store.set_token("gitee", "", None).unwrap();
        assert_eq!(store.token("gitee"), None);
    }

    #[test]
    fn test_malformed_config_is_error() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(&config_path, "{not json").unwrap();
        assert!(JsonConfigStore::with_path(config_path).is_err());
    }
}
