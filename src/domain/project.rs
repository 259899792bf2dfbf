use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, VermanError};

/// Packaging convention of a managed project.
///
/// Selects the version-parsing strategy. The set is closed: new conventions
/// are added here and registered in the parser registry at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    /// Blender addon: `bl_info` version tuple in `__init__.py`
    BlenderAddon,
    /// npm package: `"version"` string in `package.json`
    Npm,
    /// Python package: `version` key in `pyproject.toml`
    Python,
    /// Compiled Python application: `__version__` in `version.py`, dist/ output
    PythonApp,
    /// Single-line `version.txt`
    PlainText,
    /// `VersionName` attribute in `plugin.xml`
    XmlDescriptor,
    /// No version file at all; version derives from repository tags
    GitOnly,
    Unknown,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::BlenderAddon => "blender_addon",
            ProjectType::Npm => "npm",
            ProjectType::Python => "python",
            ProjectType::PythonApp => "python_app",
            ProjectType::PlainText => "plain_text",
            ProjectType::XmlDescriptor => "xml_descriptor",
            ProjectType::GitOnly => "git_only",
            ProjectType::Unknown => "unknown",
        }
    }

    /// True for conventions whose version lives in VCS state, not a file.
    pub fn is_vcs_only(&self) -> bool {
        matches!(self, ProjectType::GitOnly)
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = VermanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "blender_addon" => Ok(ProjectType::BlenderAddon),
            "npm" => Ok(ProjectType::Npm),
            "python" => Ok(ProjectType::Python),
            "python_app" => Ok(ProjectType::PythonApp),
            "plain_text" => Ok(ProjectType::PlainText),
            "xml_descriptor" => Ok(ProjectType::XmlDescriptor),
            "git_only" => Ok(ProjectType::GitOnly),
            "unknown" => Ok(ProjectType::Unknown),
            other => Err(VermanError::UnsupportedProjectType(other.to_string())),
        }
    }
}

/// A configured git remote paired with its hosting platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    pub name: String,
    pub url: String,
    /// Platform tag ("github", "gitee", "gitea"); None when undetected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// One managed repository, keyed by filesystem path.
///
/// Owned by the config store; the core borrows it for the duration of a
/// single operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub path: PathBuf,

    #[serde(rename = "type")]
    pub project_type: ProjectType,

    /// Remotes to sync during a publish run; when empty, remotes are
    /// discovered from the repository itself.
    #[serde(default)]
    pub remotes: Vec<RemoteDescriptor>,

    /// Platforms to create releases on (e.g. ["github", "gitee"])
    #[serde(default)]
    pub publish_to: Vec<String>,

    /// Platform name -> "owner/repo" slug
    #[serde(default)]
    pub repos: HashMap<String, String>,

    /// Project-specific packaging exclusions, merged with the defaults
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Project {
    pub fn new(path: impl Into<PathBuf>, project_type: ProjectType) -> Self {
        Project {
            path: path.into(),
            project_type,
            remotes: Vec::new(),
            publish_to: Vec::new(),
            repos: HashMap::new(),
            exclude: Vec::new(),
        }
    }

    /// Directory name, used as archive root and release name prefix.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_type_round_trip() {
        for ty in [
            ProjectType::BlenderAddon,
            ProjectType::Npm,
            ProjectType::Python,
            ProjectType::PythonApp,
            ProjectType::PlainText,
            ProjectType::XmlDescriptor,
            ProjectType::GitOnly,
            ProjectType::Unknown,
        ] {
            assert_eq!(ty.as_str().parse::<ProjectType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_project_type_serde_tag() {
        let json = serde_json::to_string(&ProjectType::BlenderAddon).unwrap();
        assert_eq!(json, "\"blender_addon\"");
    }

    #[test]
    fn test_vcs_only() {
        assert!(ProjectType::GitOnly.is_vcs_only());
        assert!(!ProjectType::Npm.is_vcs_only());
    }

    #[test]
    fn test_project_name() {
        let project = Project::new("/code/MyAddon", ProjectType::BlenderAddon);
        assert_eq!(project.name(), "MyAddon");
    }

    #[test]
    fn test_project_deserialize_defaults() {
        let json = r#"{"path": "/code/app", "type": "python_app"}"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.project_type, ProjectType::PythonApp);
        assert!(project.publish_to.is_empty());
        assert!(project.repos.is_empty());
    }
}
