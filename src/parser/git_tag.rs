use std::path::Path;

use crate::domain::{ProjectType, Version};
use crate::error::{Result, VermanError};
use crate::parser::VersionParser;

/// Strategy for VCS-state-only projects: there is no version file at all,
/// and the version derives from repository tags instead.
///
/// `extract` always reports absent. This is a distinct convention, not an
/// error: the version-resolution service recognizes the project type and
/// reads tag state through the git adapter.
pub struct GitTagParser;

impl VersionParser for GitTagParser {
    fn project_type(&self) -> ProjectType {
        ProjectType::GitOnly
    }

    fn version_file(&self) -> Option<&'static str> {
        None
    }

    fn extract(&self, _content: &str) -> Result<Option<Version>> {
        Ok(None)
    }

    fn apply(&self, _content: &str, _version: Version) -> Result<String> {
        Err(VermanError::parse(
            "VCS-state-only projects have no version file to edit",
        ))
    }

    fn detect(&self, project_dir: &Path) -> bool {
        project_dir.join(".git").exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_always_absent() {
        assert_eq!(GitTagParser.extract("1.2.3").unwrap(), None);
        assert_eq!(GitTagParser.extract("").unwrap(), None);
    }

    #[test]
    fn test_apply_is_rejected() {
        assert!(GitTagParser.apply("", Version::new(1, 0, 0)).is_err());
    }

    #[test]
    fn test_no_version_file() {
        assert_eq!(GitTagParser.version_file(), None);
    }
}
