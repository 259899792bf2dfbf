use regex::Regex;
use std::sync::OnceLock;

use crate::domain::{ProjectType, Version};
use crate::error::{Result, VermanError};
use crate::parser::VersionParser;

/// Parser for Python packages: the `version = "x.y.z"` key in
/// `pyproject.toml`.
///
/// Content is checked for TOML well-formedness so truncated or corrupt
/// files surface as parse errors. The edit itself is regex-based against
/// the first `version` assignment, preserving comments and formatting
/// that a TOML re-serialization would lose.
pub struct PyProjectParser;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"version\s*=\s*"(\d+)\.(\d+)\.(\d+)""#).unwrap())
}

impl VersionParser for PyProjectParser {
    fn project_type(&self) -> ProjectType {
        ProjectType::Python
    }

    fn version_file(&self) -> Option<&'static str> {
        Some("pyproject.toml")
    }

    fn extract(&self, content: &str) -> Result<Option<Version>> {
        content
            .parse::<toml::Table>()
            .map_err(|e| VermanError::parse(format!("invalid pyproject.toml: {}", e)))?;

        match version_re().captures(content) {
            Some(caps) => Ok(Some(Version::new(
                caps[1].parse().unwrap_or(0),
                caps[2].parse().unwrap_or(0),
                caps[3].parse().unwrap_or(0),
            ))),
            None => Ok(None),
        }
    }

    fn apply(&self, content: &str, version: Version) -> Result<String> {
        if self.extract(content)?.is_none() {
            return Err(VermanError::parse(
                "no version key to update in pyproject.toml",
            ));
        }
        let replacement = format!(r#"version = "{}""#, version);
        Ok(version_re().replace(content, replacement.as_str()).into_owned())
    }

    fn initial_content(&self, version: Version) -> Option<String> {
        Some(format!("[project]\nversion = \"{}\"\n", version))
    }
}
