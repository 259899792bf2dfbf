use regex::Regex;
use std::sync::OnceLock;

use crate::domain::{ProjectType, Version};
use crate::error::{Result, VermanError};
use crate::parser::VersionParser;

/// Parser for npm packages: the `"version"` string field in `package.json`.
///
/// Content is validated as JSON first so malformed files fail with a parse
/// error instead of silently reporting "no version". Mutation stays
/// regex-based to keep the edit minimal: re-serializing would destroy key
/// order and formatting.
pub struct PackageJsonParser;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""version"\s*:\s*"(\d+)\.(\d+)\.(\d+)""#).unwrap())
}

impl VersionParser for PackageJsonParser {
    fn project_type(&self) -> ProjectType {
        ProjectType::Npm
    }

    fn version_file(&self) -> Option<&'static str> {
        Some("package.json")
    }

    fn extract(&self, content: &str) -> Result<Option<Version>> {
        let doc: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| VermanError::parse(format!("invalid package.json: {}", e)))?;

        // First textual occurrence is the authoritative declaration; the
        // top-level field only disambiguates malformed-vs-absent.
        if let Some(caps) = version_re().captures(content) {
            return Ok(Some(Version::new(
                caps[1].parse().unwrap_or(0),
                caps[2].parse().unwrap_or(0),
                caps[3].parse().unwrap_or(0),
            )));
        }
        match doc.get("version") {
            None => Ok(None),
            Some(other) => Err(VermanError::parse(format!(
                "version field is not an X.Y.Z string: {}",
                other
            ))),
        }
    }

    fn apply(&self, content: &str, version: Version) -> Result<String> {
        if self.extract(content)?.is_none() {
            return Err(VermanError::parse("no version field to update in package.json"));
        }
        let replacement = format!(r#""version": "{}""#, version);
        Ok(version_re().replace(content, replacement.as_str()).into_owned())
    }

    fn initial_content(&self, version: Version) -> Option<String> {
        Some(format!("{{\n  \"version\": \"{}\"\n}}\n", version))
    }
}
