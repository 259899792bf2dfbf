use regex::Regex;
use std::sync::OnceLock;

use crate::domain::{ProjectType, Version};
use crate::error::{Result, VermanError};
use crate::parser::VersionParser;

/// Parser for the plain-text convention: `version.txt` holding a single
/// `x.y.z` line. Trailing whitespace and newline style are preserved on
/// mutation.
pub struct PlainTextParser;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap())
}

impl VersionParser for PlainTextParser {
    fn project_type(&self) -> ProjectType {
        ProjectType::PlainText
    }

    fn version_file(&self) -> Option<&'static str> {
        Some("version.txt")
    }

    fn extract(&self, content: &str) -> Result<Option<Version>> {
        if content.trim().is_empty() {
            return Ok(None);
        }
        match version_re().captures(content) {
            Some(caps) => Ok(Some(Version::new(
                caps[1].parse().unwrap_or(0),
                caps[2].parse().unwrap_or(0),
                caps[3].parse().unwrap_or(0),
            ))),
            None => Err(VermanError::parse(format!(
                "version.txt does not contain an X.Y.Z version: '{}'",
                content.trim()
            ))),
        }
    }

    fn apply(&self, content: &str, version: Version) -> Result<String> {
        if self.extract(content)?.is_none() {
            return Ok(format!("{}\n", version));
        }
        Ok(version_re()
            .replace(content, version.to_string().as_str())
            .into_owned())
    }

    fn initial_content(&self, version: Version) -> Option<String> {
        Some(format!("{}\n", version))
    }
}
