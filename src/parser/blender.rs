use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::domain::{ProjectType, Version};
use crate::error::{Result, VermanError};
use crate::parser::VersionParser;

/// Parser for Blender addons: the `bl_info` version tuple in `__init__.py`.
///
/// Format: `"version": (1, 0, 0)` inside the `bl_info` dict. Detection
/// requires the `bl_info` marker, since plenty of non-addon Python packages
/// carry an `__init__.py`.
pub struct BlenderAddonParser;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""version"\s*:\s*\((\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\)"#).unwrap()
    })
}

fn version_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""version"\s*:"#).unwrap())
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""name"\s*:\s*"([^"]+)""#).unwrap())
}

impl BlenderAddonParser {
    /// The addon's display name from the `bl_info` dict, when present.
    pub fn addon_name(project_dir: &Path) -> Option<String> {
        let content = std::fs::read_to_string(project_dir.join("__init__.py")).ok()?;
        name_re()
            .captures(&content)
            .map(|caps| caps[1].to_string())
    }
}

impl VersionParser for BlenderAddonParser {
    fn project_type(&self) -> ProjectType {
        ProjectType::BlenderAddon
    }

    fn version_file(&self) -> Option<&'static str> {
        Some("__init__.py")
    }

    fn extract(&self, content: &str) -> Result<Option<Version>> {
        if let Some(caps) = version_re().captures(content) {
            return Ok(Some(Version::new(
                caps[1].parse().unwrap_or(0),
                caps[2].parse().unwrap_or(0),
                caps[3].parse().unwrap_or(0),
            )));
        }
        // A "version" key that isn't an (x, y, z) tuple is malformed, not absent.
        if version_key_re().is_match(content) {
            return Err(VermanError::parse(
                "bl_info version entry is not an (x, y, z) integer tuple",
            ));
        }
        Ok(None)
    }

    fn apply(&self, content: &str, version: Version) -> Result<String> {
        if self.extract(content)?.is_none() {
            return Err(VermanError::parse(
                "no bl_info version tuple to update in __init__.py",
            ));
        }
        let replacement = format!(
            r#""version": ({}, {}, {})"#,
            version.major, version.minor, version.patch
        );
        // Only the first occurrence is authoritative.
        Ok(version_re().replace(content, replacement.as_str()).into_owned())
    }

    fn detect(&self, project_dir: &Path) -> bool {
        let init = project_dir.join("__init__.py");
        match std::fs::read_to_string(&init) {
            Ok(content) => content.contains("bl_info"),
            Err(_) => false,
        }
    }
}
