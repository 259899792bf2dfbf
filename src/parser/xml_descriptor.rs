use regex::Regex;
use std::sync::OnceLock;

use crate::domain::{ProjectType, Version};
use crate::error::{Result, VermanError};
use crate::parser::VersionParser;

/// Parser for XML plugin descriptors: the `VersionName="x.y.z"` attribute
/// in `plugin.xml`.
pub struct XmlDescriptorParser;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"VersionName\s*=\s*"(\d+)\.(\d+)\.(\d+)""#).unwrap())
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"VersionName\s*="#).unwrap())
}

impl VersionParser for XmlDescriptorParser {
    fn project_type(&self) -> ProjectType {
        ProjectType::XmlDescriptor
    }

    fn version_file(&self) -> Option<&'static str> {
        Some("plugin.xml")
    }

    fn extract(&self, content: &str) -> Result<Option<Version>> {
        if let Some(caps) = version_re().captures(content) {
            return Ok(Some(Version::new(
                caps[1].parse().unwrap_or(0),
                caps[2].parse().unwrap_or(0),
                caps[3].parse().unwrap_or(0),
            )));
        }
        if attr_re().is_match(content) {
            return Err(VermanError::parse(
                "VersionName attribute is not an X.Y.Z string",
            ));
        }
        Ok(None)
    }

    fn apply(&self, content: &str, version: Version) -> Result<String> {
        if self.extract(content)?.is_none() {
            return Err(VermanError::parse(
                "no VersionName attribute to update in plugin.xml",
            ));
        }
        let replacement = format!(r#"VersionName="{}""#, version);
        Ok(version_re().replace(content, replacement.as_str()).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLUGIN: &str = "<?xml version=\"1.0\"?>\n<plugin Name=\"tool\" VersionName=\"0.3.1\">\n  <entry file=\"main.lua\"/>\n</plugin>\n";

    #[test]
    fn test_extract() {
        assert_eq!(
            XmlDescriptorParser.extract(PLUGIN).unwrap(),
            Some(Version::new(0, 3, 1))
        );
    }

    #[test]
    fn test_extract_absent() {
        assert_eq!(
            XmlDescriptorParser.extract("<plugin Name=\"x\"/>\n").unwrap(),
            None
        );
    }

    #[test]
    fn test_extract_malformed_attribute() {
        assert!(XmlDescriptorParser
            .extract("<plugin VersionName=\"latest\"/>\n")
            .is_err());
    }

    #[test]
    fn test_apply_minimal_edit() {
        let updated = XmlDescriptorParser.apply(PLUGIN, Version::new(0, 4, 0)).unwrap();
        assert_eq!(updated, PLUGIN.replace("\"0.3.1\"", "\"0.4.0\""));
    }

    #[test]
    fn test_round_trip() {
        let v = Version::new(1, 0, 0);
        let updated = XmlDescriptorParser.apply(PLUGIN, v).unwrap();
        assert_eq!(XmlDescriptorParser.extract(&updated).unwrap(), Some(v));
    }
}
