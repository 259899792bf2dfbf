use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::domain::{ProjectType, Version};
use crate::error::{Result, VermanError};
use crate::parser::VersionParser;

/// Parser for compiled Python applications: `version.py` alongside an app
/// entry point.
///
/// Canonical format:
/// ```text
/// __version__ = "1.0.0"
/// VERSION = (1, 0, 0)   # optional tuple form, kept in sync on mutation
/// ```
pub struct PythonAppParser;

const ENTRY_POINTS: &[&str] = &["main.py", "app.py", "__main__.py"];

fn string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"__version__\s*=\s*["'](\d+)\.(\d+)\.(\d+)["']"#).unwrap())
}

fn tuple_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"VERSION\s*=\s*\((\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\)").unwrap())
}

impl VersionParser for PythonAppParser {
    fn project_type(&self) -> ProjectType {
        ProjectType::PythonApp
    }

    fn version_file(&self) -> Option<&'static str> {
        Some("version.py")
    }

    fn extract(&self, content: &str) -> Result<Option<Version>> {
        // Prefer the __version__ string; fall back to the VERSION tuple.
        for re in [string_re(), tuple_re()] {
            if let Some(caps) = re.captures(content) {
                return Ok(Some(Version::new(
                    caps[1].parse().unwrap_or(0),
                    caps[2].parse().unwrap_or(0),
                    caps[3].parse().unwrap_or(0),
                )));
            }
        }
        if content.contains("__version__") {
            return Err(VermanError::parse(
                "__version__ is present but not an X.Y.Z string",
            ));
        }
        Ok(None)
    }

    fn apply(&self, content: &str, version: Version) -> Result<String> {
        if self.extract(content)?.is_none() {
            return Err(VermanError::parse("no version declaration in version.py"));
        }
        let string_repl = format!("__version__ = \"{}\"", version);
        let tuple_repl = format!(
            "VERSION = ({}, {}, {})",
            version.major, version.minor, version.patch
        );
        // Both forms are kept in sync; each edit touches only its first span.
        let updated = string_re().replace(content, string_repl.as_str());
        Ok(tuple_re().replace(&updated, tuple_repl.as_str()).into_owned())
    }

    fn detect(&self, project_dir: &Path) -> bool {
        project_dir.join("version.py").exists()
            && ENTRY_POINTS.iter().any(|f| project_dir.join(f).exists())
    }

    fn initial_content(&self, version: Version) -> Option<String> {
        Some(format!("__version__ = \"{}\"\n", version))
    }
}
