//! Version-parsing strategies and their registry.
//!
//! One parser per packaging convention. Parsers are pure text transforms:
//! they receive file content and return either an extracted [Version] or
//! content with exactly the version span rewritten. All other bytes are
//! preserved so files co-edited by humans and other tools stay intact.
//!
//! Absence (no version field) is `Ok(None)`, never an error; malformed
//! content (e.g. invalid JSON/TOML) fails with `VermanError::Parse`.

pub mod blender;
pub mod git_tag;
pub mod package_json;
pub mod plain_text;
pub mod pyproject;
pub mod python_app;
pub mod xml_descriptor;

pub use blender::BlenderAddonParser;
pub use git_tag::GitTagParser;
pub use package_json::PackageJsonParser;
pub use plain_text::PlainTextParser;
pub use pyproject::PyProjectParser;
pub use python_app::PythonAppParser;
pub use xml_descriptor::XmlDescriptorParser;

use std::collections::HashMap;
use std::path::Path;

use crate::domain::{ProjectType, Version};
use crate::error::Result;

/// Stateless version-parsing strategy for one project convention.
pub trait VersionParser: Send + Sync {
    /// The project type this parser is bound to.
    fn project_type(&self) -> ProjectType;

    /// The canonical version file name, relative to the project root.
    /// `None` for VCS-state-only conventions that have no file at all.
    fn version_file(&self) -> Option<&'static str>;

    /// Extract the version from file content.
    ///
    /// `Ok(None)` when the version field/pattern is missing; `Err(Parse)`
    /// when the content itself is malformed.
    fn extract(&self, content: &str) -> Result<Option<Version>>;

    /// Rewrite the version in file content with a minimal textual edit.
    ///
    /// Only the first occurrence in canonical declaration position changes;
    /// all other bytes are preserved. `extract(apply(c, v)) == Some(v)`
    /// whenever the span exists.
    fn apply(&self, content: &str, version: Version) -> Result<String>;

    /// Whether this parser's convention matches a project directory.
    /// Defaults to probing for the canonical version file.
    fn detect(&self, project_dir: &Path) -> bool {
        match self.version_file() {
            Some(file) => project_dir.join(file).exists(),
            None => false,
        }
    }

    /// Freshly seeded version-file content for conventions that support
    /// initialization. `None` when the convention cannot be created from
    /// scratch (e.g. a Blender addon's `__init__.py`).
    fn initial_content(&self, _version: Version) -> Option<String> {
        None
    }
}

/// Fixed detection precedence, independent of registration order.
///
/// More specific conventions probe first: a Python app that also carries a
/// `pyproject.toml` must resolve as `python_app`, and a Blender addon's
/// `__init__.py` wins over everything else. `git_only` matches last, only
/// when nothing file-based did.
const DETECTION_ORDER: &[ProjectType] = &[
    ProjectType::BlenderAddon,
    ProjectType::PythonApp,
    ProjectType::Npm,
    ProjectType::Python,
    ProjectType::XmlDescriptor,
    ProjectType::PlainText,
    ProjectType::GitOnly,
];

/// Registry mapping project types to parser strategies.
///
/// Registration is last-write-wins per type, so callers can override a
/// built-in strategy without modifying existing code. Lookups take `&self`
/// only; a populated registry is safe for concurrent reads.
pub struct ParserRegistry {
    parsers: HashMap<ProjectType, Box<dyn VersionParser>>,
}

impl ParserRegistry {
    /// Empty registry, mainly for tests and custom setups.
    pub fn new() -> Self {
        ParserRegistry {
            parsers: HashMap::new(),
        }
    }

    /// Registry with every built-in parser registered.
    pub fn with_builtin_parsers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(BlenderAddonParser));
        registry.register(Box::new(PythonAppParser));
        registry.register(Box::new(PackageJsonParser));
        registry.register(Box::new(PyProjectParser));
        registry.register(Box::new(XmlDescriptorParser));
        registry.register(Box::new(PlainTextParser));
        registry.register(Box::new(GitTagParser));
        registry
    }

    /// Add a strategy keyed by its project type. Re-registering the same
    /// type replaces the previous entry.
    pub fn register(&mut self, parser: Box<dyn VersionParser>) {
        self.parsers.insert(parser.project_type(), parser);
    }

    /// Look up the parser bound to a project type.
    pub fn get(&self, project_type: ProjectType) -> Option<&dyn VersionParser> {
        self.parsers.get(&project_type).map(|p| p.as_ref())
    }

    /// Probe a project directory for each registered parser's marker, in
    /// the documented precedence order, and return the first match.
    pub fn detect(&self, project_dir: &Path) -> Option<&dyn VersionParser> {
        DETECTION_ORDER
            .iter()
            .filter_map(|ty| self.get(*ty))
            .find(|parser| parser.detect(project_dir))
    }

    /// All registered project types, in detection precedence order.
    pub fn available(&self) -> Vec<ProjectType> {
        DETECTION_ORDER
            .iter()
            .copied()
            .filter(|ty| self.parsers.contains_key(ty))
            .collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtin_parsers()
    }
}
