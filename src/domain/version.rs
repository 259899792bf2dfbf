use crate::error::{Result, VermanError};
use std::fmt;
use std::str::FromStr;

/// Semantic version as a (major, minor, patch) tuple of non-negative integers.
///
/// The string form is always `"{major}.{minor}.{patch}"` and parsing that
/// form reproduces the same tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Which component a bump operation increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpKind {
    Major,
    Minor,
    Patch,
}

impl Version {
    pub const ZERO: Version = Version {
        major: 0,
        minor: 0,
        patch: 0,
    };

    /// Initial version for freshly created version files.
    ///
    /// `0.0.1` by convention: the first publishable version, not `0.0.0`.
    pub const INITIAL: Version = Version {
        major: 0,
        minor: 0,
        patch: 1,
    };

    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version from a git tag, tolerating a 'v'/'V' prefix.
    ///
    /// Returns `None` rather than an error: unparseable tags are simply
    /// not version tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let clean = tag.trim_start_matches('v').trim_start_matches('V');
        clean.parse().ok()
    }

    /// Bump one component, zeroing all components of lower significance.
    pub fn bump(&self, kind: BumpKind) -> Self {
        match kind {
            BumpKind::Major => Version::new(self.major + 1, 0, 0),
            BumpKind::Minor => Version::new(self.major, self.minor + 1, 0),
            BumpKind::Patch => Version::new(self.major, self.minor, self.patch + 1),
        }
    }

    /// The release tag for this version (e.g. "v1.2.3").
    pub fn tag(&self) -> String {
        format!("v{}", self)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VermanError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(VermanError::parse(format!(
                "invalid version '{}' - expected X.Y.Z",
                s
            )));
        }

        let component = |idx: usize, name: &str| -> Result<u32> {
            parts[idx]
                .parse::<u32>()
                .map_err(|_| VermanError::parse(format!("invalid {} component: {}", name, parts[idx])))
        };

        Ok(Version {
            major: component(0, "major")?,
            minor: component(1, "minor")?,
            patch: component(2, "patch")?,
        })
    }
}

impl FromStr for BumpKind {
    type Err = VermanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "major" => Ok(BumpKind::Major),
            "minor" => Ok(BumpKind::Minor),
            "patch" => Ok(BumpKind::Patch),
            other => Err(VermanError::parse(format!(
                "unknown bump component '{}' - expected major, minor or patch",
                other
            ))),
        }
    }
}
