use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::Version;
use crate::error::{Result, VermanError};

/// Names and `*.ext` patterns excluded from every archive.
const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".idea",
    ".vscode",
    "__pycache__",
    ".gitignore",
    ".gitattributes",
    ".DS_Store",
    "*.pyc",
    "*.pyo",
    ".env",
    ".venv",
    "venv",
    "node_modules",
    "*.log",
    ".pytest_cache",
];

/// A previously produced archive in the archive directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub version: String,
    pub size: u64,
}

/// Produces deterministic zip archives of a project tree.
///
/// Members are written in sorted path order with fixed metadata, so
/// repeated runs over unchanged input are byte-identical.
pub struct Packager {
    project_path: PathBuf,
    project_name: String,
    archive_dir: PathBuf,
    excludes: Vec<String>,
}

impl Packager {
    pub fn new(
        project_path: impl Into<PathBuf>,
        project_name: impl Into<String>,
        archive_dir: impl Into<PathBuf>,
    ) -> Self {
        Packager {
            project_path: project_path.into(),
            project_name: project_name.into(),
            archive_dir: archive_dir.into(),
            excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add a project-specific exclusion on top of the defaults.
    pub fn add_exclude(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if !self.excludes.contains(&pattern) {
            self.excludes.push(pattern);
        }
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excludes.iter().any(|pattern| {
            match pattern.strip_prefix('*') {
                Some(suffix) => name.ends_with(suffix),
                None => name == pattern,
            }
        })
    }

    fn archive_path(&self, version: Version) -> PathBuf {
        self.archive_dir
            .join(format!("{}_v{}.zip", self.project_name, version))
    }

    /// Archive the project tree as `{name}_v{version}.zip`, with the
    /// project name as the archive root.
    pub fn create_archive(&self, version: Version) -> Result<PathBuf> {
        self.write_archive(version, &self.project_path, true)
    }

    /// Archive only the build output under `dist/`. When `dist/` holds a
    /// single directory (the usual bundler layout), that directory's
    /// contents become the archive payload.
    pub fn create_dist_archive(&self, version: Version) -> Result<PathBuf> {
        let dist = self.project_path.join("dist");
        if !dist.is_dir() {
            return Err(VermanError::config(format!(
                "no dist directory in {}",
                self.project_path.display()
            )));
        }

        let mut entries: Vec<PathBuf> = fs::read_dir(&dist)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        entries.sort();
        let source = entries.into_iter().next().unwrap_or(dist);

        self.write_archive(version, &source, false)
    }

    fn write_archive(&self, version: Version, source: &Path, filtered: bool) -> Result<PathBuf> {
        fs::create_dir_all(&self.archive_dir)?;
        let output = self.archive_path(version);
        if output.exists() {
            fs::remove_file(&output)?;
        }

        // Collect first, then sort, so member order does not depend on
        // directory iteration order.
        let mut files: Vec<PathBuf> = Vec::new();
        let walker = WalkDir::new(source).into_iter().filter_entry(|entry| {
            if !filtered {
                return true;
            }
            entry
                .file_name()
                .to_str()
                .map(|name| !self.is_excluded(name))
                .unwrap_or(true)
        });
        for entry in walker {
            let entry = entry.map_err(|e| {
                VermanError::config(format!("cannot walk {}: {}", source.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if filtered {
                let name = entry.file_name().to_string_lossy();
                if self.is_excluded(&name) {
                    continue;
                }
            }
            files.push(entry.into_path());
        }
        files.sort();

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644)
            .last_modified_time(zip::DateTime::default());

        let file = fs::File::create(&output)?;
        let mut writer = ZipWriter::new(file);
        for path in &files {
            let relative = path
                .strip_prefix(source)
                .map_err(|_| VermanError::config(format!("path outside source tree: {}", path.display())))?;
            let mut member = PathBuf::from(&self.project_name);
            member.push(relative);
            let member_name = member
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");

            writer
                .start_file(member_name, options)
                .map_err(|e| VermanError::config(format!("zip write failed: {}", e)))?;
            writer.write_all(&fs::read(path)?)?;
        }
        writer
            .finish()
            .map_err(|e| VermanError::config(format!("zip finalize failed: {}", e)))?;

        debug!("wrote archive {} ({} members)", output.display(), files.len());
        Ok(output)
    }

    /// Archives previously produced for this project, newest version first.
    pub fn archive_history(&self) -> Result<Vec<ArchiveEntry>> {
        let mut history = Vec::new();
        if !self.archive_dir.exists() {
            return Ok(history);
        }

        let prefix = format!("{}_v", self.project_name);
        for entry in fs::read_dir(&self.archive_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(version) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".zip"))
            {
                history.push(ArchiveEntry {
                    path: entry.path(),
                    version: version.to_string(),
                    size: entry.metadata()?.len(),
                });
            }
        }

        // Numeric version order, not string order: 1.10.0 is newer than 1.9.0.
        history.sort_by_key(|entry| {
            std::cmp::Reverse(entry.version.parse::<Version>().unwrap_or(Version::ZERO))
        });
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_project(dir: &TempDir) {
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("__pycache__")).unwrap();
        fs::write(dir.path().join("src/main.py"), "print('hi')\n").unwrap();
        fs::write(dir.path().join("version.txt"), "1.0.0\n").unwrap();
        fs::write(dir.path().join(".git/config"), "[core]\n").unwrap();
        fs::write(dir.path().join("__pycache__/main.pyc"), "bytecode").unwrap();
        fs::write(dir.path().join("debug.log"), "noise\n").unwrap();
    }

    #[test]
    fn test_archive_excludes_defaults() {
        let project = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        sample_project(&project);

        let packager = Packager::new(project.path(), "demo", archives.path());
        let output = packager.create_archive(Version::new(1, 0, 0)).unwrap();
        assert_eq!(output.file_name().unwrap(), "demo_v1.0.0.zip");

        let file = fs::File::open(&output).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["demo/src/main.py", "demo/version.txt"]);
    }

    #[test]
    fn test_repeat_runs_are_byte_identical() {
        let project = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        sample_project(&project);

        let packager = Packager::new(project.path(), "demo", archives.path());
        let first = packager.create_archive(Version::new(2, 0, 0)).unwrap();
        let first_bytes = fs::read(&first).unwrap();

        let second = packager.create_archive(Version::new(2, 0, 0)).unwrap();
        let second_bytes = fs::read(&second).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn test_dist_archive_uses_single_subfolder() {
        let project = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        let bundle = project.path().join("dist").join("DemoApp");
        fs::create_dir_all(&bundle).unwrap();
        fs::write(bundle.join("demo.bin"), "binary").unwrap();
        fs::write(project.path().join("dist").join("notes.txt"), "loose file").unwrap();

        let packager = Packager::new(project.path(), "demo", archives.path());
        let output = packager.create_dist_archive(Version::new(1, 2, 3)).unwrap();

        let file = fs::File::open(&output).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["demo/demo.bin"]);
    }

    #[test]
    fn test_dist_archive_missing_dist_is_error() {
        let project = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        let packager = Packager::new(project.path(), "demo", archives.path());
        assert!(packager.create_dist_archive(Version::new(1, 0, 0)).is_err());
    }

    #[test]
    fn test_archive_history_sorted() {
        let project = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        fs::write(project.path().join("version.txt"), "x\n").unwrap();

        let packager = Packager::new(project.path(), "demo", archives.path());
        packager.create_archive(Version::new(1, 9, 0)).unwrap();
        packager.create_archive(Version::new(1, 10, 0)).unwrap();
        packager.create_archive(Version::new(1, 0, 0)).unwrap();

        let history = packager.archive_history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].version, "1.10.0");
        assert_eq!(history[1].version, "1.9.0");
        assert_eq!(history[2].version, "1.0.0");
        assert!(history[0].size > 0);
    }

    #[test]
    fn test_custom_exclude() {
        let project = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        fs::write(project.path().join("keep.txt"), "keep\n").unwrap();
        fs::write(project.path().join("secret.key"), "shh\n").unwrap();

        let mut packager = Packager::new(project.path(), "demo", archives.path());
        packager.add_exclude("*.key");
        let output = packager.create_archive(Version::new(1, 0, 0)).unwrap();

        let file = fs::File::open(&output).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["demo/keep.txt"]);
    }
}
