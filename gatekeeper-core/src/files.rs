//! File classification for one pull request.
//!
//! Decides which changed files are structurally eligible for the requirements
//! check, validates file extensions against repository conventions, and
//! derives the content-type label (documentation vs. enhancement).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::labels::{DOCUMENTATION, ENHANCEMENT};

/// Change status of one file in a pull request, as reported by the
/// "list pull request files" API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

/// One changed file in a pull request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Repository-relative path, e.g. `sorts/merge_sort.py`.
    #[serde(rename = "filename")]
    pub name: String,
    pub status: FileStatus,
    /// Opaque locator for the file's contents at the head commit.
    #[serde(default)]
    pub contents_url: String,
}

impl ChangedFile {
    pub fn new(name: impl Into<String>, status: FileStatus) -> Self {
        Self {
            name: name.into(),
            status,
            contents_url: String::new(),
        }
    }
}

/// Repository conventions the classifier checks against.
///
/// Injected rather than global so that concurrent evaluations never share
/// mutable state.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Extension of reviewable source files.
    pub source_extension: &'static str,
    /// Every extension accepted in a submission (source, documentation,
    /// data and configuration files).
    pub accepted_extensions: &'static [&'static str],
    /// Extensions counted as documentation for the content-type label.
    pub documentation_extensions: &'static [&'static str],
    /// Directories whose source files are never reviewed.
    pub excluded_dirs: &'static [&'static str],
    /// Directories where extensionless files are acceptable.
    pub extensionless_allowed_dirs: &'static [&'static str],
    /// Auto-generated index file, ignored when deriving the documentation label.
    pub generated_index_file: &'static str,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            source_extension: "py",
            accepted_extensions: &[
                "py", "md", "rst", "txt", "json", "yml", "yaml", "toml", "cfg", "ini",
            ],
            documentation_extensions: &["md", "rst"],
            excluded_dirs: &["scripts"],
            extensionless_allowed_dirs: &[".github", "scripts"],
            generated_index_file: "DIRECTORY.md",
        }
    }
}

/// Whether a file follows the test-file naming convention
/// (`test_*.py` or `*_test.py`).
pub fn is_test_file(name: &str) -> bool {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    stem.starts_with("test_") || stem.ends_with("_test")
}

/// Classifies the changed files of one pull request.
#[derive(Debug, Clone, Default)]
pub struct FileClassifier {
    config: ClassifierConfig,
}

impl FileClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Files that should go through the requirements check, in input order.
    ///
    /// Only source files of the target language qualify; dunder modules,
    /// files under excluded directories and test files are skipped. When
    /// `ignore_modified` is set only newly added files pass, otherwise every
    /// non-removed file passes.
    pub fn eligible_for_requirements_check<'a>(
        &'a self,
        files: &'a [ChangedFile],
        ignore_modified: bool,
    ) -> impl Iterator<Item = &'a ChangedFile> + 'a {
        files.iter().filter(move |file| {
            let status_ok = if ignore_modified {
                file.status == FileStatus::Added
            } else {
                file.status != FileStatus::Removed
            };
            status_ok && self.is_reviewable_source(&file.name)
        })
    }

    fn is_reviewable_source(&self, name: &str) -> bool {
        let path = Path::new(name);
        if path.extension().and_then(|e| e.to_str()) != Some(self.config.source_extension) {
            return false;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        // Dunder-named entry points (e.g. __init__.py, __main__.py).
        if stem.starts_with("__") && stem.ends_with("__") {
            return false;
        }
        if self.is_under_any(path, self.config.excluded_dirs) {
            return false;
        }
        !is_test_file(name)
    }

    /// Paths of every file that violates the extension conventions.
    ///
    /// A file is valid when its extension is in the accepted set, or when it
    /// has no extension and is either a dotfile at the repository root or
    /// lives under an allow-listed directory. Empty result means all files
    /// are valid.
    pub fn validate_extensions(&self, files: &[ChangedFile]) -> Vec<String> {
        files
            .iter()
            .filter(|file| !self.has_valid_extension(&file.name))
            .map(|file| file.name.clone())
            .collect()
    }

    fn has_valid_extension(&self, name: &str) -> bool {
        let path = Path::new(name);
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.config.accepted_extensions.contains(&ext),
            None => {
                let at_root = path
                    .parent()
                    .map_or(true, |parent| parent.as_os_str().is_empty());
                let file_name = path.file_name().and_then(|f| f.to_str()).unwrap_or("");
                (at_root && file_name.starts_with('.'))
                    || self.is_under_any(path, self.config.extensionless_allowed_dirs)
            }
        }
    }

    /// Content-type label for the pull request, if a new one should be added.
    ///
    /// Documentation wins over enhancement. The auto-generated index file
    /// does not count as documentation. Returns `None` when the computed
    /// label is already attached, to avoid a redundant relabeling request.
    pub fn content_type_label(
        &self,
        files: &[ChangedFile],
        current_labels: &[String],
    ) -> Option<&'static str> {
        let touches_docs = files.iter().any(|file| {
            file.status != FileStatus::Removed
                && self.is_documentation(&file.name)
                && Path::new(&file.name).file_name().and_then(|f| f.to_str())
                    != Some(self.config.generated_index_file)
        });
        let label = if touches_docs {
            DOCUMENTATION
        } else if files.iter().any(|file| file.status == FileStatus::Modified) {
            ENHANCEMENT
        } else {
            return None;
        };
        if current_labels.iter().any(|l| l == label) {
            None
        } else {
            Some(label)
        }
    }

    fn is_documentation(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.config.documentation_extensions.contains(&ext))
    }

    fn is_under_any(&self, path: &Path, dirs: &[&str]) -> bool {
        path.components()
            .rev()
            // The final component is the file itself.
            .skip(1)
            .any(|component| {
                component
                    .as_os_str()
                    .to_str()
                    .is_some_and(|dir| dirs.contains(&dir))
            })
    }
}
