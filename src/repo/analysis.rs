//! Repository structure extraction.
//!
//! Walks a working tree and produces the structure listing, extension counts
//! and sampled source files consumed by the analyze step.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

/// Files looked up at the repository root before any other sample.
const PRIORITY_FILES: [&str; 6] = ["main.py", "app.py", "index.js", "index.ts", "main.js", "server.js"];

/// Extensions treated as source code when sampling.
const CODE_EXTENSIONS: [&str; 9] = ["py", "js", "ts", "java", "cpp", "go", "rs", "rb", "php"];

/// Marker appended to truncated samples.
const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Directories and files of a repository, relative to its root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStructure {
    /// Directory paths, sorted
    pub directories: Vec<String>,

    /// File paths, sorted
    pub files: Vec<String>,
}

impl RepoStructure {
    /// Whether the walk found nothing at all.
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }

    /// Copy limited to the first `max_files` files, for prompt rendering.
    pub fn truncated(&self, max_files: usize) -> Self {
        Self {
            directories: self.directories.clone(),
            files: self.files.iter().take(max_files).cloned().collect(),
        }
    }
}

/// Limits for [`sample_files`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOptions {
    /// Maximum number of files returned
    pub max_files: usize,

    /// Characters kept per file before truncation
    pub max_chars: usize,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self { max_files: 5, max_chars: 1000 }
    }
}

fn is_ignored(entry: &DirEntry, ignore_dirs: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && ignore_dirs.iter().any(|d| entry.file_name().to_string_lossy() == d.as_str())
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/")
}

fn walk<'a>(root: &'a Path, ignore_dirs: &'a [String]) -> impl Iterator<Item = DirEntry> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| !is_ignored(e, ignore_dirs))
        .filter_map(Result::ok)
}

/// Build the directory/file listing, skipping ignored directories, dot-files
/// and build noise (`.pyc`, `.log`).
pub fn build_structure(root: &Path, ignore_dirs: &[String]) -> RepoStructure {
    let mut structure = RepoStructure::default();

    for entry in walk(root, ignore_dirs).filter(|e| e.depth() > 0) {
        let rel = relative(root, entry.path());

        if entry.file_type().is_dir() {
            structure.directories.push(rel);
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !name.starts_with('.') && !name.ends_with(".pyc") && !name.ends_with(".log") {
            structure.files.push(rel);
        }
    }

    structure
}

/// Count files per lowercase extension (with the leading dot, e.g. `.rs`).
pub fn file_extensions(root: &Path, ignore_dirs: &[String]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();

    for entry in walk(root, ignore_dirs).filter(|e| e.file_type().is_file()) {
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            *counts.entry(format!(".{}", ext.to_lowercase())).or_insert(0) += 1;
        }
    }

    counts
}

/// Extensions ordered by descending file count, ties broken alphabetically.
pub fn dominant_extensions(counts: &BTreeMap<String, usize>) -> Vec<String> {
    let mut ranked: Vec<(&String, &usize)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().map(|(ext, _)| ext.clone()).collect()
}

/// Read a handful of representative source files.
///
/// Well-known entry points at the root come first, then the first code files
/// found in walk order. Contents longer than `max_chars` are cut and marked.
pub fn sample_files(
    root: &Path,
    ignore_dirs: &[String],
    options: SampleOptions,
) -> BTreeMap<String, String> {
    let mut picked: Vec<std::path::PathBuf> = PRIORITY_FILES
        .iter()
        .map(|name| root.join(name))
        .filter(|path| path.is_file())
        .collect();

    for entry in walk(root, ignore_dirs).filter(|e| e.file_type().is_file()) {
        if picked.len() >= options.max_files {
            break;
        }

        let is_code = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| CODE_EXTENSIONS.contains(&ext.to_lowercase().as_str()));

        if is_code && !picked.iter().any(|p| p == entry.path()) {
            picked.push(entry.path().to_path_buf());
        }
    }

    let mut samples = BTreeMap::new();
    for path in picked.into_iter().take(options.max_files) {
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                samples.insert(relative(root, &path), truncate(&content, options.max_chars));
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable sample");
            }
        }
    }

    samples
}

fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn ignore() -> Vec<String> {
        vec![".git".to_string(), "node_modules".to_string()]
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/util")).unwrap();
        fs::create_dir_all(root.join("node_modules/left-pad")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/lib.rs"), "pub fn lib() {}").unwrap();
        fs::write(root.join("src/util/mod.rs"), "pub fn util() {}").unwrap();
        fs::write(root.join("main.py"), "print('hi')").unwrap();
        fs::write(root.join("debug.log"), "noise").unwrap();
        fs::write(root.join(".hidden"), "secret").unwrap();
        fs::write(root.join("node_modules/left-pad/index.js"), "module.exports = 1").unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        dir
    }

    #[test]
    fn test_structure_skips_ignored_and_noise() {
        let dir = fixture();
        let structure = build_structure(dir.path(), &ignore());

        assert_eq!(structure.directories, vec!["src", "src/util"]);
        assert_eq!(structure.files, vec!["main.py", "src/lib.rs", "src/util/mod.rs"]);
    }

    #[test]
    fn test_extension_counts() {
        let dir = fixture();
        let counts = file_extensions(dir.path(), &ignore());

        assert_eq!(counts.get(".rs"), Some(&2));
        assert_eq!(counts.get(".py"), Some(&1));
        assert_eq!(counts.get(".js"), None);
        assert_eq!(dominant_extensions(&counts)[0], ".rs");
    }

    #[test]
    fn test_samples_prefer_priority_files() {
        let dir = fixture();
        let samples = sample_files(dir.path(), &ignore(), SampleOptions { max_files: 2, max_chars: 100 });

        assert_eq!(samples.len(), 2);
        assert!(samples.contains_key("main.py"));
        assert!(samples.keys().all(|k| !k.starts_with("node_modules")));
    }

    #[test]
    fn test_samples_are_truncated_on_char_boundary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.py"), "é".repeat(20)).unwrap();

        let samples = sample_files(dir.path(), &[], SampleOptions { max_files: 5, max_chars: 4 });
        assert_eq!(samples["app.py"], format!("éééé{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_truncated_structure_for_prompts() {
        let structure = RepoStructure {
            directories: vec!["src".to_string()],
            files: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };

        assert_eq!(structure.truncated(2).files, vec!["a", "b"]);
        assert!(!structure.is_empty());
        assert!(RepoStructure::default().is_empty());
    }
}
