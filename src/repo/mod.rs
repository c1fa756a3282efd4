//! Repository materialization and extraction.
//!
//! A locator (git URL or local path) is turned into a local directory by a
//! [`RepoMaterializer`]; the extraction functions in [`analysis`] and
//! [`dependencies`] then describe that directory for the workflow steps.

pub mod analysis;
pub mod dependencies;

use std::path::{Path, PathBuf};

pub use analysis::{
    build_structure, dominant_extensions, file_extensions, sample_files, RepoStructure, SampleOptions,
};
pub use dependencies::{find_dependencies, Dependencies, Manifest};

/// Errors raised while acquiring or releasing a repository.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Repository locator is empty")]
    EmptyLocator,

    #[error("Local path does not exist or is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to clone repository {locator}: {message}")]
    Clone { locator: String, message: String },

    #[error("Cloning is unavailable (built without the `git` feature): {0}")]
    CloneUnsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A repository available on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    /// Root directory of the working tree.
    pub path: PathBuf,

    /// Whether the directory was created for this run and must be removed on release.
    pub owned: bool,
}

impl Materialized {
    /// Wrap an existing directory that must be left in place.
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), owned: false }
    }
}

/// Turns a locator into a local working tree and cleans it up afterwards.
pub trait RepoMaterializer: Send + Sync {
    /// Make the repository available locally.
    fn acquire(&self, locator: &str) -> Result<Materialized, RepoError>;

    /// Release a previously acquired repository.
    fn release(&self, repo: &Materialized) -> Result<(), RepoError>;
}

/// Uses an existing local directory as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMaterializer;

impl RepoMaterializer for LocalMaterializer {
    fn acquire(&self, locator: &str) -> Result<Materialized, RepoError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(RepoError::EmptyLocator);
        }

        let path = PathBuf::from(locator);
        if !path.is_dir() {
            return Err(RepoError::NotADirectory(path));
        }

        Ok(Materialized::borrowed(path))
    }

    fn release(&self, _repo: &Materialized) -> Result<(), RepoError> {
        Ok(())
    }
}

/// Clones remote repositories into a fresh temporary directory.
#[cfg(feature = "git")]
#[derive(Debug, Clone)]
pub struct GitMaterializer {
    workspace: PathBuf,
}

#[cfg(feature = "git")]
impl Default for GitMaterializer {
    fn default() -> Self {
        Self { workspace: std::env::temp_dir() }
    }
}

#[cfg(feature = "git")]
impl GitMaterializer {
    /// Clone into subdirectories of `workspace` instead of the system temp dir.
    pub fn with_workspace(workspace: impl Into<PathBuf>) -> Self {
        Self { workspace: workspace.into() }
    }
}

#[cfg(feature = "git")]
impl RepoMaterializer for GitMaterializer {
    fn acquire(&self, locator: &str) -> Result<Materialized, RepoError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(RepoError::EmptyLocator);
        }

        let target = self.workspace.join(format!("repowhisper-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&target)?;

        tracing::info!(locator, path = %target.display(), "Cloning repository");
        if let Err(e) = git2::Repository::clone(locator, &target) {
            let _ = std::fs::remove_dir_all(&target);
            return Err(RepoError::Clone {
                locator: locator.to_string(),
                message: e.message().to_string(),
            });
        }

        Ok(Materialized { path: target, owned: true })
    }

    fn release(&self, repo: &Materialized) -> Result<(), RepoError> {
        remove_owned(repo)
    }
}

/// Local directories are used in place; anything else is cloned.
#[derive(Debug, Default, Clone)]
pub struct DefaultMaterializer {
    #[cfg(feature = "git")]
    git: GitMaterializer,
}

impl RepoMaterializer for DefaultMaterializer {
    fn acquire(&self, locator: &str) -> Result<Materialized, RepoError> {
        if Path::new(locator.trim()).is_dir() {
            return LocalMaterializer.acquire(locator);
        }

        #[cfg(feature = "git")]
        {
            self.git.acquire(locator)
        }

        #[cfg(not(feature = "git"))]
        {
            if locator.trim().is_empty() {
                return Err(RepoError::EmptyLocator);
            }
            Err(RepoError::CloneUnsupported(locator.to_string()))
        }
    }

    fn release(&self, repo: &Materialized) -> Result<(), RepoError> {
        remove_owned(repo)
    }
}

fn remove_owned(repo: &Materialized) -> Result<(), RepoError> {
    if repo.owned && repo.path.exists() {
        std::fs::remove_dir_all(&repo.path)?;
        tracing::debug!(path = %repo.path.display(), "Removed cloned repository");
    }
    Ok(())
}

/// Project name derived from a locator: last path segment without `.git`.
pub fn project_name(locator: &str) -> String {
    let trimmed = locator.trim().trim_end_matches(['/', '\\']);
    let last = trimmed.rsplit(['/', '\\', ':']).next().unwrap_or_default();
    let name = last.strip_suffix(".git").unwrap_or(last);

    if name.is_empty() {
        "Project".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_name_from_urls() {
        assert_eq!(project_name("https://github.com/acme/widget.git"), "widget");
        assert_eq!(project_name("https://github.com/acme/widget/"), "widget");
        assert_eq!(project_name("git@github.com:acme/widget.git"), "widget");
        assert_eq!(project_name("/home/me/projects/tool"), "tool");
        assert_eq!(project_name(""), "Project");
    }

    #[test]
    fn test_local_materializer_accepts_directory() {
        let dir = tempfile::tempdir().unwrap();
        let locator = dir.path().to_string_lossy().to_string();

        let repo = LocalMaterializer.acquire(&locator).unwrap();
        assert_eq!(repo.path, dir.path());
        assert!(!repo.owned);

        LocalMaterializer.release(&repo).unwrap();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_local_materializer_rejects_missing_path() {
        let err = LocalMaterializer.acquire("/definitely/not/here").unwrap_err();
        assert!(matches!(err, RepoError::NotADirectory(_)));

        let err = LocalMaterializer.acquire("   ").unwrap_err();
        assert!(matches!(err, RepoError::EmptyLocator));
    }

    #[test]
    fn test_default_materializer_never_removes_borrowed_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let materializer = DefaultMaterializer::default();

        let repo = materializer.acquire(&dir.path().to_string_lossy()).unwrap();
        materializer.release(&repo).unwrap();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_release_removes_owned_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let owned = dir.path().join("clone");
        std::fs::create_dir_all(owned.join("src")).unwrap();

        let repo = Materialized { path: owned.clone(), owned: true };
        DefaultMaterializer::default().release(&repo).unwrap();
        assert!(!owned.exists());
    }

    #[cfg(feature = "git")]
    #[test]
    fn test_git_materializer_cleans_up_failed_clone() {
        let workspace = tempfile::tempdir().unwrap();
        let materializer = GitMaterializer::with_workspace(workspace.path());

        let bogus = workspace.path().join("no-such-repo");
        let err = materializer.acquire(&bogus.to_string_lossy()).unwrap_err();
        assert!(matches!(err, RepoError::Clone { .. }));
        assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
    }
}
