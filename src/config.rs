//! Run Configuration
//!
//! Settings for one expansion, independent of how they were obtained.

use std::env;
use std::path::{Component, Path, PathBuf};

use log::debug;

use crate::error::{IncludeError, Result};

/// Settings for expanding one workflow file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandConfig {
    /// Root that local references resolve against.
    pub repo_root: PathBuf,
    /// Workflow file to expand.
    pub input: PathBuf,
    /// Directory mirroring remote packages, if any.
    pub mirror: Option<PathBuf>,
    /// Whether to write the generated-file header.
    pub header: bool,
}

impl ExpandConfig {
    /// Creates a configuration for `input`, discovering the repository root.
    pub fn new(input: impl Into<PathBuf>) -> Result<Self> {
        let input = input.into();
        let absolute = absolute(&input)?;
        let start = absolute.parent().unwrap_or(&absolute);
        let repo_root = match discover_repo_root(start) {
            Some(root) => root,
            None => current_dir()?,
        };
        debug!("Repository root: {}", repo_root.display());

        Ok(Self {
            repo_root,
            input,
            mirror: None,
            header: true,
        })
    }

    pub fn with_repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repo_root = root.into();
        self
    }

    pub fn with_mirror(mut self, mirror: Option<PathBuf>) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Input path relative to the repository root, `/`-separated.
    pub fn relative_input(&self) -> Result<String> {
        let root = canonical(&self.repo_root)?;
        let input = canonical(&self.input)?;

        let relative = input
            .strip_prefix(&root)
            .map_err(|_| IncludeError::ReferenceSyntax {
                reference: self.input.display().to_string(),
                reason: format!("input is outside the repository root {}", root.display()),
            })?;

        Ok(relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/"))
    }
}

/// Finds the nearest ancestor of `start` (inclusive) containing `.git`.
pub fn discover_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

fn current_dir() -> Result<PathBuf> {
    env::current_dir().map_err(|source| IncludeError::Io {
        path: ".".to_string(),
        source,
    })
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(current_dir()?.join(path))
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|source| IncludeError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_discover_repo_root() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join(".github/workflows_src")).unwrap();

        let found = discover_repo_root(&root.join(".github/workflows_src")).unwrap();
        assert_eq!(found, root);
    }

    #[test]
    fn test_new_uses_git_ancestor() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        let input = root.join("src/ci.yml");
        fs::write(&input, "jobs: {}\n").unwrap();

        let config = ExpandConfig::new(&input).unwrap();
        assert_eq!(config.repo_root, root);
        assert!(config.header);
        assert!(config.mirror.is_none());
        assert_eq!(config.relative_input().unwrap(), "src/ci.yml");
    }

    #[test]
    fn test_relative_input_outside_root() {
        let root = tempdir().unwrap();
        let other = tempdir().unwrap();
        let input = other.path().join("ci.yml");
        fs::write(&input, "jobs: {}\n").unwrap();

        let config = ExpandConfig::new(&input).unwrap().with_repo_root(root.path());
        assert!(matches!(
            config.relative_input(),
            Err(IncludeError::ReferenceSyntax { .. })
        ));
    }

    #[test]
    fn test_builders() {
        let config = ExpandConfig {
            repo_root: PathBuf::from("/repo"),
            input: PathBuf::from("/repo/ci.yml"),
            mirror: None,
            header: true,
        }
        .with_mirror(Some(PathBuf::from("/mirror")))
        .with_header(false);

        assert_eq!(config.mirror.as_deref(), Some(Path::new("/mirror")));
        assert!(!config.header);
    }
}
