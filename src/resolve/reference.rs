//! Include References
//!
//! Parses include strings into canonical [`ActionReference`] identities.
//!
//! Supported forms:
//!
//! - `owner/repo@ref`: remote package, repository root
//! - `owner/repo/path@ref`: remote package, sub-path
//! - `./path`: local, relative to the repository root
//! - `/name`: shorthand for `./.github/includes/actions/name`
//!   (or `.../workflows/name` for job-level includes)
//!
//! A local form used inside a definition that was fetched remotely stays in
//! that remote repository at the same ref.

use std::fmt;

use crate::error::{IncludeError, Result};

/// Directory holding shorthand action definitions.
pub const ACTIONS_DIR: &str = ".github/includes/actions";

/// Directory holding shorthand workflow definitions.
pub const WORKFLOWS_DIR: &str = ".github/includes/workflows";

/// What an include reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// A step sequence (`action.yml`).
    Action,
    /// A set of jobs (`workflow.yml`).
    Workflow,
}

impl IncludeKind {
    /// Directory that `/name` shorthand references live under.
    pub fn shorthand_dir(self) -> &'static str {
        match self {
            IncludeKind::Action => ACTIONS_DIR,
            IncludeKind::Workflow => WORKFLOWS_DIR,
        }
    }

    /// Definition file names tried, in order, inside the referenced directory.
    pub fn definition_files(self) -> &'static [&'static str] {
        match self {
            IncludeKind::Action => &["action.yml", "action.yaml"],
            IncludeKind::Workflow => &["workflow.yml", "workflow.yaml"],
        }
    }
}

/// Canonical identity of an include target.
///
/// Two references are equal iff they name the same location; equality drives
/// cycle detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionReference {
    /// Path relative to the repository root, `/`-separated and normalized.
    Local { path: String },
    /// Path inside a remote repository at a fixed ref.
    Remote {
        owner: String,
        repo: String,
        path: String,
        git_ref: String,
    },
}

impl ActionReference {
    /// Creates a local reference from a repository-relative path.
    pub fn local(path: &str) -> Result<Self> {
        let path = normalize(path).ok_or_else(|| IncludeError::ReferenceSyntax {
            reference: path.to_string(),
            reason: "path escapes the repository root".to_string(),
        })?;
        Ok(ActionReference::Local { path })
    }

    /// Parses an include string written inside the document at `origin`.
    pub fn parse(text: &str, kind: IncludeKind, origin: &ActionReference) -> Result<Self> {
        let text = text.trim();
        let syntax = |reason: &str| IncludeError::ReferenceSyntax {
            reference: text.to_string(),
            reason: reason.to_string(),
        };

        if text.is_empty() {
            return Err(syntax("reference is empty"));
        }
        if text.starts_with("docker://") {
            return Err(IncludeError::InvalidDefinitionKind {
                reference: text.to_string(),
                kind: "docker".to_string(),
            });
        }

        let local = if let Some(path) = text.strip_prefix("./") {
            Some(path.to_string())
        } else if let Some(name) = text.strip_prefix('/') {
            if name.trim_matches('/').is_empty() {
                return Err(syntax("expected a name after '/'"));
            }
            Some(format!("{}/{}", kind.shorthand_dir(), name))
        } else {
            None
        };

        match local {
            Some(path) => {
                if path.contains('@') {
                    return Err(syntax("local references cannot be pinned with '@'"));
                }
                let path =
                    normalize(&path).ok_or_else(|| syntax("path escapes the repository root"))?;
                Ok(origin.with_path(path))
            }
            None => parse_remote(text).map_err(|reason| syntax(&reason)),
        }
    }

    /// Returns a reference to `path` in the same repository as `self`.
    pub fn with_path(&self, path: String) -> Self {
        match self {
            ActionReference::Local { .. } => ActionReference::Local { path },
            ActionReference::Remote {
                owner,
                repo,
                git_ref,
                ..
            } => ActionReference::Remote {
                owner: owner.clone(),
                repo: repo.clone(),
                path,
                git_ref: git_ref.clone(),
            },
        }
    }

    /// Returns a reference to the file `name` inside this directory.
    pub fn join(&self, name: &str) -> Self {
        let path = self.path();
        let joined = if path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", path, name)
        };
        self.with_path(joined)
    }

    /// Path within the repository.
    pub fn path(&self) -> &str {
        match self {
            ActionReference::Local { path } | ActionReference::Remote { path, .. } => path,
        }
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        let path = self.path();
        path.rsplit('/').next().unwrap_or(path)
    }
}

impl fmt::Display for ActionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionReference::Local { path } if path.is_empty() => write!(f, "."),
            ActionReference::Local { path } => write!(f, "./{}", path),
            ActionReference::Remote {
                owner,
                repo,
                path,
                git_ref,
            } if path.is_empty() => write!(f, "{}/{}@{}", owner, repo, git_ref),
            ActionReference::Remote {
                owner,
                repo,
                path,
                git_ref,
            } => write!(f, "{}/{}/{}@{}", owner, repo, path, git_ref),
        }
    }
}

fn parse_remote(text: &str) -> std::result::Result<ActionReference, String> {
    let (location, git_ref) = text
        .split_once('@')
        .ok_or_else(|| "remote references must be pinned with '@ref'".to_string())?;

    if git_ref.is_empty() || git_ref.contains('@') {
        return Err("expected exactly one non-empty '@ref'".to_string());
    }

    let mut parts = location.splitn(3, '/');
    let owner = parts.next().unwrap_or_default();
    let repo = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();

    if owner.is_empty() || repo.is_empty() {
        return Err("expected 'owner/repo[/path]@ref', './path', or '/name'".to_string());
    }
    if is_dot_segment(owner) || is_dot_segment(repo) {
        return Err("owner and repository cannot be '.' or '..'".to_string());
    }
    if git_ref.split('/').any(|part| part.is_empty() || is_dot_segment(part)) {
        return Err(format!("'{}' is not a valid ref", git_ref));
    }

    let path = normalize(path).ok_or_else(|| "path escapes the repository root".to_string())?;

    Ok(ActionReference::Remote {
        owner: owner.to_string(),
        repo: repo.to_string(),
        path,
        git_ref: git_ref.to_string(),
    })
}

fn is_dot_segment(part: &str) -> bool {
    part == "." || part == ".."
}

/// Lexically normalizes a `/`-separated path, resolving `.` and `..`.
///
/// Returns `None` when `..` climbs above the root.
pub fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
