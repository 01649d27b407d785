//! Source Access
//!
//! Collaborator traits for reading local files and fetching remote packages,
//! plus the implementations used by the CLI and by tests.
//!
//! - [`LocalFileSystem`]: files under a repository root
//! - [`MirrorFetcher`]: remote packages laid out as `<root>/<owner>/<repo>/<ref>/<path>`
//! - [`OfflineFetcher`]: refuses every remote fetch
//! - [`CachingFetcher`]: memoizes another fetcher within one invocation
//! - [`MemoryFileSystem`] / [`MemoryFetcher`]: in-memory fixtures

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use super::reference::ActionReference;
use crate::error::{IncludeError, Result};

/// Reads files by repository-root-relative path.
pub trait FileSystem {
    /// Returns the content of `path`, or `NotFound` if it does not exist.
    fn read(&self, path: &str) -> Result<Vec<u8>>;
}

/// Retrieves files from remote packages.
pub trait SourceFetcher {
    /// Returns the content of `path` in `repository` (`owner/repo`) at `git_ref`.
    ///
    /// A missing file is reported as `NotFound`; other failures as `Fetch`.
    fn fetch(&self, repository: &str, path: &str, git_ref: &str) -> Result<Vec<u8>>;
}

/// Both collaborators, dispatched by reference kind.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub files: &'a dyn FileSystem,
    pub fetcher: &'a dyn SourceFetcher,
}

impl<'a> Sources<'a> {
    pub fn new(files: &'a dyn FileSystem, fetcher: &'a dyn SourceFetcher) -> Self {
        Self { files, fetcher }
    }

    /// Reads the file a reference points at.
    pub fn read(&self, target: &ActionReference) -> Result<Vec<u8>> {
        match target {
            ActionReference::Local { path } => self.files.read(path),
            ActionReference::Remote {
                owner,
                repo,
                path,
                git_ref,
            } => self
                .fetcher
                .fetch(&format!("{}/{}", owner, repo), path, git_ref),
        }
    }

    /// Reads the file a reference points at as UTF-8 text.
    pub fn read_text(&self, target: &ActionReference) -> Result<String> {
        let bytes = self.read(target)?;
        String::from_utf8(bytes).map_err(|_| IncludeError::Parse {
            origin: target.to_string(),
            message: "file is not valid UTF-8".to_string(),
        })
    }
}

/// Files under a repository root on disk.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSystem for LocalFileSystem {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path);
        debug!("Reading {}", full.display());
        read_file(&full)
    }
}

/// Remote packages mirrored to a local directory.
///
/// `octo/tools/ci/setup/action.yml@v1` is read from
/// `<root>/octo/tools/v1/ci/setup/action.yml`.
#[derive(Debug, Clone)]
pub struct MirrorFetcher {
    root: PathBuf,
}

impl MirrorFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceFetcher for MirrorFetcher {
    fn fetch(&self, repository: &str, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        if !self.root.is_dir() {
            return Err(IncludeError::Fetch {
                target: format!("{}/{}@{}", repository, path, git_ref),
                reason: format!("mirror directory {} does not exist", self.root.display()),
            });
        }

        let full = self.root.join(repository).join(git_ref).join(path);
        debug!("Reading mirrored {}", full.display());
        read_file(&full)
    }
}

/// Fetcher used when no remote source is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl SourceFetcher for OfflineFetcher {
    fn fetch(&self, repository: &str, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        Err(IncludeError::Fetch {
            target: format!("{}/{}@{}", repository, path, git_ref),
            reason: "no source mirror configured (use --mirror)".to_string(),
        })
    }
}

/// Memoizes successful fetches by (repository, ref, path).
pub struct CachingFetcher<F> {
    inner: F,
    cache: RefCell<HashMap<(String, String, String), Vec<u8>>>,
}

impl<F: SourceFetcher> CachingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }
}

impl<F: SourceFetcher> SourceFetcher for CachingFetcher<F> {
    fn fetch(&self, repository: &str, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        let cache_key = (repository.to_string(), git_ref.to_string(), path.to_string());
        if let Some(content) = self.cache.borrow().get(&cache_key) {
            debug!("Cache hit: {}/{}@{}", repository, path, git_ref);
            return Ok(content.clone());
        }

        let content = self.inner.fetch(repository, path, git_ref)?;
        self.cache.borrow_mut().insert(cache_key, content.clone());
        Ok(content)
    }
}

/// In-memory file system keyed by repository-relative path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file.
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        self.files.insert(path.to_string(), content.into());
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| IncludeError::NotFound {
                path: path.to_string(),
            })
    }
}

/// In-memory remote packages; counts fetch calls.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    files: HashMap<(String, String, String), Vec<u8>>,
    calls: Cell<usize>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file to `repository` at `git_ref`.
    pub fn with_file(
        mut self,
        repository: &str,
        git_ref: &str,
        path: &str,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.files.insert(
            (repository.to_string(), git_ref.to_string(), path.to_string()),
            content.into(),
        );
        self
    }

    /// Number of fetch calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl SourceFetcher for MemoryFetcher {
    fn fetch(&self, repository: &str, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        self.files
            .get(&(repository.to_string(), git_ref.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| IncludeError::NotFound {
                path: format!("{}/{}@{}", repository, path, git_ref),
            })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => IncludeError::NotFound {
            path: path.display().to_string(),
        },
        _ => IncludeError::Io {
            path: path.display().to_string(),
            source: e,
        },
    })
}
