// Path sandbox: every client-supplied path is resolved here before any
// filesystem access.
//
// A candidate is accepted only if its canonical form lies inside the canonical
// root. Canonicalization resolves `..` and symlinks, so neither can be used to
// step outside. Paths that do not exist yet (create targets) are resolved by
// canonicalizing their deepest existing ancestor.

use std::io;
use std::path::{Path, PathBuf};

use fuzzy_common::path::{common_prefix, lexical_join, PathError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("path `{candidate}` resolves outside the sandbox")]
    Escape { candidate: String },

    #[error("path `{candidate}` resolves into a reserved directory")]
    Reserved { candidate: String },

    #[error("path `{candidate}` is a dangling symlink")]
    DanglingLink { candidate: String },

    #[error("invalid path `{candidate}`: {source}")]
    Invalid {
        candidate: String,
        #[source]
        source: PathError,
    },

    #[error("cannot canonicalize sandbox root `{}`: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while resolving `{candidate}`: {source}")]
    Io {
        candidate: String,
        #[source]
        source: io::Error,
    },
}

/// Whether the root itself counts as inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Only strict descendants of the root.
    Strict,
    /// The root itself is also accepted. Used for binding session directories.
    Weak,
}

/// A canonical directory boundary.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
    reserved: Vec<PathBuf>,
}

impl PathSandbox {
    /// Canonicalize `root`; it must exist.
    pub fn new(root: &Path) -> Result<Self, SandboxError> {
        let root = root
            .canonicalize()
            .map_err(|source| SandboxError::Root { path: root.to_path_buf(), source })?;
        Ok(Self { root, reserved: Vec::new() })
    }

    /// Refuse every path inside `dir` (e.g. the staging area), even though it
    /// lies within the root.
    pub fn with_reserved(mut self, dir: &Path) -> Self {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        self.reserved.push(dir);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` relative to the root.
    pub fn resolve(
        &self,
        candidate: &str,
        strictness: Strictness,
    ) -> Result<PathBuf, SandboxError> {
        let joined = lexical_join(&self.root, candidate).map_err(|source| SandboxError::Invalid {
            candidate: candidate.to_string(),
            source,
        })?;
        let resolved = canonicalize_for_write(&joined, candidate)?;

        let prefix = common_prefix(&resolved, &self.root);
        let long_enough = match strictness {
            Strictness::Strict => resolved.as_os_str().len() > self.root.as_os_str().len(),
            Strictness::Weak => resolved.as_os_str().len() >= self.root.as_os_str().len(),
        };
        if prefix != self.root || !long_enough {
            return Err(SandboxError::Escape { candidate: candidate.to_string() });
        }

        if self.reserved.iter().any(|dir| resolved.starts_with(dir)) {
            return Err(SandboxError::Reserved { candidate: candidate.to_string() });
        }

        Ok(resolved)
    }

    /// Narrow the sandbox to a subdirectory (weak check). The subdirectory
    /// must exist and be a directory.
    pub fn bind(&self, subpath: &str) -> Result<PathSandbox, SandboxError> {
        let dir = self.resolve(subpath, Strictness::Weak)?;
        if !dir.is_dir() {
            return Err(SandboxError::Escape { candidate: subpath.to_string() });
        }
        Ok(PathSandbox { root: dir, reserved: self.reserved.clone() })
    }

    /// Path of `absolute` relative to the root, `/`-separated.
    pub fn relative(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// missing tail. `path` must already be lexically normalized.
fn canonicalize_for_write(path: &Path, candidate: &str) -> Result<PathBuf, SandboxError> {
    let mut existing = path;
    let mut tail = Vec::new();

    loop {
        match std::fs::symlink_metadata(existing) {
            Ok(_) => break,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Err(SandboxError::Escape { candidate: candidate.to_string() });
                };
                tail.push(name);
                existing = parent;
            }
            Err(source) => {
                return Err(SandboxError::Io { candidate: candidate.to_string(), source })
            }
        }
    }

    let mut resolved = existing.canonicalize().map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => SandboxError::DanglingLink { candidate: candidate.to_string() },
        _ => SandboxError::Io { candidate: candidate.to_string(), source },
    })?;
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
