// Document persistence: plain files under the sandbox root, written through a
// private staging area.

pub mod documents;
pub mod staging;

use std::io;
use std::path::{Path, PathBuf};

use fuzzy_common::document::CodecError;
use thiserror::Error;

pub use documents::{DocumentStore, Loaded, SaveMode, SaveOutcome};
pub use staging::StagingArea;

/// Upper bound on `_N` disambiguators tried before giving up.
pub const MAX_NAME_ATTEMPTS: usize = 10_000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("path is a directory: {}", path.display())]
    IsDirectory { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("failed to parse document at {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("invalid document: {0}")]
    InvalidDocument(#[from] CodecError),

    #[error("no free name for `{base}` in {}", dir.display())]
    NameExhausted { dir: PathBuf, base: String },

    #[error("I/O error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound { path: path.into() },
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied { path: path.into() },
            _ => StoreError::Io { path: path.into(), source: error },
        }
    }

    /// Description without filesystem paths, for client-facing messages.
    pub fn reason(&self) -> String {
        match self {
            StoreError::NotFound { .. } => "not found".into(),
            StoreError::IsDirectory { .. } => "is a directory".into(),
            StoreError::PermissionDenied { .. } => "permission denied".into(),
            StoreError::Malformed { source, .. } => format!("malformed document: {source}"),
            StoreError::InvalidDocument(source) => format!("invalid document: {source}"),
            StoreError::NameExhausted { base, .. } => format!("no free file name for `{base}`"),
            StoreError::Io { source, .. } => source.to_string(),
        }
    }
}
