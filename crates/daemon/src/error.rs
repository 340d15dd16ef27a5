// Errors surfaced by the session layer.

use fuzzy_common::protocol::ErrorCode;
use thiserror::Error;

use crate::sandbox::SandboxError;
use crate::search::SearchError;
use crate::store::StoreError;

/// Failure of one client command. Messages name the client-supplied path
/// only, never the absolute location on disk.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("path `{file}` rejected by sandbox")]
    Sandbox {
        file: String,
        #[source]
        source: SandboxError,
    },

    #[error("editing is disabled")]
    ReadOnly,

    #[error("`{file}`: {}", .source.reason())]
    Store {
        file: String,
        #[source]
        source: StoreError,
    },

    #[error("search failed")]
    Search(#[from] SearchError),

    #[error("malformed request: {0}")]
    Malformed(String),
}

impl CommandError {
    pub fn sandbox(file: &str, source: SandboxError) -> Self {
        Self::Sandbox { file: file.to_string(), source }
    }

    pub fn store(file: &str, source: StoreError) -> Self {
        Self::Store { file: file.to_string(), source }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Sandbox { .. } => ErrorCode::SandboxViolation,
            Self::ReadOnly => ErrorCode::PermissionDenied,
            Self::Store { source, .. } => match source {
                StoreError::NotFound { .. } => ErrorCode::NotFound,
                StoreError::IsDirectory { .. } => ErrorCode::IsDirectory,
                StoreError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
                StoreError::Malformed { .. } | StoreError::InvalidDocument(_) => {
                    ErrorCode::Malformed
                }
                StoreError::NameExhausted { .. } | StoreError::Io { .. } => ErrorCode::Io,
            },
            Self::Search(_) => ErrorCode::CollaboratorFailure,
            Self::Malformed(_) => ErrorCode::Malformed,
        }
    }
}

/// Failure to bind a session to its directory.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("authorization denied for subpath `{subpath}`")]
    AuthorizationDenied {
        subpath: String,
        #[source]
        source: SandboxError,
    },

    #[error("session is already bound")]
    AlreadyBound,

    #[error("session is closed")]
    Closed,
}
