// Message types for the fuzzy session protocol.
//
// Every frame is one JSON object `{"cmd": <name>, "content": <payload>}` in
// both directions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Document;

/// Client -> Server commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "cmd", content = "content", rename_all = "snake_case", deny_unknown_fields)]
pub enum ClientCommand {
    /// Free-text search scoped to the session directory.
    Query(String),

    /// Load one document, optionally highlighting lines matching `query`.
    Text(TextRequest),

    /// Overwrite (and possibly rename) a document.
    Save(SaveRequest),

    /// Remove a document by relative path.
    Delete(String),

    /// Create a new document; never overwrites.
    Create(CreateRequest),

    /// Open the named document, creating it first if it does not exist.
    CreateOrOpen(CreateRequest),
}

impl ClientCommand {
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Wire name of the command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Query(_) => "query",
            Self::Text(_) => "text",
            Self::Save(_) => "save",
            Self::Delete(_) => "delete",
            Self::Create(_) => "create",
            Self::CreateOrOpen(_) => "create_or_open",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TextRequest {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SaveRequest {
    pub file: String,
    pub title: String,
    pub tags: Vec<String>,
    pub body: String,
    /// Disambiguate the target name instead of overwriting.
    #[serde(default)]
    pub create: bool,
}

impl SaveRequest {
    pub fn document(&self) -> Document {
        Document { title: self.title.clone(), tags: self.tags.clone(), body: self.body.clone() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CreateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub title: String,
}

/// Server -> Client messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "cmd", content = "content", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Search results grouped by file.
    Results(Vec<SearchResult>),

    /// A loaded document.
    Text(DocumentView),

    /// A save moved the document: `[old_file, new_file]`.
    Rename(String, String),

    /// A command failed in a way the client should see.
    Error(ErrorPayload),
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload { code, message: message.into() })
    }
}

/// Hits for one file, in the order the search tool reported them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub file: String,
    /// Total hits in this file, even when `text` is capped.
    pub num: usize,
    pub text: Vec<MatchedLine>,
}

/// One matching line. Serialized as `["<line number>", "<text>"]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "(String, String)", try_from = "(String, String)")]
pub struct MatchedLine {
    pub line_number: usize,
    pub text: String,
}

impl From<MatchedLine> for (String, String) {
    fn from(line: MatchedLine) -> Self {
        (line.line_number.to_string(), line.text)
    }
}

#[derive(Debug, Error)]
#[error("invalid line number `{0}`")]
pub struct InvalidLineNumber(String);

impl TryFrom<(String, String)> for MatchedLine {
    type Error = InvalidLineNumber;

    fn try_from((number, text): (String, String)) -> Result<Self, Self::Error> {
        let line_number = number.parse().map_err(|_| InvalidLineNumber(number))?;
        Ok(Self { line_number, text })
    }
}

/// Document content as sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentView {
    pub file: String,
    pub title: String,
    pub tags: Vec<String>,
    pub body: String,
}

impl DocumentView {
    pub fn new(file: impl Into<String>, doc: Document) -> Self {
        Self { file: file.into(), title: doc.title, tags: doc.tags, body: doc.body }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

/// Failure taxonomy shared by the daemon and its clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SandboxViolation,
    NotFound,
    IsDirectory,
    Malformed,
    CollaboratorFailure,
    PermissionDenied,
    Io,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SandboxViolation => "sandbox_violation",
            Self::NotFound => "not_found",
            Self::IsDirectory => "is_directory",
            Self::Malformed => "malformed",
            Self::CollaboratorFailure => "collaborator_failure",
            Self::PermissionDenied => "permission_denied",
            Self::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
