// Document codec: one header line (title + tags), a blank line, then the body.
//
// Inline layout:    `! Shopping List #personal\n\nbuy milk`
// Separated layout: `Shopping List\n#personal\n\nbuy milk`

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shebang-style prefix accepted in front of an inline header regardless of
/// the configured header marker.
const SHEBANG_MARKER: &str = "#!";

/// Where the tags live relative to the title.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HeaderLayout {
    /// Title and tags share the first line behind the header marker.
    #[default]
    Inline,
    /// Title alone on the first line, tags on the next line.
    Separated,
}

/// The three user-visible parts of a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub tags: Vec<String>,
    pub body: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("document header does not start with `{expected}`")]
    MissingHeaderMarker { expected: String },

    #[error("title must be a single non-empty line")]
    InvalidTitle,

    #[error("tag `{0}` is empty or contains whitespace")]
    InvalidTag(String),

    #[error("body would be read back as a tag line; add a tag or start the body differently")]
    AmbiguousBody,
}

/// Marker and layout settings for reading and writing documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFormat {
    pub header_marker: String,
    pub tag_marker: String,
    pub layout: HeaderLayout,
}

impl Default for DocumentFormat {
    fn default() -> Self {
        Self { header_marker: "!".into(), tag_marker: "#".into(), layout: HeaderLayout::Inline }
    }
}

impl DocumentFormat {
    /// Parse raw file text into title, tags and body.
    ///
    /// The returned body is always a suffix of `raw`, which is what
    /// [`body_start_line`] relies on.
    pub fn decode(&self, raw: &str) -> Result<Document, CodecError> {
        match self.layout {
            HeaderLayout::Inline => self.decode_inline(raw),
            HeaderLayout::Separated => Ok(self.decode_separated(raw)),
        }
    }

    /// Serialize a document. Callers should run [`validate`](Self::validate)
    /// first; `encode` itself never fails.
    pub fn encode(&self, doc: &Document) -> String {
        let tags = doc
            .tags
            .iter()
            .map(|tag| format!("{}{tag}", self.tag_marker))
            .collect::<Vec<_>>()
            .join(" ");

        match self.layout {
            HeaderLayout::Inline => {
                format!("{} {} {}\n\n{}", self.header_marker, doc.title, tags, doc.body)
            }
            HeaderLayout::Separated if tags.is_empty() => {
                format!("{}\n\n{}", doc.title, doc.body)
            }
            HeaderLayout::Separated => format!("{}\n{}\n\n{}", doc.title, tags, doc.body),
        }
    }

    /// Check that a document survives an encode/decode round trip.
    pub fn validate(&self, doc: &Document) -> Result<(), CodecError> {
        let title = doc.title.trim();
        if title.is_empty() || doc.title.contains(['\n', '\r']) {
            return Err(CodecError::InvalidTitle);
        }
        for tag in &doc.tags {
            if tag.is_empty() || tag.chars().any(char::is_whitespace) {
                return Err(CodecError::InvalidTag(tag.clone()));
            }
        }

        match self.layout {
            HeaderLayout::Inline => {
                // The header line is re-tokenized on decode: runs of
                // whitespace collapse and marker-prefixed words become tags.
                let words: Vec<&str> = doc.title.split_whitespace().collect();
                if words.join(" ") != doc.title || words.iter().any(|w| self.is_tag_token(w)) {
                    return Err(CodecError::InvalidTitle);
                }
            }
            HeaderLayout::Separated => {
                if self.is_tag_token(title) {
                    return Err(CodecError::InvalidTitle);
                }
                // Without a tag line, a marker at the start of the body would
                // be read back as one.
                if doc.tags.is_empty() && self.is_tag_token(doc.body.trim_start()) {
                    return Err(CodecError::AmbiguousBody);
                }
            }
        }
        Ok(())
    }

    fn is_tag_token(&self, text: &str) -> bool {
        !self.tag_marker.is_empty() && text.starts_with(self.tag_marker.as_str())
    }

    fn decode_inline(&self, raw: &str) -> Result<Document, CodecError> {
        let rest = raw
            .strip_prefix(SHEBANG_MARKER)
            .or_else(|| raw.strip_prefix(self.header_marker.as_str()))
            .ok_or_else(|| CodecError::MissingHeaderMarker {
                expected: self.header_marker.clone(),
            })?;
        let rest = rest.trim_start_matches([' ', '\t']);

        let (head, body) = split_line(rest);
        let mut title_words = Vec::new();
        let mut tags = Vec::new();
        for token in head.split_whitespace() {
            match token.strip_prefix(self.tag_marker.as_str()) {
                Some(tag) if !tag.is_empty() => tags.push(tag.to_string()),
                Some(_) => {}
                None => title_words.push(token),
            }
        }

        Ok(Document { title: title_words.join(" "), tags, body: strip_blank_line(body).into() })
    }

    fn decode_separated(&self, raw: &str) -> Document {
        let (title, rest) = split_line(raw);
        let title = title.trim_end_matches('\r').to_string();

        let trimmed = rest.trim_start();
        if self.is_tag_token(trimmed) {
            let (tag_line, body) = split_line(trimmed);
            let tags = tag_line
                .split_whitespace()
                .filter_map(|token| token.strip_prefix(self.tag_marker.as_str()))
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect();
            Document { title, tags, body: strip_blank_line(body).into() }
        } else {
            Document { title, tags: Vec::new(), body: strip_blank_line(rest).into() }
        }
    }
}

/// 1-based physical line number on which `body` starts inside `raw`.
///
/// `body` must be a suffix of `raw`, as produced by [`DocumentFormat::decode`].
pub fn body_start_line(raw: &str, body: &str) -> usize {
    debug_assert!(raw.ends_with(body));
    let prefix = &raw[..raw.len().saturating_sub(body.len())];
    prefix.matches('\n').count() + 1
}

/// Split at the first newline; the newline itself belongs to neither side.
fn split_line(text: &str) -> (&str, &str) {
    text.split_once('\n').unwrap_or((text, ""))
}

fn strip_blank_line(body: &str) -> &str {
    body.strip_prefix("\r\n").or_else(|| body.strip_prefix('\n')).unwrap_or(body)
}
