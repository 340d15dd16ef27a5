// Turns raw collaborator output into grouped search results and line
// highlights.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use fuzzy_common::protocol::{MatchedLine, SearchResult};
use tracing::debug;

use super::collaborator::{SearchCollaborator, SearchError, SearchScope};
use crate::config::{SearchConfig, ELLIPSIS};

/// Line cap when highlighting a single file.
const ANNOTATE_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub max_results: usize,
    pub max_line_len: usize,
    pub max_lines_per_result: Option<usize>,
}

impl From<&SearchConfig> for SearchLimits {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_results: config.max_results,
            max_line_len: config.max_line_len,
            max_lines_per_result: config.max_lines_per_result,
        }
    }
}

#[derive(Clone)]
pub struct SearchAdapter {
    collaborator: Arc<dyn SearchCollaborator>,
    limits: SearchLimits,
}

impl SearchAdapter {
    pub fn new(collaborator: Arc<dyn SearchCollaborator>, limits: SearchLimits) -> Self {
        Self { collaborator, limits }
    }

    /// Search every file below `dir`. Paths in the results are relative to
    /// `dir`.
    pub fn search(&self, query: &str, dir: &Path) -> Result<Vec<SearchResult>, SearchError> {
        let output =
            self.collaborator.search(query, self.limits.max_results, SearchScope::Directory(dir))?;
        Ok(self.group(&output))
    }

    /// Group `path:line:text` lines by file, in first-seen order.
    pub fn group(&self, output: &str) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for line in output.lines().filter(|l| !l.is_empty()).take(self.limits.max_results) {
            let Some((file, line_number, text)) = parse_line(line) else {
                debug!(line, "skipping malformed search output line");
                continue;
            };

            let slot = *index.entry(file).or_insert_with(|| {
                results.push(SearchResult { file: file.to_string(), num: 0, text: Vec::new() });
                results.len() - 1
            });
            let result = &mut results[slot];
            result.num += 1;
            if self.limits.max_lines_per_result.is_some_and(|cap| result.text.len() >= cap) {
                continue;
            }
            result.text.push(MatchedLine {
                line_number,
                text: truncate(text, self.limits.max_line_len),
            });
        }

        results
    }

    /// Matching lines of one file, already wrapped in highlight markup and
    /// keyed by 1-based line number. The header line and blank lines are
    /// never included.
    pub fn annotate(
        &self,
        path: &Path,
        query: &str,
    ) -> Result<BTreeMap<usize, String>, SearchError> {
        let output = self.collaborator.search(query, ANNOTATE_LIMIT, SearchScope::File(path))?;

        Ok(output
            .lines()
            .filter_map(parse_line)
            .filter(|(_, line_number, text)| *line_number > 1 && !text.trim().is_empty())
            .map(|(_, line_number, text)| (line_number, highlight(text)))
            .collect())
    }
}

/// Rebuild `body` with highlighted lines substituted in. `first_line` is the
/// physical line number of the body's first line. Every other line is
/// escaped; the line count is preserved exactly.
pub fn merge_highlights(
    body: &str,
    first_line: usize,
    highlights: &BTreeMap<usize, String>,
) -> String {
    body.split('\n')
        .enumerate()
        .map(|(offset, line)| match highlights.get(&(first_line + offset)) {
            Some(marked) => marked.clone(),
            None => escape_html(line),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split `path:line:text`; only the first two colons are structural.
fn parse_line(line: &str) -> Option<(&str, usize, &str)> {
    let mut parts = line.splitn(3, ':');
    let file = parts.next()?;
    let line_number = parts.next()?.trim().parse().ok()?;
    let text = parts.next()?;
    let file = file.strip_prefix("./").unwrap_or(file);
    if file.is_empty() {
        return None;
    }
    Some((file, line_number, text))
}

/// Cut `text` to `max_len` characters, ellipsis included.
fn truncate(text: &str, max_len: usize) -> String {
    let keep = max_len.saturating_sub(ELLIPSIS.len());
    if text.chars().count() <= keep {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str(ELLIPSIS);
    cut
}

fn highlight(text: &str) -> String {
    format!("<span class=\"match\">{}</span>", escape_html(text))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}
