// The external search tool, behind a trait so tests can substitute canned
// output for the real process.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

use crate::config::SearchConfig;

/// `$0` of the shell pipeline, shown in `ps` and shell error messages.
const PIPELINE_NAME: &str = "fuzzy-search";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("search pipeline failed with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("cannot search `{0}`: no parent directory or file name")]
    InvalidScope(String),
}

/// What the collaborator should look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope<'a> {
    /// Every file below a directory; reported paths are relative to it.
    Directory(&'a Path),
    /// One file only.
    File(&'a Path),
}

/// Produces raw `path:line:text` output for a query.
pub trait SearchCollaborator: Send + Sync {
    fn search(
        &self,
        query: &str,
        limit: usize,
        scope: SearchScope<'_>,
    ) -> Result<String, SearchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs the configured shell pipeline as
/// `<program> -c <pipeline> fuzzy-search <query> <limit> [file]`.
///
/// The query travels as a positional argument, never spliced into the
/// pipeline text.
#[derive(Debug, Clone)]
pub struct ProcessCollaborator<E = ProcessCommandExecutor> {
    program: String,
    pipeline: String,
    executor: E,
}

impl ProcessCollaborator<ProcessCommandExecutor> {
    pub fn new(program: impl Into<String>, pipeline: impl Into<String>) -> Self {
        Self::with_executor(program, pipeline, ProcessCommandExecutor)
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.program.clone(), config.pipeline.clone())
    }
}

impl<E: CommandExecutor> ProcessCollaborator<E> {
    pub fn with_executor(
        program: impl Into<String>,
        pipeline: impl Into<String>,
        executor: E,
    ) -> Self {
        Self { program: program.into(), pipeline: pipeline.into(), executor }
    }
}

impl<E: CommandExecutor> SearchCollaborator for ProcessCollaborator<E> {
    fn search(
        &self,
        query: &str,
        limit: usize,
        scope: SearchScope<'_>,
    ) -> Result<String, SearchError> {
        let mut args = vec![
            "-c".to_string(),
            self.pipeline.clone(),
            PIPELINE_NAME.to_string(),
            query.to_string(),
            limit.to_string(),
        ];

        let cwd = match scope {
            SearchScope::Directory(dir) => dir,
            SearchScope::File(path) => {
                let invalid = || SearchError::InvalidScope(path.display().to_string());
                let parent = path.parent().ok_or_else(invalid)?;
                let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
                // Dot-slash keeps a leading `-` from looking like an option.
                args.push(format!("./{name}"));
                parent
            }
        };

        let result = self.executor.execute(&self.program, &args, cwd).map_err(|source| {
            SearchError::Spawn { program: self.program.clone(), source }
        })?;

        if result.success {
            return Ok(result.stdout);
        }

        Err(SearchError::Failed { code: result.code, stderr: result.stderr.trim().to_string() })
    }
}
