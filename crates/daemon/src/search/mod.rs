// Full-text search through an external collaborator process.

pub mod adapter;
pub mod collaborator;

pub use adapter::{merge_highlights, SearchAdapter, SearchLimits};
pub use collaborator::{
    CommandExecutor, CommandResult, ProcessCollaborator, ProcessCommandExecutor,
    SearchCollaborator, SearchError, SearchScope,
};
