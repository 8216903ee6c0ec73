use thiserror::Error;

use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum ScattershotError {
    #[error("Nothing to do: give a project and a query, or a cache command.\n\nRun with --help for usage.")]
    NothingToDo,

    #[error("Empty query for project {0}")]
    EmptyQuery(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Search failed: {0}")]
    StreamFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
