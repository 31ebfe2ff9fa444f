use std::time::Duration;

use study_client::{ApiError, RunStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Upload failed: {0}")]
    Upload(#[source] ApiError),

    #[error("No documents attached; upload at least one file before starting the chat")]
    NoDocuments,

    #[error("Chat session has not been started")]
    SessionNotStarted,

    #[error("Chat session is already active; documents can no longer be attached")]
    AlreadyActive,

    #[error("Run finished with status {status}{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    RunFailed {
        status: RunStatus,
        reason: Option<String>,
    },

    #[error("Run {run_id} did not finish within {waited:?}")]
    RunTimeout { run_id: String, waited: Duration },

    #[error("Cancelled")]
    Cancelled,

    #[error("Citation resolution error: {0}")]
    CitationResolution(String),

    #[error("Scratch storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Assistant API error: {0}")]
    Api(#[from] ApiError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
