pub mod api;
pub mod client;
pub mod error;
pub mod models;

pub use api::AssistantApi;
pub use client::OpenAIAssistantClient;
pub use error::{ApiError, Result};
pub use models::{
    Annotation, AssistantFile, CreateRunRequest, FileCitation, FileObject, FileRef,
    MessageContent, MessageRole, Run, RunError, RunStatus, TextContent, Thread, ThreadMessage,
    PURPOSE_ASSISTANTS,
};
