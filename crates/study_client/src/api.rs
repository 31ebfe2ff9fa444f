use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AssistantFile, CreateRunRequest, FileObject, MessageRole, Run, Thread, ThreadMessage,
};

/// Operations the chat session needs from the hosted assistant service.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Upload the file at `path` to the document store.
    async fn upload_file(&self, path: &Path, purpose: &str) -> Result<FileObject>;

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject>;

    /// Add an uploaded file to the assistant's knowledge base.
    async fn attach_file(&self, assistant_id: &str, file_id: &str) -> Result<AssistantFile>;

    async fn create_thread(&self) -> Result<Thread>;

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage>;

    async fn create_run(&self, thread_id: &str, request: &CreateRunRequest) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// All messages of the thread, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;
}
