use std::sync::Arc;

use log::{info, warn};
use study_client::{AssistantApi, ThreadMessage};
use study_core::{ChatTurn, DocumentHandle};
use tokio_util::sync::CancellationToken;

use crate::citations::{referenced_file_ids, CitationResolver, FileNames};
use crate::error::{Result, SessionError};
use crate::run::{RunController, RunOptions};
use crate::state::{SessionEvent, SessionPhase};

/// One chat about a set of uploaded documents.
///
/// Documents are collected during `Setup`. `start()` attaches them to the
/// assistant and opens a remote thread, after which utterances are accepted.
pub struct ConversationSession {
    api: Arc<dyn AssistantApi>,
    controller: RunController,
    phase: SessionPhase,
    thread_id: Option<String>,
    documents: Vec<DocumentHandle>,
    transcript: Vec<ChatTurn>,
    file_names: FileNames,
}

impl ConversationSession {
    pub fn new(api: Arc<dyn AssistantApi>, options: RunOptions) -> Self {
        Self {
            controller: RunController::new(api.clone(), options),
            api,
            phase: SessionPhase::default(),
            thread_id: None,
            documents: Vec::new(),
            transcript: Vec::new(),
            file_names: FileNames::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn documents(&self) -> &[DocumentHandle] {
        &self.documents
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    pub fn attach_document(&mut self, handle: DocumentHandle) -> Result<()> {
        let next = self
            .phase
            .next(SessionEvent::DocumentAttached)
            .map_err(|_| SessionError::AlreadyActive)?;
        self.file_names
            .insert(handle.id.clone(), handle.display_name.clone());
        self.documents.push(handle);
        self.phase = next;
        Ok(())
    }

    /// Attach the documents to the assistant and open a thread.
    ///
    /// Calling this on an active session returns the existing thread id.
    pub async fn start(&mut self) -> Result<String> {
        if let Some(thread_id) = self.thread_id.as_ref().filter(|_| self.phase.is_active()) {
            return Ok(thread_id.clone());
        }
        if self.documents.is_empty() {
            return Err(SessionError::NoDocuments);
        }

        let assistant_id = self.controller.options().assistant_id.clone();
        for document in &self.documents {
            self.api.attach_file(&assistant_id, &document.id).await?;
            info!(
                "Attached {} ({}) to assistant {}",
                document.display_name, document.id, assistant_id
            );
        }

        let thread = self.api.create_thread().await?;
        info!("Created thread {}", thread.id);

        self.phase = self
            .phase
            .next(SessionEvent::Started)
            .map_err(|_| SessionError::AlreadyActive)?;
        self.thread_id = Some(thread.id.clone());
        Ok(thread.id)
    }

    pub async fn submit_utterance(&mut self, text: &str) -> Result<Vec<ChatTurn>> {
        self.submit_utterance_with_cancel(text, &CancellationToken::new())
            .await
    }

    /// Send one user utterance and return the assistant turns it produced.
    ///
    /// If the run does not complete the user turn stays in the transcript and
    /// no assistant turn is added.
    pub async fn submit_utterance_with_cancel(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatTurn>> {
        let next = self
            .phase
            .next(SessionEvent::UtteranceSubmitted)
            .map_err(|_| SessionError::SessionNotStarted)?;
        let thread_id = self
            .thread_id
            .clone()
            .ok_or(SessionError::SessionNotStarted)?;
        self.phase = next;

        self.transcript.push(ChatTurn::user(text));

        let mut messages = self
            .controller
            .run_exchange(&thread_id, text, cancel)
            .await?;
        // Listing order is newest first.
        messages.reverse();

        learn_file_names(self.api.as_ref(), &mut self.file_names, &messages).await;

        let resolver = CitationResolver::new(&self.file_names);
        let mut turns = Vec::with_capacity(messages.len());
        for message in &messages {
            let resolved = resolver.resolve_message(message)?;
            turns.push(ChatTurn::assistant(resolved.display()));
        }

        self.transcript.extend(turns.iter().cloned());
        Ok(turns)
    }
}

/// Look up names for cited files missing from `names`.
///
/// A failed lookup caches the file id itself so it is not repeated.
pub async fn learn_file_names(
    api: &dyn AssistantApi,
    names: &mut FileNames,
    messages: &[ThreadMessage],
) {
    for message in messages {
        for file_id in referenced_file_ids(message) {
            if names.contains(&file_id) {
                continue;
            }
            match api.retrieve_file(&file_id).await {
                Ok(file) => names.insert(file_id, file.filename),
                Err(err) => {
                    warn!("Could not look up file {}: {}", file_id, err);
                    names.insert(file_id.clone(), file_id);
                }
            }
        }
    }
}
