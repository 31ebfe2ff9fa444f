//! Scripted in-memory assistant service for session tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use study_client::{
    Annotation, ApiError, AssistantApi, AssistantFile, CreateRunRequest, FileCitation, FileObject,
    MessageContent, MessageRole, Run, RunError, RunStatus, TextContent, Thread, ThreadMessage,
};

pub const ASSISTANT_ID: &str = "asst_test";
pub const THREAD_ID: &str = "thread_test";

#[derive(Default)]
pub struct ScriptedApi {
    calls: Mutex<Vec<String>>,
    /// Failure status codes returned by the next uploads, front first.
    upload_failures: Mutex<VecDeque<u16>>,
    uploaded: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    /// Status code every `retrieve_run` fails with, if set.
    poll_failure: Mutex<Option<u16>>,
    /// Statuses handed out by `create_run` and then `retrieve_run`. The last
    /// one repeats once the queue is drained.
    statuses: Mutex<VecDeque<RunStatus>>,
    last_status: Mutex<Option<RunStatus>>,
    last_error: Mutex<Option<RunError>>,
    run_requests: Mutex<Vec<CreateRunRequest>>,
    run_counter: Mutex<usize>,
    /// Whole thread listing, newest first.
    messages: Mutex<Vec<ThreadMessage>>,
    file_names: Mutex<HashMap<String, String>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(self, statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        self.statuses.lock().unwrap().extend(statuses);
        self
    }

    pub fn with_last_error(self, message: &str) -> Self {
        *self.last_error.lock().unwrap() = Some(RunError {
            code: "server_error".to_string(),
            message: message.to_string(),
        });
        self
    }

    pub fn with_messages(self, newest_first: Vec<ThreadMessage>) -> Self {
        *self.messages.lock().unwrap() = newest_first;
        self
    }

    pub fn with_upload_failures(self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.upload_failures.lock().unwrap().extend(codes);
        self
    }

    pub fn with_poll_failure(self, code: u16) -> Self {
        *self.poll_failure.lock().unwrap() = Some(code);
        self
    }

    pub fn with_file(self, file_id: &str, name: &str) -> Self {
        self.file_names
            .lock()
            .unwrap()
            .insert(file_id.to_string(), name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn run_requests(&self) -> Vec<CreateRunRequest> {
        self.run_requests.lock().unwrap().clone()
    }

    pub fn uploaded(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.uploaded.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_status(&self) -> RunStatus {
        let mut last = self.last_status.lock().unwrap();
        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .or(*last)
            .unwrap_or(RunStatus::Queued);
        *last = Some(status);
        status
    }

    fn run(&self, id: &str, status: RunStatus) -> Run {
        let last_error = if status.is_terminal() && status != RunStatus::Completed {
            self.last_error.lock().unwrap().clone()
        } else {
            None
        };
        Run {
            id: id.to_string(),
            thread_id: THREAD_ID.to_string(),
            status,
            last_error,
        }
    }
}

fn status_error(code: u16, message: &str) -> ApiError {
    ApiError::Status {
        status: StatusCode::from_u16(code).unwrap(),
        message: message.to_string(),
    }
}

#[async_trait]
impl AssistantApi for ScriptedApi {
    async fn upload_file(&self, path: &Path, purpose: &str) -> study_client::Result<FileObject> {
        self.record(format!("upload_file:{purpose}"));
        if let Some(code) = self.upload_failures.lock().unwrap().pop_front() {
            return Err(status_error(code, "upload rejected"));
        }
        let bytes = std::fs::read(path)?;
        let mut uploaded = self.uploaded.lock().unwrap();
        uploaded.push((path.to_path_buf(), bytes.clone()));
        Ok(FileObject {
            id: format!("file-{}", uploaded.len()),
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            bytes: Some(bytes.len() as u64),
            purpose: Some(purpose.to_string()),
        })
    }

    async fn retrieve_file(&self, file_id: &str) -> study_client::Result<FileObject> {
        self.record(format!("retrieve_file:{file_id}"));
        match self.file_names.lock().unwrap().get(file_id) {
            Some(name) => Ok(FileObject {
                id: file_id.to_string(),
                filename: name.clone(),
                bytes: None,
                purpose: None,
            }),
            None => Err(status_error(404, "No such File object")),
        }
    }

    async fn attach_file(
        &self,
        assistant_id: &str,
        file_id: &str,
    ) -> study_client::Result<AssistantFile> {
        self.record(format!("attach_file:{assistant_id}:{file_id}"));
        Ok(AssistantFile {
            id: file_id.to_string(),
            assistant_id: Some(assistant_id.to_string()),
        })
    }

    async fn create_thread(&self) -> study_client::Result<Thread> {
        self.record("create_thread".to_string());
        Ok(Thread {
            id: THREAD_ID.to_string(),
        })
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> study_client::Result<ThreadMessage> {
        self.record(format!("create_message:{thread_id}"));
        Ok(text_message("msg_user", role, None, content, Vec::new()))
    }

    async fn create_run(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> study_client::Result<Run> {
        self.record(format!("create_run:{thread_id}"));
        self.run_requests.lock().unwrap().push(request.clone());
        let id = {
            let mut counter = self.run_counter.lock().unwrap();
            *counter += 1;
            format!("run_{}", *counter)
        };
        Ok(self.run(&id, self.next_status()))
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> study_client::Result<Run> {
        self.record(format!("retrieve_run:{run_id}"));
        if let Some(code) = *self.poll_failure.lock().unwrap() {
            return Err(status_error(code, "bad gateway"));
        }
        Ok(self.run(run_id, self.next_status()))
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> study_client::Result<Run> {
        self.record(format!("cancel_run:{run_id}"));
        Ok(self.run(run_id, RunStatus::Cancelling))
    }

    async fn list_messages(&self, thread_id: &str) -> study_client::Result<Vec<ThreadMessage>> {
        self.record(format!("list_messages:{thread_id}"));
        Ok(self.messages.lock().unwrap().clone())
    }
}

pub fn text_message(
    id: &str,
    role: MessageRole,
    run_id: Option<&str>,
    text: &str,
    annotations: Vec<Annotation>,
) -> ThreadMessage {
    ThreadMessage {
        id: id.to_string(),
        role,
        run_id: run_id.map(str::to_string),
        content: vec![MessageContent::Text {
            text: TextContent {
                value: text.to_string(),
                annotations,
            },
        }],
    }
}

pub fn answer(id: &str, run_id: &str, text: &str) -> ThreadMessage {
    text_message(id, MessageRole::Assistant, Some(run_id), text, Vec::new())
}

pub fn citation(text: &str, file_id: &str, quote: Option<&str>) -> Annotation {
    Annotation::FileCitation {
        text: text.to_string(),
        file_citation: Some(FileCitation {
            file_id: file_id.to_string(),
            quote: quote.map(str::to_string),
        }),
        start_index: None,
        end_index: None,
    }
}
