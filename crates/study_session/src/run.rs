//! Run lifecycle - one question/answer exchange against a remote thread
//!
//! Submit the user message, start a run, wait for it to reach a terminal
//! status, then collect the assistant messages the run produced. Waiting is
//! bounded by an optional deadline and can be cancelled.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use study_client::{AssistantApi, CreateRunRequest, MessageRole, Run, RunStatus, ThreadMessage};
use study_core::{Config, ConfigError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};

/// Extra instructions sent with every run.
pub const DEFAULT_RUN_INSTRUCTIONS: &str = "Please answer the questions using the knowledge provided in the files. \
When adding additional information, make sure to distinguish it with bold or underline text.";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub assistant_id: String,
    /// Model override for the run; `None` uses the assistant's own model.
    pub model: Option<String>,
    pub instructions: String,
    pub poll_interval: Duration,
    /// `None` waits until the service reports a terminal status.
    pub max_wait: Option<Duration>,
}

impl RunOptions {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            model: None,
            instructions: DEFAULT_RUN_INSTRUCTIONS.to_string(),
            poll_interval: Duration::from_secs(1),
            max_wait: Some(Duration::from_secs(300)),
        }
    }

    pub fn from_config(config: &Config) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            assistant_id: config.require_assistant_id()?.to_string(),
            model: config.model.clone(),
            instructions: DEFAULT_RUN_INSTRUCTIONS.to_string(),
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }
}

pub struct RunController {
    api: Arc<dyn AssistantApi>,
    options: RunOptions,
}

impl RunController {
    pub fn new(api: Arc<dyn AssistantApi>, options: RunOptions) -> Self {
        Self { api, options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Drive one exchange on `thread_id` and return the assistant messages
    /// produced by the run, newest first.
    pub async fn run_exchange(
        &self,
        thread_id: &str,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ThreadMessage>> {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        // The message must exist on the thread before the run is created.
        self.api
            .create_message(thread_id, MessageRole::User, user_text)
            .await?;

        let request = CreateRunRequest {
            assistant_id: self.options.assistant_id.clone(),
            model: self.options.model.clone(),
            instructions: Some(self.options.instructions.clone()),
        };
        let run = self.api.create_run(thread_id, &request).await?;
        info!("[{}] Created run {} ({})", thread_id, run.id, run.status);

        let run = self.wait_for_terminal(thread_id, run, cancel).await?;
        match run.status {
            RunStatus::Completed => {
                let messages = self.api.list_messages(thread_id).await?;
                let produced: Vec<ThreadMessage> = messages
                    .into_iter()
                    .filter(|m| {
                        m.role == MessageRole::Assistant
                            && m.run_id.as_deref() == Some(run.id.as_str())
                    })
                    .collect();
                info!(
                    "[{}] Run {} completed with {} assistant message(s)",
                    thread_id,
                    run.id,
                    produced.len()
                );
                Ok(produced)
            }
            status => {
                warn!("[{}] Run {} ended with status {}", thread_id, run.id, status);
                Err(SessionError::RunFailed {
                    status,
                    reason: run
                        .last_error
                        .map(|e| e.message)
                        .filter(|m| !m.is_empty()),
                })
            }
        }
    }

    async fn wait_for_terminal(
        &self,
        thread_id: &str,
        mut run: Run,
        cancel: &CancellationToken,
    ) -> Result<Run> {
        let started = Instant::now();
        let deadline = self.options.max_wait.map(|max_wait| started + max_wait);

        while !run.status.is_terminal() {
            let mut wake_at = Instant::now() + self.options.poll_interval;
            if let Some(deadline) = deadline {
                wake_at = wake_at.min(deadline);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.abandon(thread_id, &run.id).await;
                    return Err(SessionError::Cancelled);
                }
                _ = tokio::time::sleep_until(wake_at) => {}
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    self.abandon(thread_id, &run.id).await;
                    return Err(SessionError::RunTimeout {
                        run_id: run.id,
                        waited: started.elapsed(),
                    });
                }
            }

            run = match self.api.retrieve_run(thread_id, &run.id).await {
                Ok(polled) => polled,
                Err(err) => {
                    warn!("[{}] Polling run {} failed: {}", thread_id, run.id, err);
                    self.abandon(thread_id, &run.id).await;
                    return Err(err.into());
                }
            };
            debug!("[{}] Run {} status: {}", thread_id, run.id, run.status);
        }

        Ok(run)
    }

    /// Ask the service to stop a run we no longer wait for.
    async fn abandon(&self, thread_id: &str, run_id: &str) {
        match self.api.cancel_run(thread_id, run_id).await {
            Ok(_) => info!("[{}] Requested cancellation of run {}", thread_id, run_id),
            Err(err) => warn!(
                "[{}] Failed to cancel run {}: {}",
                thread_id, run_id, err
            ),
        }
    }
}
