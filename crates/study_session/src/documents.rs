use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use study_client::{AssistantApi, PURPOSE_ASSISTANTS};
use study_core::DocumentHandle;

use crate::error::{Result, SessionError};

const MAX_BACKOFF: Duration = Duration::from_secs(30);
const FALLBACK_FILE_NAME: &str = "document";

/// Bounded exponential backoff for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Keep only the final path component so a display name cannot escape the
/// scratch directory.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        FALLBACK_FILE_NAME.to_string()
    } else {
        last.to_string()
    }
}

/// Uploads documents to the assistant service.
///
/// The upload endpoint consumes a named file, so every blob is first written
/// to the scratch directory under its display name.
pub struct DocumentStore {
    api: Arc<dyn AssistantApi>,
    scratch_dir: PathBuf,
    retry: RetryPolicy,
}

impl DocumentStore {
    pub fn new(api: Arc<dyn AssistantApi>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            scratch_dir: scratch_dir.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Upload `bytes` under `display_name`. Every call yields a new handle.
    pub async fn upload(&self, display_name: &str, bytes: &[u8]) -> Result<DocumentHandle> {
        let name = sanitize_file_name(display_name);
        let scratch_path = self.write_scratch(&name, bytes).await?;

        let mut attempt = 0;
        loop {
            match self.api.upload_file(&scratch_path, PURPOSE_ASSISTANTS).await {
                Ok(file) => {
                    info!("Uploaded {} as {}", name, file.id);
                    return Ok(DocumentHandle::new(file.id, name));
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        "Upload of {} failed ({}); retry {}/{} in {:?}",
                        name, err, attempt, self.retry.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(SessionError::Upload(err)),
            }
        }
    }

    /// Read a local file and upload it under its own file name.
    pub async fn upload_path(&self, path: &Path) -> Result<DocumentHandle> {
        let bytes = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.upload(&display_name, &bytes).await
    }

    async fn write_scratch(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let path = self.scratch_dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}
