use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Proxy, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde::Serialize;
use study_core::config::{Config, DEFAULT_API_BASE};

use crate::api::AssistantApi;
use crate::error::{ApiError, Result};
use crate::models::{
    AssistantFile, CreateMessageRequest, CreateRunRequest, FileObject, ListResponse, MessageRole,
    Run, Thread, ThreadMessage,
};

const ASSISTANTS_BETA_HEADER: &str = "assistants=v1";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_MIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(30);
const MESSAGES_PAGE_SIZE: &str = "100";

/// Client for the hosted assistant service's files, threads and runs endpoints.
///
/// Reads and run cancellation go through a transient-retry middleware.
/// Requests that create something (files, threads, messages, runs, assistant
/// files) are sent once on the bare client: after a lost response a retry
/// would create a duplicate. Callers retry uploads themselves.
#[derive(Debug, Clone)]
pub struct OpenAIAssistantClient {
    client: ClientWithMiddleware,
    plain_client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIAssistantClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = Self::build_http_client("", "")?;
        Ok(Self {
            client: Self::build_retry_client(
                http.clone(),
                DEFAULT_MAX_RETRIES,
                DEFAULT_MIN_RETRY_INTERVAL,
            ),
            plain_client: http,
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Build a client from process configuration (credential, base URL, proxies).
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.require_api_key()?;
        let http = Self::build_http_client(&config.http_proxy, &config.https_proxy)?;
        Ok(Self {
            client: Self::build_retry_client(
                http.clone(),
                DEFAULT_MAX_RETRIES,
                DEFAULT_MIN_RETRY_INTERVAL,
            ),
            plain_client: http,
            api_key: api_key.to_string(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the retry policy used for JSON calls.
    pub fn with_retries(mut self, max_retries: u32, min_interval: Duration) -> Self {
        self.client = Self::build_retry_client(
            self.plain_client.clone(),
            max_retries,
            min_interval.min(MAX_RETRY_INTERVAL),
        );
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("OpenAI-Beta", HeaderValue::from_static(ASSISTANTS_BETA_HEADER));
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers
    }

    fn build_http_client(http_proxy: &str, https_proxy: &str) -> Result<Client> {
        let mut builder = Client::builder().default_headers(Self::default_headers());
        if !http_proxy.is_empty() {
            builder = builder.proxy(Proxy::http(http_proxy)?);
        }
        if !https_proxy.is_empty() {
            builder = builder.proxy(Proxy::https(https_proxy)?);
        }
        Ok(builder.build()?)
    }

    fn build_retry_client(
        client: Client,
        max_retries: u32,
        min_interval: Duration,
    ) -> ClientWithMiddleware {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(min_interval, MAX_RETRY_INTERVAL)
            .build_with_max_retries(max_retries);

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status, &body));
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// POST that creates a remote object. Never retried.
    async fn create_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(path);
        debug!("POST {} (single attempt)", url);
        let response = self
            .plain_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl AssistantApi for OpenAIAssistantClient {
    async fn upload_file(&self, path: &Path, purpose: &str) -> Result<FileObject> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document")
            .to_string();
        info!("Uploading {} ({} bytes)", file_name, bytes.len());

        let form = Form::new()
            .text("purpose", purpose.to_string())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self
            .plain_client
            .post(self.url("/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject> {
        self.get_json(&format!("/files/{file_id}"), &[]).await
    }

    async fn attach_file(&self, assistant_id: &str, file_id: &str) -> Result<AssistantFile> {
        self.create_json(
            &format!("/assistants/{assistant_id}/files"),
            &serde_json::json!({ "file_id": file_id }),
        )
        .await
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.create_json("/threads", &serde_json::json!({})).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage> {
        self.create_json(
            &format!("/threads/{thread_id}/messages"),
            &CreateMessageRequest { role, content },
        )
        .await
    }

    async fn create_run(&self, thread_id: &str, request: &CreateRunRequest) -> Result<Run> {
        self.create_json(&format!("/threads/{thread_id}/runs"), request)
            .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.get_json(&format!("/threads/{thread_id}/runs/{run_id}"), &[])
            .await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.post_json(
            &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let path = format!("/threads/{thread_id}/messages");
        let mut messages = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut query = vec![
                ("limit", MESSAGES_PAGE_SIZE.to_string()),
                ("order", "desc".to_string()),
            ];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let page: ListResponse<ThreadMessage> = self.get_json(&path, &query).await?;
            let cursor = page
                .last_id
                .clone()
                .or_else(|| page.data.last().map(|m| m.id.clone()));
            messages.extend(page.data);

            match (page.has_more, cursor) {
                (true, Some(cursor)) => after = Some(cursor),
                _ => break,
            }
        }

        debug!("Listed {} messages on thread {}", messages.len(), thread_id);
        Ok(messages)
    }
}
