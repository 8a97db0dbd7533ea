//! Agent service client: threads, runs and tool-output submission
//!
//! [`AgentService`] is the seam between the session manager and the hosted
//! agent; [`AssistantsClient`] implements it against the Assistants v2 REST API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{RunObject, ThreadMessage, ThreadObject, ToolDefinition, ToolOutput};

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Error type for agent-service calls
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("agent service returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Parameters for starting a run on a thread
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    pub assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Tools advertised for this run; empty keeps the assistant's own set
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// Operations the session manager needs from the hosted agent
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn create_thread(&self) -> Result<ThreadObject, ServiceError>;

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage, ServiceError>;

    async fn create_run(&self, thread_id: &str, request: &RunRequest) -> Result<RunObject, ServiceError>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject, ServiceError>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunObject, ServiceError>;

    /// Messages on `thread_id` in creation order, optionally only those produced by `run_id`
    async fn list_messages(
        &self,
        thread_id: &str,
        run_id: Option<&str>,
    ) -> Result<Vec<ThreadMessage>, ServiceError>;
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP client for the Assistants v2 API
#[derive(Clone)]
pub struct AssistantsClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AssistantsClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - API root (e.g., "https://api.openai.com/v1")
    /// * `api_key` - bearer token
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ServiceError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl AgentService for AssistantsClient {
    async fn create_thread(&self) -> Result<ThreadObject, ServiceError> {
        let thread: ThreadObject = self
            .send(self.request(reqwest::Method::POST, "/threads").json(&serde_json::json!({})))
            .await?;
        debug!(thread_id = %thread.id, "thread created");
        Ok(thread)
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage, ServiceError> {
        let path = format!("/threads/{}/messages", thread_id);
        self.send(self.request(reqwest::Method::POST, &path).json(&serde_json::json!({
            "role": "user",
            "content": content,
        })))
        .await
    }

    async fn create_run(&self, thread_id: &str, request: &RunRequest) -> Result<RunObject, ServiceError> {
        let path = format!("/threads/{}/runs", thread_id);
        let run: RunObject = self
            .send(self.request(reqwest::Method::POST, &path).json(request))
            .await?;
        debug!(thread_id, run_id = %run.id, status = %run.status, "run created");
        Ok(run)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject, ServiceError> {
        let path = format!("/threads/{}/runs/{}", thread_id, run_id);
        self.send(self.request(reqwest::Method::GET, &path)).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunObject, ServiceError> {
        let path = format!("/threads/{}/runs/{}/submit_tool_outputs", thread_id, run_id);
        self.send(
            self.request(reqwest::Method::POST, &path)
                .json(&serde_json::json!({ "tool_outputs": outputs })),
        )
        .await
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        run_id: Option<&str>,
    ) -> Result<Vec<ThreadMessage>, ServiceError> {
        let path = format!("/threads/{}/messages", thread_id);
        let mut query = vec![("order", "asc"), ("limit", "100")];
        if let Some(run_id) = run_id {
            query.push(("run_id", run_id));
        }
        let list: MessageList = self
            .send(self.request(reqwest::Method::GET, &path).query(&query))
            .await?;
        Ok(list.data)
    }
}
