//! Job & scan service client
//!
//! [`JobService`] is the seam the engine talks to; [`HttpJobService`] speaks
//! the REST API under `base_url` (e.g. `http://127.0.0.1:8000/api`).

use crate::error::{MonitorError, MonitorResult};
use async_trait::async_trait;
use docwatch_common::api::{
    AnalyzeRequest, AnalyzeResponse, ErrorDetail, FileNodeDto, HealthResponse, MessageResponse,
    ScanRequest, ScanResponse, Task, TaskTreeResponse,
};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

const USER_AGENT: &str = concat!("docwatch/", env!("CARGO_PKG_VERSION"));

/// Job runner collaborator
#[async_trait]
pub trait JobService: Send + Sync {
    /// `GET /tasks`
    async fn list_tasks(&self) -> MonitorResult<Vec<Task>>;

    /// `GET /tasks/{id}`; `NotFound` for an unknown id
    async fn get_task(&self, id: &str) -> MonitorResult<Task>;

    /// `POST /tasks/{id}/cancel`; `Rejected` if the task cannot be cancelled
    async fn cancel_task(&self, id: &str) -> MonitorResult<String>;

    /// `GET /tasks/{id}/tree`; `NotFound` until the runner has scanned
    async fn get_task_tree(&self, id: &str) -> MonitorResult<FileNodeDto>;

    /// `POST /scan`
    async fn scan_directory(&self, source_path: &str) -> MonitorResult<ScanResponse>;

    /// `POST /analyze`
    async fn start_analysis(&self, request: &AnalyzeRequest) -> MonitorResult<AnalyzeResponse>;

    /// `GET /health`
    async fn health(&self) -> MonitorResult<HealthResponse>;
}

/// REST implementation of [`JobService`]
#[derive(Debug, Clone)]
pub struct HttpJobService {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpJobService {
    pub fn new(base_url: impl Into<String>) -> MonitorResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MonitorError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> MonitorResult<T> {
        let url = self.url(path);
        tracing::debug!(url = %url, "GET");
        let response = self.http_client.get(&url).send().await?;
        decode(response, what).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
        what: &str,
    ) -> MonitorResult<T> {
        let url = self.url(path);
        tracing::debug!(url = %url, "POST");
        let mut request = self.http_client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        decode(response, what).await
    }
}

/// Map a response to `T` or to the service's structured failure
async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> MonitorResult<T> {
    let status = response.status();

    if status.is_success() {
        return response.json::<T>().await.map_err(|e| MonitorError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorDetail>(&body)
        .map(|d| d.message())
        .unwrap_or_else(|_| body.trim().to_string());

    if status == StatusCode::NOT_FOUND {
        let message = if detail.is_empty() { what.to_string() } else { detail };
        return Err(MonitorError::NotFound(message));
    }

    if status.is_client_error() {
        return Err(MonitorError::Rejected(if detail.is_empty() {
            format!("{what}: HTTP {}", status.as_u16())
        } else {
            detail
        }));
    }

    Err(MonitorError::Transport(format!(
        "{what}: HTTP {} {}",
        status.as_u16(),
        detail
    )))
}

#[async_trait]
impl JobService for HttpJobService {
    async fn list_tasks(&self) -> MonitorResult<Vec<Task>> {
        let tasks: Vec<Task> = self.get("/tasks", "task list").await?;
        tracing::debug!(count = tasks.len(), "Fetched task list");
        Ok(tasks)
    }

    async fn get_task(&self, id: &str) -> MonitorResult<Task> {
        self.get(&format!("/tasks/{id}"), &format!("task {id}")).await
    }

    async fn cancel_task(&self, id: &str) -> MonitorResult<String> {
        let response: MessageResponse = self
            .post::<(), _>(&format!("/tasks/{id}/cancel"), None, &format!("task {id}"))
            .await?;
        tracing::info!(task_id = %id, message = %response.message, "Cancel requested");
        Ok(response.message)
    }

    async fn get_task_tree(&self, id: &str) -> MonitorResult<FileNodeDto> {
        let response: TaskTreeResponse = self
            .get(&format!("/tasks/{id}/tree"), &format!("tree for task {id}"))
            .await?;
        Ok(response.root)
    }

    async fn scan_directory(&self, source_path: &str) -> MonitorResult<ScanResponse> {
        let request = ScanRequest {
            source_path: source_path.to_string(),
        };
        let response: ScanResponse = self.post("/scan", Some(&request), source_path).await?;
        tracing::info!(
            source_path = %source_path,
            files = response.stats.total_files,
            dirs = response.stats.total_dirs,
            "Scanned directory"
        );
        Ok(response)
    }

    async fn start_analysis(&self, request: &AnalyzeRequest) -> MonitorResult<AnalyzeResponse> {
        let response: AnalyzeResponse = self
            .post("/analyze", Some(request), &request.source_path)
            .await?;
        tracing::info!(
            task_id = %response.task_id,
            source_path = %request.source_path,
            resume = request.resume,
            "Analysis started"
        );
        Ok(response)
    }

    async fn health(&self) -> MonitorResult<HealthResponse> {
        self.get("/health", "health").await
    }
}
