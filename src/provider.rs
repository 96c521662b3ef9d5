//! Task-generation provider
//!
//! HTTP client for the external task-generation endpoint. One call per
//! [`TaskGenerator::generate`]; retry policy belongs to the queue.

use crate::error::ApiError;
use crate::generation::worker::{
    RequestContext, TaskGenerateRequest, TaskGenerateResponse, TaskGenerator,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TASK_GENERATE_PATH: &str = "/api/task/generate";

/// Connection settings for the task-generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Base URL of the generation service
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound for one generation call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Language requested for generated content
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_lang() -> String {
    "en".to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            lang: default_lang(),
            user_id: None,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(format!("endpoint must be an http(s) URL, got '{}'", self.endpoint));
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be positive".to_string());
        }
        if self.lang.trim().is_empty() {
            return Err("lang cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn request_context(&self) -> RequestContext {
        RequestContext {
            user_id: self.user_id.clone(),
            lang: self.lang.clone(),
        }
    }
}

// Helper function to map transport errors to ApiError
fn map_http_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout(format!("Task generation request timed out: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else if let Some(status) = error.status() {
        map_status(status, error.to_string())
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

fn map_status(status: StatusCode, body: String) -> ApiError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ApiError::ProviderRequestFailed(format!("Request failed with status {}: {}", status, body))
    } else {
        ApiError::ProviderRejected(format!("Request rejected with status {}: {}", status, body))
    }
}

/// HTTP implementation of [`TaskGenerator`]
pub struct HttpTaskGenerator {
    client: Client,
    url: String,
}

impl HttpTaskGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, ApiError> {
        config.validate().map_err(ApiError::ConfigError)?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))?;
        let url = format!("{}{}", config.endpoint.trim_end_matches('/'), TASK_GENERATE_PATH);
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TaskGenerator for HttpTaskGenerator {
    async fn generate(&self, request: TaskGenerateRequest) -> Result<TaskGenerateResponse, ApiError> {
        let response = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, error_text));
        }

        response.json::<TaskGenerateResponse>().await.map_err(|e| {
            ApiError::GenerationFailed(format!("Failed to parse generator response: {}", e))
        })
    }
}
