//! Generation worker
//!
//! Turns one job into one call to the task-generation endpoint and normalizes
//! the response. The worker never retries; retry policy lives in the queue so
//! that slot accounting stays exact.

use crate::error::ApiError;
use crate::generation::job::{JobTable, StepJob};
use crate::types::{StepNumber, TaskKind, TaskPayload, Video};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Title and description of an earlier step, sent for continuity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousStepContext {
    pub title: String,
    pub description: String,
}

/// Request body of the task-generation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGenerateRequest {
    pub step: StepNumber,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub search_keyword: String,
    pub videos: Vec<Video>,
    pub previous_steps_context: Vec<PreviousStepContext>,
    pub force_regenerate: bool,
    /// Requesting user, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub lang: String,
}

/// Response body of the task-generation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGenerateResponse {
    pub success: bool,
    #[serde(default)]
    pub task: Option<TaskPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Seam to the external task-generation service
#[async_trait]
pub trait TaskGenerator: Send + Sync {
    /// Perform exactly one generation call.
    async fn generate(&self, request: TaskGenerateRequest) -> Result<TaskGenerateResponse, ApiError>;
}

/// Per-plan values attached to every request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub lang: String,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            user_id: None,
            lang: "en".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct GenerationWorker {
    generator: Arc<dyn TaskGenerator>,
    context: RequestContext,
}

impl GenerationWorker {
    pub fn new(generator: Arc<dyn TaskGenerator>, context: RequestContext) -> Self {
        Self { generator, context }
    }

    /// Build the request for `job` using the steps that precede it in `jobs`.
    pub fn build_request(&self, job: &StepJob, jobs: &JobTable) -> TaskGenerateRequest {
        let previous_steps_context = jobs
            .preceding(job.step_number)
            .map(|prev| PreviousStepContext {
                title: prev.step.title.clone(),
                description: prev.step.description.clone(),
            })
            .collect();
        let step = &job.step;

        TaskGenerateRequest {
            step: job.step_number,
            title: step.title.clone(),
            description: step.description.clone(),
            difficulty: step.difficulty.clone(),
            kind: step.kind,
            search_keyword: step
                .search_keyword
                .clone()
                .unwrap_or_else(|| step.title.clone()),
            videos: step.videos.clone(),
            previous_steps_context,
            force_regenerate: job.force_regenerate,
            id: self.context.user_id.clone(),
            lang: self.context.lang.clone(),
        }
    }

    /// Run one generation attempt.
    pub async fn run(&self, request: TaskGenerateRequest, attempt: u32) -> Result<TaskPayload, ApiError> {
        let step = request.step;
        let start = Instant::now();
        debug!(
            step = %step,
            attempt,
            force_regenerate = request.force_regenerate,
            context_steps = request.previous_steps_context.len(),
            "Task generation request sent"
        );

        let outcome = self
            .generator
            .generate(request)
            .await
            .and_then(|response| normalize_response(step, response));
        let duration_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => info!(step = %step, attempt, duration_ms, "Task generation succeeded"),
            Err(err) => warn!(
                step = %step,
                attempt,
                duration_ms,
                error = %err,
                "Task generation attempt failed"
            ),
        }
        outcome
    }
}

fn normalize_response(step: StepNumber, response: TaskGenerateResponse) -> Result<TaskPayload, ApiError> {
    if !response.success {
        return Err(ApiError::GenerationFailed(format!(
            "step {}: {}",
            step,
            response.error.unwrap_or_else(|| "generator reported failure".to_string())
        )));
    }
    match response.task {
        Some(task) if !task.is_null() => Ok(task),
        _ => Err(ApiError::GenerationFailed(format!(
            "step {}: response contained no task",
            step
        ))),
    }
}
