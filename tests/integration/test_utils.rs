//! Shared test utilities for integration tests
//!
//! Environment isolation for configuration tests, plan builders, and scripted
//! task generators standing in for the external generation service.

use async_trait::async_trait;
use coursegen::error::ApiError;
use coursegen::generation::{
    GenerationConfig, Orchestrator, RequestContext, TaskGenerateRequest, TaskGenerateResponse,
    TaskGenerator,
};
use coursegen::types::{PlanStep, TaskKind};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

const ISOLATED_VARS: &[&str] = &["HOME", "XDG_CONFIG_HOME", "COURSEGEN_ENV"];

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir`
///
/// `COURSEGEN_ENV` is cleared. Any `extra` variables are set for the duration
/// of the call. The original environment is restored afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, extra: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let mut saved: Vec<(String, Option<String>)> = ISOLATED_VARS
        .iter()
        .map(|name| (name.to_string(), std::env::var(name).ok()))
        .collect();
    saved.extend(
        extra
            .iter()
            .map(|(name, _)| (name.to_string(), std::env::var(name).ok())),
    );

    let test_home = test_dir.path().join("home");
    let test_config_home = test_dir.path().join("xdg");
    std::fs::create_dir_all(&test_home).unwrap();
    std::fs::create_dir_all(&test_config_home).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", &test_config_home);
    std::env::remove_var("COURSEGEN_ENV");
    for (name, value) in extra {
        std::env::set_var(name, value);
    }

    let result = f();

    for (name, value) in saved {
        match value {
            Some(value) => std::env::set_var(&name, value),
            None => std::env::remove_var(&name),
        }
    }
    result
}

pub fn step(number: i64, title: &str) -> PlanStep {
    PlanStep {
        step: number,
        title: title.to_string(),
        description: format!("Learn about {}", title),
        kind: TaskKind::Quiz,
        difficulty: "beginner".to_string(),
        search_keyword: None,
        videos: Vec::new(),
        stage: None,
    }
}

pub fn plan_of(count: i64) -> Vec<PlanStep> {
    (1..=count).map(|n| step(n, &format!("Topic {}", n))).collect()
}

/// Config with short delays for paused-clock tests
pub fn fast_config(max_concurrency: usize, max_retries: u32) -> GenerationConfig {
    GenerationConfig {
        max_concurrency,
        max_retries,
        base_delay_ms: 100,
        backoff_multiplier: 1.5,
        max_delay_ms: 1000,
    }
}

pub fn orchestrator_with(
    config: GenerationConfig,
    generator: Arc<dyn TaskGenerator>,
) -> Orchestrator {
    Orchestrator::new(config, generator, RequestContext::default()).unwrap()
}

fn success_for(request: &TaskGenerateRequest) -> TaskGenerateResponse {
    TaskGenerateResponse {
        success: true,
        task: Some(json!({ "step": request.step, "title": request.title })),
        error: None,
    }
}

/// Generator that replays scripted outcomes per step, then succeeds
///
/// Records every request and the peak number of concurrent calls.
#[derive(Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<u32, VecDeque<Result<TaskGenerateResponse, ApiError>>>>,
    requests: Mutex<Vec<TaskGenerateRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each call sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Queue an outcome for the next call for `step`.
    pub fn script(&self, step: u32, outcome: Result<TaskGenerateResponse, ApiError>) {
        self.scripts.lock().entry(step).or_default().push_back(outcome);
    }

    pub fn fail_times(&self, step: u32, times: usize, error: ApiError) {
        for _ in 0..times {
            self.script(step, Err(error.clone()));
        }
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_for(&self, step: u32) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.step.get() == step)
            .count()
    }

    pub fn requests_for(&self, step: u32) -> Vec<TaskGenerateRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.step.get() == step)
            .cloned()
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        request: TaskGenerateRequest,
    ) -> Result<TaskGenerateResponse, ApiError> {
        self.requests.lock().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let scripted = self
            .scripts
            .lock()
            .get_mut(&request.step.get())
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| Ok(success_for(&request)))
    }
}

/// Generator whose calls block until the test releases them, per step
#[derive(Default)]
pub struct GatedGenerator {
    gates: Mutex<HashMap<u32, Arc<Semaphore>>>,
    started: Mutex<Vec<TaskGenerateRequest>>,
}

impl GatedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn gate(&self, step: u32) -> Arc<Semaphore> {
        self.gates
            .lock()
            .entry(step)
            .or_insert_with(|| Arc::new(Semaphore::new(0)))
            .clone()
    }

    /// Let one pending or future call for `step` finish.
    pub fn release(&self, step: u32) {
        self.gate(step).add_permits(1);
    }

    pub fn started(&self) -> Vec<TaskGenerateRequest> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl TaskGenerator for GatedGenerator {
    async fn generate(
        &self,
        request: TaskGenerateRequest,
    ) -> Result<TaskGenerateResponse, ApiError> {
        self.started.lock().push(request.clone());
        let gate = self.gate(request.step.get());
        let permit = gate
            .acquire()
            .await
            .map_err(|e| ApiError::ProviderError(e.to_string()))?;
        permit.forget();
        Ok(success_for(&request))
    }
}
