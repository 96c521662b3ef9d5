//! CLI route: builds the run context from configuration and dispatches commands.

use crate::cli::help::command_name;
use crate::cli::parse::Commands;
use crate::cli::presentation::{format_generation_json, format_generation_text, GenerationSummary};
use crate::config::{ConfigLoader, CoursegenConfig};
use crate::error::ApiError;
use crate::generation::Orchestrator;
use crate::provider::HttpTaskGenerator;
use crate::server::{serve, AppState};
use crate::sessions::SessionRegistry;
use crate::types::LearningPlan;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Runtime context for CLI execution: resolved configuration and the async runtime.
pub struct RunContext {
    config: CoursegenConfig,
    runtime: Runtime,
}

impl RunContext {
    /// Load and validate configuration, from `config_path` if given, else from `root`.
    pub fn new(root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&root)?,
        };
        Self::with_config(config)
    }

    pub fn with_config(config: CoursegenConfig) -> Result<Self, ApiError> {
        let config = config.validated()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(Self { config, runtime })
    }

    pub fn config(&self) -> &CoursegenConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        debug!(command = command_name(command), "Executing command");
        let result = match command {
            Commands::Serve { bind } => self.handle_serve(bind.as_deref()),
            Commands::Generate {
                plan,
                format,
                timeout_secs,
            } => self.handle_generate(plan, format, Duration::from_secs(*timeout_secs)),
        };
        info!(
            command = command_name(command),
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn handle_serve(&self, bind: Option<&str>) -> Result<String, ApiError> {
        let mut server = self.config.server.clone();
        if let Some(bind) = bind {
            server.bind = bind.to_string();
        }
        let addr = server.socket_addr()?;
        let state = AppState::new(SessionRegistry::new(self.config.sessions));
        self.runtime
            .block_on(serve(addr, state))
            .map_err(|e| ApiError::Io(format!("Server failed: {:#}", e)))?;
        Ok("Server stopped".to_string())
    }

    fn handle_generate(
        &self,
        plan_path: &Path,
        format: &str,
        timeout: Duration,
    ) -> Result<String, ApiError> {
        if format != "text" && format != "json" {
            return Err(ApiError::InvalidInput(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                format
            )));
        }
        let plan = read_plan(plan_path)?;
        let summary = self.runtime.block_on(self.run_generation(&plan, timeout))?;
        if format == "json" {
            format_generation_json(&summary)
        } else {
            Ok(format_generation_text(&summary))
        }
    }

    async fn run_generation(
        &self,
        plan: &LearningPlan,
        timeout: Duration,
    ) -> Result<GenerationSummary, ApiError> {
        let generator = Arc::new(HttpTaskGenerator::new(&self.config.generator)?);
        let orchestrator = Orchestrator::new(
            self.config.queue.clone(),
            generator,
            self.config.generator.request_context(),
        )?;

        let report = orchestrator.on_plan_update(plan);
        orchestrator.on_plan_finalized(plan);
        let stats = orchestrator.wait_until_idle(Some(timeout)).await?;

        let steps = orchestrator
            .snapshot()
            .into_iter()
            .map(|snapshot| {
                let task = orchestrator.current_result_for(snapshot.step);
                (snapshot, task)
            })
            .collect();
        Ok(GenerationSummary {
            report,
            stats,
            steps,
        })
    }
}

/// Read a plan file holding either a plan object or a callback body `{ "plan": {...} }`.
fn read_plan(path: &Path) -> Result<LearningPlan, ApiError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ApiError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid plan JSON: {}", e)))?;
    let plan_value = match value.get("plan") {
        Some(inner) if inner.get("plan").is_some() => inner.clone(),
        _ => value,
    };
    serde_json::from_value(plan_value)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid learning plan: {}", e)))
}
