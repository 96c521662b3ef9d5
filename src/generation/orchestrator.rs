//! Plan orchestrator
//!
//! Receives step objects from the plan-generation stream, decides which steps
//! need (re)generation and hands them to the queue. Change detection happens in
//! exactly one place: [`Orchestrator::on_step_arrived`].

use crate::error::ApiError;
use crate::generation::fingerprint::{fingerprint, is_stale};
use crate::generation::job::{JobSnapshot, JobStatus, StepJob};
use crate::generation::queue::{GenerationConfig, GenerationQueue, JobSettlement, QueueStats};
use crate::generation::worker::{GenerationWorker, RequestContext, TaskGenerator};
use crate::types::{LearningPlan, PlanStep, StepNumber, TaskPayload};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Whether the plan itself is still being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    Building,
    Finalized,
}

/// What `on_step_arrived` did with a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// First delivery of this step number; queued
    Created,
    /// Content changed; cached task discarded and step queued again
    Regenerating,
    /// Same content as before; nothing to do
    Unchanged,
}

/// Per-step outcome of applying a plan update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanUpdateReport {
    pub created: Vec<StepNumber>,
    pub regenerating: Vec<StepNumber>,
    pub unchanged: Vec<StepNumber>,
    /// Raw step number and reason for every rejected step
    pub rejected: Vec<(i64, String)>,
}

pub struct Orchestrator {
    queue: GenerationQueue,
    phase: RwLock<PlanPhase>,
}

impl Orchestrator {
    pub fn new(
        config: GenerationConfig,
        generator: Arc<dyn TaskGenerator>,
        context: RequestContext,
    ) -> Result<Self, ApiError> {
        let worker = GenerationWorker::new(generator, context);
        Ok(Self {
            queue: GenerationQueue::new(config, worker)?,
            phase: RwLock::new(PlanPhase::Building),
        })
    }

    /// Apply one delivered step
    ///
    /// New step numbers are queued. Known step numbers are compared against the
    /// fingerprint their job was created for; stale jobs drop their cached task
    /// and are queued again, unchanged ones are left alone.
    pub fn on_step_arrived(&self, step: PlanStep) -> Result<StepDecision, ApiError> {
        let number = step.validate()?;
        let current = fingerprint(&step);

        let decision = self.queue.with_jobs(|jobs| match jobs.get_mut(number) {
            None => {
                jobs.insert(StepJob::new(number, step, current));
                StepDecision::Created
            }
            Some(job) => {
                if is_stale(&step, Some(&job.input_fingerprint)) {
                    job.invalidate(step, current);
                    StepDecision::Regenerating
                } else {
                    StepDecision::Unchanged
                }
            }
        });

        match decision {
            StepDecision::Created | StepDecision::Regenerating => {
                self.queue.enqueue(number)?;
                debug!(step = %number, decision = ?decision, "Step queued for task generation");
            }
            StepDecision::Unchanged => {
                debug!(step = %number, "Step unchanged, keeping cached task");
            }
        }
        Ok(decision)
    }

    /// Apply every step of a (partial) plan; one bad step never blocks the rest.
    pub fn on_plan_update(&self, plan: &LearningPlan) -> PlanUpdateReport {
        let mut report = PlanUpdateReport::default();
        for step in &plan.plan {
            let raw = step.step;
            let applied = step
                .validate()
                .and_then(|number| Ok((number, self.on_step_arrived(step.clone())?)));
            match applied {
                Ok((number, decision)) => {
                    match decision {
                        StepDecision::Created => report.created.push(number),
                        StepDecision::Regenerating => report.regenerating.push(number),
                        StepDecision::Unchanged => report.unchanged.push(number),
                    }
                }
                Err(err) => {
                    warn!(step = raw, error = %err, "Rejected plan step");
                    report.rejected.push((raw, err.to_string()));
                }
            }
        }
        report
    }

    /// Mark plan construction as complete. Enqueues nothing by itself.
    pub fn on_plan_finalized(&self, plan: &LearningPlan) {
        let known = self.queue.stats().total;
        if plan.plan.len() != known {
            warn!(
                plan_steps = plan.plan.len(),
                known_steps = known,
                "Finalized plan differs from delivered steps"
            );
        }
        *self.phase.write() = PlanPhase::Finalized;
        info!(steps = known, "Plan finalized");
    }

    pub fn phase(&self) -> PlanPhase {
        *self.phase.read()
    }

    /// Latest completed task for a step, independent of other steps' progress.
    pub fn current_result_for(&self, step: StepNumber) -> Option<TaskPayload> {
        self.queue.result_for(step)
    }

    /// True once at least one step is known and every known step is completed.
    pub fn all_complete(&self) -> bool {
        self.queue.with_jobs(|jobs| {
            !jobs.is_empty() && jobs.iter().all(|job| job.status() == JobStatus::Completed)
        })
    }

    /// Manually re-queue a failed step.
    pub fn retry_step(&self, step: StepNumber) -> Result<(), ApiError> {
        self.queue.retry(step)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobSettlement> {
        self.queue.subscribe()
    }

    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.queue.snapshot()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub async fn wait_until_idle(&self, timeout: Option<Duration>) -> Result<QueueStats, ApiError> {
        self.queue.wait_until_idle(timeout).await
    }

    pub fn queue(&self) -> &GenerationQueue {
        &self.queue
    }
}
