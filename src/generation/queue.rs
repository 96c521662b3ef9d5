//! Task Generation Queue
//!
//! Admits at most `max_concurrency` generation jobs at a time, re-admits failed
//! jobs with exponential backoff until the retry budget is spent, and reports
//! every settled job to subscribers.
//!
//! All queue state sits behind one mutex whose critical sections never span an
//! `.await`. External calls run on spawned tasks and re-enter the queue through
//! its completion callback, so a slow call never blocks admission of
//! other steps.

use crate::error::ApiError;
use crate::generation::fingerprint::Fingerprint;
use crate::generation::job::{JobSnapshot, JobState, JobStatus, JobTable};
use crate::generation::worker::{GenerationWorker, TaskGenerateRequest};
use crate::types::{StepNumber, TaskPayload};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const SETTLEMENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for the generation queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum jobs generating at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Automatic retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Growth factor applied per further retry
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound on any single backoff delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_concurrency() -> usize {
    2
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be at least 1".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms must not be below base_delay_ms".to_string());
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Jobs waiting for a slot
    pub queued: usize,
    /// Jobs occupying a slot
    pub generating: usize,
    /// Jobs waiting out a retry delay
    pub backing_off: usize,
    pub completed: usize,
    pub failed: usize,
    /// Known steps
    pub total: usize,
}

impl QueueStats {
    /// No job is queued, generating or waiting to retry.
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.generating == 0 && self.backing_off == 0
    }
}

/// Final outcome of a job
#[derive(Debug, Clone, PartialEq)]
pub enum SettledOutcome {
    Completed(TaskPayload),
    Failed(String),
}

/// Fired whenever a job reaches `completed` or `failed`
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettlement {
    pub step: StepNumber,
    pub attempts: u32,
    pub outcome: SettledOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Already queued, generating or waiting to retry
    AlreadyQueued,
}

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    pub(crate) jobs: JobTable,
    pending: VecDeque<StepNumber>,
    active: BTreeSet<StepNumber>,
    backing_off: BTreeSet<StepNumber>,
}

impl QueueState {
    fn is_queued(&self, step: StepNumber) -> bool {
        self.active.contains(&step)
            || self.backing_off.contains(&step)
            || self.pending.contains(&step)
    }

    fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            queued: self.pending.len(),
            generating: self.active.len(),
            backing_off: self.backing_off.len(),
            total: self.jobs.len(),
            ..QueueStats::default()
        };
        for job in self.jobs.iter() {
            match job.status() {
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Pending | JobStatus::Generating => {}
            }
        }
        stats
    }
}

struct Launch {
    step: StepNumber,
    attempt: u32,
    fingerprint: Fingerprint,
    request: TaskGenerateRequest,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

struct QueueShared {
    state: Mutex<QueueState>,
    config: GenerationConfig,
    worker: GenerationWorker,
    settled_tx: broadcast::Sender<JobSettlement>,
    stats_tx: watch::Sender<QueueStats>,
}

/// Concurrency-limited task generation queue
///
/// Cloning yields another handle to the same queue. Operations that admit work
/// spawn tokio tasks and must be called from within a runtime.
#[derive(Clone)]
pub struct GenerationQueue {
    shared: Arc<QueueShared>,
}

impl GenerationQueue {
    pub fn new(config: GenerationConfig, worker: GenerationWorker) -> Result<Self, ApiError> {
        config.validate().map_err(ApiError::ConfigError)?;
        let (settled_tx, _) = broadcast::channel(SETTLEMENT_CHANNEL_CAPACITY);
        let (stats_tx, _) = watch::channel(QueueStats::default());
        Ok(Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState::default()),
                config,
                worker,
                settled_tx,
                stats_tx,
            }),
        })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.shared.config
    }

    /// Run `f` against the job table under the queue lock.
    pub(crate) fn with_jobs<R>(&self, f: impl FnOnce(&mut JobTable) -> R) -> R {
        let mut state = self.shared.state.lock();
        let out = f(&mut state.jobs);
        self.publish_stats(&state);
        out
    }

    /// Queue a known step for generation
    ///
    /// No-op when the step is already queued, generating or waiting to retry.
    /// Otherwise the job is reset to `pending`, appended to the FIFO and a
    /// drain pass runs.
    pub fn enqueue(&self, step: StepNumber) -> Result<EnqueueOutcome, ApiError> {
        {
            let mut state = self.shared.state.lock();
            if state.is_queued(step) {
                debug!(step = %step, "Step already queued");
                return Ok(EnqueueOutcome::AlreadyQueued);
            }
            let job = state
                .jobs
                .get_mut(step)
                .ok_or(ApiError::StepNotFound(step.get()))?;
            job.state = JobState::Pending;
            job.attempt = 0;
            state.pending.push_back(step);
            debug!(step = %step, queued = state.pending.len(), "Enqueued task generation");
            self.publish_stats(&state);
        }
        self.drain();
        Ok(EnqueueOutcome::Queued)
    }

    /// Re-queue a step whose job has failed permanently.
    pub fn retry(&self, step: StepNumber) -> Result<(), ApiError> {
        {
            let mut state = self.shared.state.lock();
            let job = state
                .jobs
                .get_mut(step)
                .ok_or(ApiError::StepNotFound(step.get()))?;
            if job.status() != JobStatus::Failed {
                return Err(ApiError::InvalidInput(format!(
                    "step {} is {}, only failed steps can be retried",
                    step,
                    job.status().as_str()
                )));
            }
            job.state = JobState::Pending;
            job.attempt = 0;
            job.last_error = None;
            state.pending.push_back(step);
            info!(step = %step, "Manual retry requested");
            self.publish_stats(&state);
        }
        self.drain();
        Ok(())
    }

    /// Admit pending jobs until every slot is taken.
    pub fn drain(&self) {
        let launches = {
            let mut state = self.shared.state.lock();
            let mut launches = Vec::new();

            while state.active.len() < self.shared.config.max_concurrency {
                let Some(step) = state.pending.pop_front() else {
                    break;
                };
                let Some(job) = state.jobs.get_mut(step) else {
                    error!(step = %step, "Pending step has no job record");
                    continue;
                };
                job.state = JobState::Generating;
                job.attempt += 1;
                let attempt = job.attempt;
                let fingerprint = job.input_fingerprint.clone();
                state.active.insert(step);

                let Some(job) = state.jobs.get(step) else {
                    continue;
                };
                let request = self.shared.worker.build_request(job, &state.jobs);
                launches.push(Launch {
                    step,
                    attempt,
                    fingerprint,
                    request,
                });
            }

            assert!(
                state.active.len() <= self.shared.config.max_concurrency,
                "active generations ({}) exceed max_concurrency ({})",
                state.active.len(),
                self.shared.config.max_concurrency
            );
            if !launches.is_empty() {
                self.publish_stats(&state);
            }
            launches
        };

        for launch in launches {
            debug!(step = %launch.step, attempt = launch.attempt, "Admitted task generation");
            let queue = self.clone();
            tokio::spawn(async move {
                // A panicking generator still settles the attempt and frees its slot.
                let outcome = AssertUnwindSafe(queue.shared.worker.run(launch.request, launch.attempt))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let message = panic_message(panic.as_ref());
                        error!(step = %launch.step, panic = %message, "Task generator panicked");
                        Err(ApiError::GenerationFailed(format!(
                            "generator panicked: {}",
                            message
                        )))
                    });
                queue.on_result(launch.step, &launch.fingerprint, outcome);
            });
        }
    }

    /// Completion callback for one attempt.
    fn on_result(
        &self,
        step: StepNumber,
        launched_with: &Fingerprint,
        outcome: Result<TaskPayload, ApiError>,
    ) {
        let mut settlement = None;
        let mut retry_delay = None;
        {
            let mut state = self.shared.state.lock();
            let config = &self.shared.config;
            let QueueState {
                jobs,
                pending,
                active,
                backing_off,
            } = &mut *state;
            active.remove(&step);

            let Some(job) = jobs.get_mut(step) else {
                error!(step = %step, "Settled step has no job record");
                return;
            };

            if job.input_fingerprint != *launched_with {
                info!(
                    step = %step,
                    "Step content changed during generation, discarding result"
                );
                job.state = JobState::Pending;
                job.attempt = 0;
                job.force_regenerate = true;
                pending.push_back(step);
            } else {
                match outcome {
                    Ok(task) => {
                        job.state = JobState::Completed { task: task.clone() };
                        job.force_regenerate = false;
                        job.last_error = None;
                        info!(step = %step, attempts = job.attempt, "Task generation completed");
                        settlement = Some(JobSettlement {
                            step,
                            attempts: job.attempt,
                            outcome: SettledOutcome::Completed(task),
                        });
                    }
                    Err(err) => {
                        job.last_error = Some(err.to_string());
                        let retries_used = job.attempt.saturating_sub(1);
                        if err.is_retryable() && retries_used < config.max_retries {
                            let delay = config.backoff_delay(job.attempt);
                            warn!(
                                step = %step,
                                attempt = job.attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "Task generation failed, retrying after backoff"
                            );
                            job.state = JobState::Pending;
                            backing_off.insert(step);
                            retry_delay = Some(delay);
                        } else {
                            let final_error = if err.is_retryable() {
                                ApiError::RetriesExhausted {
                                    attempts: job.attempt,
                                    last_error: err.to_string(),
                                }
                            } else {
                                err
                            };
                            error!(
                                step = %step,
                                attempts = job.attempt,
                                error = %final_error,
                                "Task generation failed permanently"
                            );
                            job.state = JobState::Failed {
                                error: final_error.to_string(),
                            };
                            settlement = Some(JobSettlement {
                                step,
                                attempts: job.attempt,
                                outcome: SettledOutcome::Failed(final_error.to_string()),
                            });
                        }
                    }
                }
            }
            self.publish_stats(&state);
        }

        if let Some(delay) = retry_delay {
            let queue = self.clone();
            tokio::spawn(async move {
                sleep(delay).await;
                queue.requeue_after_backoff(step);
            });
        }

        self.drain();

        if let Some(settlement) = settlement {
            // No subscribers is fine.
            let _ = self.shared.settled_tx.send(settlement);
        }
    }

    fn requeue_after_backoff(&self, step: StepNumber) {
        {
            let mut state = self.shared.state.lock();
            if !state.backing_off.remove(&step) {
                return;
            }
            let still_pending = state
                .jobs
                .get(step)
                .map(|job| job.status() == JobStatus::Pending)
                .unwrap_or(false);
            if still_pending {
                state.pending.push_back(step);
            }
            self.publish_stats(&state);
        }
        self.drain();
    }

    fn publish_stats(&self, state: &QueueState) {
        self.shared.stats_tx.send_replace(state.stats());
    }

    /// Subscribe to job settlements.
    pub fn subscribe(&self) -> broadcast::Receiver<JobSettlement> {
        self.shared.settled_tx.subscribe()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.state.lock().stats()
    }

    /// Wait until nothing is queued, generating or backing off.
    pub async fn wait_until_idle(&self, timeout: Option<Duration>) -> Result<QueueStats, ApiError> {
        let mut rx = self.shared.stats_tx.subscribe();
        let wait = async move {
            let stats = *rx
                .wait_for(QueueStats::is_idle)
                .await
                .map_err(|_| ApiError::ConfigError("Generation queue closed".to_string()))?;
            Ok::<QueueStats, ApiError>(stats)
        };
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.map_err(|_| {
                ApiError::Timeout("waiting for task generation to settle".to_string())
            })?,
            None => wait.await,
        }
    }

    pub fn result_for(&self, step: StepNumber) -> Option<TaskPayload> {
        let state = self.shared.state.lock();
        state.jobs.get(step).and_then(|job| job.result().cloned())
    }

    pub fn status_of(&self, step: StepNumber) -> Option<JobStatus> {
        let state = self.shared.state.lock();
        state.jobs.get(step).map(|job| job.status())
    }

    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let state = self.shared.state.lock();
        state.jobs.iter().map(|job| job.snapshot()).collect()
    }

    /// Steps currently occupying a slot, ascending.
    pub fn active_steps(&self) -> Vec<StepNumber> {
        self.shared.state.lock().active.iter().copied().collect()
    }

    /// Steps waiting for a slot, in admission order.
    pub fn pending_steps(&self) -> Vec<StepNumber> {
        self.shared.state.lock().pending.iter().copied().collect()
    }
}
