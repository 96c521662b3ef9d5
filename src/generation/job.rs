//! Step job records
//!
//! One [`StepJob`] exists per step number of the active plan. Jobs are never
//! deleted while the plan is active; revised content for the same step number
//! overwrites the previous record in place.

use crate::generation::fingerprint::Fingerprint;
use crate::types::{PlanStep, StepNumber, TaskPayload};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Generation state of one step
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    /// Waiting for a concurrency slot (or for a retry backoff to elapse)
    Pending,
    /// Occupying a concurrency slot with an external call in flight
    Generating,
    /// Task generated for `input_fingerprint`
    Completed { task: TaskPayload },
    /// Retries exhausted or a permanent error; only a manual retry re-queues it
    Failed { error: String },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Generating => JobStatus::Generating,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Generating => "generating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepJob {
    pub step_number: StepNumber,
    /// Latest content delivered for this step number
    pub step: PlanStep,
    /// Fingerprint of `step`; a completed result is only valid for this value
    pub input_fingerprint: Fingerprint,
    pub state: JobState,
    /// External calls made since the job was last (re)created
    pub attempt: u32,
    /// Ask the generator to bypass its own cache on the next call
    pub force_regenerate: bool,
    pub last_error: Option<String>,
}

impl StepJob {
    pub fn new(step_number: StepNumber, step: PlanStep, input_fingerprint: Fingerprint) -> Self {
        Self {
            step_number,
            step,
            input_fingerprint,
            state: JobState::Pending,
            attempt: 0,
            force_regenerate: false,
            last_error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn result(&self) -> Option<&TaskPayload> {
        match &self.state {
            JobState::Completed { task } => Some(task),
            _ => None,
        }
    }

    /// Replace the content with a revision and drop any cached result.
    pub(crate) fn invalidate(&mut self, step: PlanStep, input_fingerprint: Fingerprint) {
        self.step = step;
        self.input_fingerprint = input_fingerprint;
        self.attempt = 0;
        self.force_regenerate = true;
        self.last_error = None;
        if !matches!(self.state, JobState::Generating) {
            self.state = JobState::Pending;
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            step: self.step_number,
            title: self.step.title.clone(),
            status: self.status(),
            attempt: self.attempt,
            fingerprint: self.input_fingerprint.clone(),
            error: self.last_error.clone(),
        }
    }
}

/// Read-only view of a job for progress rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub step: StepNumber,
    pub title: String,
    pub status: JobStatus,
    pub attempt: u32,
    pub fingerprint: Fingerprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Job table keyed by step number (ordered, so iteration follows the plan)
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<StepNumber, StepJob>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, step: StepNumber) -> Option<&StepJob> {
        self.jobs.get(&step)
    }

    pub(crate) fn get_mut(&mut self, step: StepNumber) -> Option<&mut StepJob> {
        self.jobs.get_mut(&step)
    }

    pub(crate) fn insert(&mut self, job: StepJob) {
        self.jobs.insert(job.step_number, job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepJob> {
        self.jobs.values()
    }

    /// Steps numbered below `step`, ascending.
    pub fn preceding(&self, step: StepNumber) -> impl Iterator<Item = &StepJob> {
        self.jobs.range(..step).map(|(_, job)| job)
    }
}
