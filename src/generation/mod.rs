//! Task generation: change detection, job records, the concurrency-limited
//! queue, the worker that calls the generator, and the orchestrator that ties
//! them to the incoming plan.

pub mod fingerprint;
pub mod job;
pub mod orchestrator;
pub mod queue;
pub mod worker;

pub use fingerprint::{fingerprint, is_stale, Fingerprint};
pub use job::{JobSnapshot, JobState, JobStatus, JobTable, StepJob};
pub use orchestrator::{Orchestrator, PlanPhase, PlanUpdateReport, StepDecision};
pub use queue::{
    EnqueueOutcome, GenerationConfig, GenerationQueue, JobSettlement, QueueStats, SettledOutcome,
};
pub use worker::{
    GenerationWorker, PreviousStepContext, RequestContext, TaskGenerateRequest,
    TaskGenerateResponse, TaskGenerator,
};
