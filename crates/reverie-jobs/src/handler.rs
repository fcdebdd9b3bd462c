//! Job handler trait and execution context.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use reverie_core::{Job, JobType};

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// The record this job operates on.
    pub fn record_id(&self) -> Uuid {
        self.job.record_id
    }

    /// The generation the record was at when this job was queued.
    pub fn generation(&self) -> i64 {
        self.job.generation
    }

    /// Get the job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Result of job execution.
///
/// Handlers write their output to the record itself, so success carries
/// no payload. A stale-generation write that was dropped still counts as
/// success; the job did its work, the record had simply moved on.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully.
    Success,
    /// Job failed with an error message.
    Failed(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given job type.
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Success
    }
}

#[cfg(test)]
pub(crate) fn test_job(job_type: JobType) -> Job {
    Job {
        id: Uuid::new_v4(),
        record_id: Uuid::new_v4(),
        job_type,
        status: reverie_core::JobStatus::Pending,
        generation: 0,
        payload: None,
        error_message: None,
        created_at: chrono::Utc::now(),
        started_at: None,
        completed_at: None,
    }
}
