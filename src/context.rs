//! Execution context handed to a running job.

use std::sync::Arc;

use crate::events::{EventBus, JobEvent};

/// Context for a single job invocation.
///
/// Carries the correlation id the job was submitted under and a handle to
/// the event bus, so long-running jobs can publish progress updates while
/// the caller is still suspended on the result.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: String,
    events: Arc<EventBus>,
}

impl JobContext {
    pub(crate) fn new(job_id: String, events: Arc<EventBus>) -> Self {
        Self { job_id, events }
    }

    /// Correlation id of this invocation.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Publish a progress event to subscribers of this job's id.
    pub fn progress(&self, data: serde_json::Value) {
        self.events.publish(&self.job_id, JobEvent::Progress { data });
    }
}
