//! Configuration types.

use std::time::Duration;

/// Worker host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Workers created eagerly at startup and restored by self-healing.
    pub min_workers: usize,
    /// Upper bound the pool may grow to under load.
    pub max_workers: usize,
    /// Fixed per-job timeout, measured from dispatch to a worker.
    pub job_timeout: Duration,
    /// Maximum number of requests allowed to wait for a free worker.
    pub max_queue: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 6,
            job_timeout: Duration::from_secs(30),
            max_queue: 256,
        }
    }
}

impl HostConfig {
    /// Clamp the configuration to a usable shape: at least one worker,
    /// `max_workers >= min_workers`, room for at least one queued request.
    pub fn normalized(mut self) -> Self {
        self.min_workers = self.min_workers.max(1);
        self.max_workers = self.max_workers.max(self.min_workers);
        self.max_queue = self.max_queue.max(1);
        self
    }
}
