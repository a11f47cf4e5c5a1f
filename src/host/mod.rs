//! Worker host — pool manager and dispatcher.
//!
//! Core components:
//! - `pool` — worker handles, thread spawning, and the host↔worker wire types
//! - `control` — the single control task owning pool, queue, pending map,
//!   and the deadline heap
//!
//! All bookkeeping happens on the control task; callers talk to it through
//! message passing, so none of the host-side state needs a lock.

mod control;
pub(crate) mod pool;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::config::HostConfig;
use crate::error::HostError;
use crate::events::EventBus;
use crate::registry::JobRegistry;

/// Result of a completed job: the job's output plus the time spent from
/// submission to resolution (queue wait included).
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub result: Value,
    pub duration: Duration,
}

/// Snapshot of the pool for monitoring and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub idle: usize,
    pub busy: usize,
    pub queued: usize,
    pub pending: usize,
}

pub(crate) struct JobRequest {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) payload: Value,
    pub(crate) reply: oneshot::Sender<Result<Value, HostError>>,
}

pub(crate) enum HostCommand {
    Submit(JobRequest),
    Stats(oneshot::Sender<PoolStats>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running worker host.
///
/// Cheap to clone; every clone talks to the same control task. Dropping the
/// last handle shuts the host down the same way [`WorkerHost::shutdown`]
/// does.
#[derive(Debug, Clone)]
pub struct WorkerHost {
    commands: mpsc::UnboundedSender<HostCommand>,
    registry: Arc<JobRegistry>,
}

impl WorkerHost {
    /// Start a host: eagerly creates `min_workers` workers and the control
    /// task that owns them.
    pub fn spawn(registry: Arc<JobRegistry>, events: Arc<EventBus>, config: HostConfig) -> Self {
        let config = config.normalized();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let state = control::HostState::new(config, Arc::clone(&registry), events, worker_tx);
        tokio::spawn(control::run(state, command_rx, worker_rx));
        Self {
            commands: command_tx,
            registry,
        }
    }

    /// Run a registered job to completion.
    ///
    /// Fails fast, before any worker or queue interaction, when the name
    /// is unknown or the payload does not satisfy the job's validator. The
    /// call then suspends until the job resolves, fails, times out, or the
    /// host shuts down.
    pub async fn run_job(
        &self,
        job_id: &str,
        name: &str,
        payload: Value,
    ) -> Result<JobOutcome, HostError> {
        let job = self
            .registry
            .get(name)
            .ok_or_else(|| HostError::JobNotFound {
                name: name.to_string(),
            })?;
        if let Err(violations) = job.validate(&payload) {
            return Err(HostError::JobValidation {
                name: name.to_string(),
                violations,
            });
        }

        let submitted = Instant::now();
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = JobRequest {
            id: job_id.to_string(),
            name: name.to_string(),
            payload,
            reply: reply_tx,
        };
        self.commands
            .send(HostCommand::Submit(request))
            .map_err(|_| HostError::ShuttingDown)?;

        let result = reply_rx.await.map_err(|_| HostError::ShuttingDown)??;
        Ok(JobOutcome {
            result,
            duration: submitted.elapsed(),
        })
    }

    /// Snapshot of pool membership and load.
    pub async fn stats(&self) -> Result<PoolStats, HostError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(HostCommand::Stats(tx))
            .map_err(|_| HostError::ShuttingDown)?;
        rx.await.map_err(|_| HostError::ShuttingDown)
    }

    /// Stop dispatching, reject every queued and pending job, and retire
    /// all workers. Idempotent; `run_job` afterwards rejects immediately.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(HostCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}
