//! Worker handles and the host↔worker wire types.

use std::sync::Arc;
use std::sync::mpsc as thread_mpsc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::events::EventBus;
use crate::registry::JobRegistry;
use crate::runtime;

/// Opaque identifier for a pool worker. Never reused within a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WorkerId(pub(crate) u64);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// What a worker is currently doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerState {
    Idle,
    Busy { job_id: String },
}

/// Host→worker invocation message.
pub(crate) struct Invocation {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) payload: Value,
}

/// Worker→host messages.
pub(crate) enum WorkerEvent {
    /// The worker finished an invocation, successfully or not.
    Reply {
        worker: WorkerId,
        job_id: String,
        outcome: Result<Value, String>,
    },
    /// The worker's runtime loop ended. Expected after an eviction;
    /// anything else is a crash.
    Exited { worker: WorkerId },
}

/// Host-side handle to one worker thread.
///
/// Dropping the handle closes the mailbox, which retires the thread as
/// soon as it finishes its current invocation.
pub(crate) struct WorkerHandle {
    pub(crate) state: WorkerState,
    mailbox: thread_mpsc::Sender<Invocation>,
}

impl WorkerHandle {
    /// Hand an invocation to the worker. Returns the invocation when the
    /// mailbox is closed (the thread is already gone).
    pub(crate) fn dispatch(&self, invocation: Invocation) -> Result<(), Invocation> {
        self.mailbox.send(invocation).map_err(|err| err.0)
    }
}

/// Spawn a worker thread running the shared runtime loop.
pub(crate) fn spawn_worker(
    id: WorkerId,
    registry: Arc<JobRegistry>,
    events: Arc<EventBus>,
    replies: mpsc::UnboundedSender<WorkerEvent>,
) -> std::io::Result<WorkerHandle> {
    let (mailbox, invocations) = thread_mpsc::channel();
    std::thread::Builder::new()
        .name(format!("jobmill-{id}"))
        .spawn(move || runtime::run(id, registry, events, invocations, replies))?;
    Ok(WorkerHandle {
        state: WorkerState::Idle,
        mailbox,
    })
}
