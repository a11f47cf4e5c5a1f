//! Worker runtime — the loop executed by each pool thread.
//!
//! Receives one invocation at a time, resolves the job in the shared
//! registry, runs it, and posts the reply. A failure inside the job
//! (error return or panic) becomes an error reply; only a failure of the
//! runtime itself surfaces to the host as a worker exit.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::context::JobContext;
use crate::events::EventBus;
use crate::host::pool::{Invocation, WorkerEvent, WorkerId};
use crate::registry::JobRegistry;

/// Posts the exit notice even when the runtime unwinds.
struct ExitGuard {
    worker: WorkerId,
    replies: UnboundedSender<WorkerEvent>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.replies.send(WorkerEvent::Exited {
            worker: self.worker,
        });
    }
}

pub(crate) fn run(
    worker: WorkerId,
    registry: Arc<JobRegistry>,
    events: Arc<EventBus>,
    invocations: Receiver<Invocation>,
    replies: UnboundedSender<WorkerEvent>,
) {
    let _guard = ExitGuard {
        worker,
        replies: replies.clone(),
    };
    tracing::debug!(worker = %worker, "worker runtime started");
    while let Ok(invocation) = invocations.recv() {
        let job_id = invocation.id.clone();
        let outcome = execute(&registry, &events, invocation);
        if replies
            .send(WorkerEvent::Reply {
                worker,
                job_id,
                outcome,
            })
            .is_err()
        {
            break;
        }
    }
    tracing::debug!(worker = %worker, "worker runtime stopped");
}

fn execute(
    registry: &Arc<JobRegistry>,
    events: &Arc<EventBus>,
    invocation: Invocation,
) -> Result<Value, String> {
    let Invocation { id, name, payload } = invocation;
    let Some(job) = registry.get(&name) else {
        // The host validates before dispatch; reaching this means the two
        // sides hold different registries.
        return Err(format!("job '{name}' is not registered"));
    };
    let ctx = JobContext::new(id, Arc::clone(events));
    match catch_unwind(AssertUnwindSafe(|| job.run(payload, &ctx))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(err.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("job panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("job panicked: {message}")
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Job;
    use serde_json::json;

    struct PanickyJob;

    impl Job for PanickyJob {
        fn name(&self) -> &str {
            "panicky"
        }
        fn run(&self, _payload: Value, _ctx: &JobContext) -> anyhow::Result<Value> {
            panic!("boom");
        }
    }

    struct FailingJob;

    impl Job for FailingJob {
        fn name(&self) -> &str {
            "failing"
        }
        fn run(&self, _payload: Value, _ctx: &JobContext) -> anyhow::Result<Value> {
            Err(anyhow::anyhow!("intentional failure"))
        }
    }

    fn registry() -> Arc<JobRegistry> {
        let mut registry = JobRegistry::new();
        registry.register(Arc::new(PanickyJob)).unwrap();
        registry.register(Arc::new(FailingJob)).unwrap();
        Arc::new(registry)
    }

    fn invocation(name: &str) -> Invocation {
        Invocation {
            id: "j1".to_string(),
            name: name.to_string(),
            payload: json!({}),
        }
    }

    #[test]
    fn panic_becomes_error_reply() {
        let err = execute(&registry(), &Arc::new(EventBus::new()), invocation("panicky"))
            .unwrap_err();
        assert_eq!(err, "job panicked: boom");
    }

    #[test]
    fn job_error_is_surfaced_verbatim() {
        let err = execute(&registry(), &Arc::new(EventBus::new()), invocation("failing"))
            .unwrap_err();
        assert_eq!(err, "intentional failure");
    }

    #[test]
    fn unknown_job_is_an_error_reply() {
        let err = execute(&registry(), &Arc::new(EventBus::new()), invocation("missing"))
            .unwrap_err();
        assert!(err.contains("not registered"));
    }
}
