//! The control task — owns pool membership, the dispatch queue, the
//! pending map, and the deadline heap.
//!
//! Every mutation happens inside this task, so the data structures need no
//! locks. Workers never touch host state; they only exchange messages.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};

use crate::config::HostConfig;
use crate::error::HostError;
use crate::events::{EventBus, JobEvent};
use crate::registry::JobRegistry;

use super::pool::{self, Invocation, WorkerEvent, WorkerHandle, WorkerId, WorkerState};
use super::{HostCommand, JobRequest, PoolStats};

/// Bookkeeping for one dispatched job awaiting its reply.
struct PendingEntry {
    reply: oneshot::Sender<Result<Value, HostError>>,
    worker: WorkerId,
    deadline: Instant,
}

/// Entry in the deadline heap. Settled jobs leave stale entries behind;
/// they are recognized by comparing `at` against the live pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Deadline {
    at: Instant,
    job_id: String,
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at
            .cmp(&other.at)
            .then_with(|| self.job_id.cmp(&other.job_id))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub(crate) struct HostState {
    config: HostConfig,
    registry: Arc<JobRegistry>,
    events: Arc<EventBus>,
    workers: HashMap<WorkerId, WorkerHandle>,
    queue: VecDeque<JobRequest>,
    pending: HashMap<String, PendingEntry>,
    deadlines: BinaryHeap<Reverse<Deadline>>,
    worker_events: mpsc::UnboundedSender<WorkerEvent>,
    next_worker: u64,
    shutting_down: bool,
}

impl HostState {
    pub(crate) fn new(
        config: HostConfig,
        registry: Arc<JobRegistry>,
        events: Arc<EventBus>,
        worker_events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        let mut state = Self {
            config,
            registry,
            events,
            workers: HashMap::new(),
            queue: VecDeque::new(),
            pending: HashMap::new(),
            deadlines: BinaryHeap::new(),
            worker_events,
            next_worker: 0,
            shutting_down: false,
        };
        for _ in 0..state.config.min_workers {
            state.spawn_worker();
        }
        state
    }

    fn submit(&mut self, request: JobRequest) {
        if self.shutting_down {
            let _ = request.reply.send(Err(HostError::ShuttingDown));
            return;
        }
        if self.queue.len() >= self.config.max_queue {
            tracing::warn!(
                job = %request.id,
                limit = self.config.max_queue,
                "dispatch queue full; rejecting job"
            );
            let _ = request.reply.send(Err(HostError::QueueFull {
                limit: self.config.max_queue,
            }));
            return;
        }
        self.queue.push_back(request);
        self.process_queue();
    }

    /// Dispatch queued requests in FIFO order while workers are available.
    fn process_queue(&mut self) {
        if self.shutting_down {
            return;
        }
        while !self.queue.is_empty() {
            let Some(worker) = self.claim_worker() else {
                return;
            };
            let Some(request) = self.queue.pop_front() else {
                return;
            };
            self.dispatch(worker, request);
        }
    }

    /// An idle worker, or a fresh one while the pool is below `max_workers`.
    fn claim_worker(&mut self) -> Option<WorkerId> {
        if let Some(id) = self
            .workers
            .iter()
            .find(|(_, w)| w.state == WorkerState::Idle)
            .map(|(id, _)| *id)
        {
            return Some(id);
        }
        if self.workers.len() < self.config.max_workers {
            return self.spawn_worker();
        }
        None
    }

    fn spawn_worker(&mut self) -> Option<WorkerId> {
        let id = WorkerId(self.next_worker);
        self.next_worker += 1;
        match pool::spawn_worker(
            id,
            Arc::clone(&self.registry),
            Arc::clone(&self.events),
            self.worker_events.clone(),
        ) {
            Ok(handle) => {
                self.workers.insert(id, handle);
                tracing::debug!(worker = %id, pool = self.workers.len(), "spawned worker");
                Some(id)
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn worker thread");
                None
            }
        }
    }

    /// Send a request to a claimed worker and record the pending entry.
    /// `Started` is published before the worker sees the invocation, so
    /// subscribers observe it ahead of any progress the job emits.
    fn dispatch(&mut self, worker_id: WorkerId, request: JobRequest) {
        self.events.publish(
            &request.id,
            JobEvent::Started {
                job: request.name.clone(),
            },
        );
        let invocation = Invocation {
            id: request.id.clone(),
            name: request.name.clone(),
            payload: request.payload,
        };
        let failed = match self.workers.get_mut(&worker_id) {
            Some(handle) => match handle.dispatch(invocation) {
                Ok(()) => {
                    handle.state = WorkerState::Busy {
                        job_id: request.id.clone(),
                    };
                    None
                }
                Err(returned) => Some(returned),
            },
            None => return,
        };
        if let Some(returned) = failed {
            // Mailbox closed: the thread died before we noticed. Evict it
            // and put the request back at the head of the queue; the
            // process_queue loop claims another worker for it.
            tracing::warn!(worker = %worker_id, "worker mailbox closed during dispatch");
            self.workers.remove(&worker_id);
            self.queue.push_front(JobRequest {
                id: request.id,
                name: request.name,
                payload: returned.payload,
                reply: request.reply,
            });
            self.replace_worker_if_needed();
            return;
        }

        let deadline = Instant::now() + self.config.job_timeout;
        self.deadlines.push(Reverse(Deadline {
            at: deadline,
            job_id: request.id.clone(),
        }));
        self.pending.insert(
            request.id.clone(),
            PendingEntry {
                reply: request.reply,
                worker: worker_id,
                deadline,
            },
        );
        tracing::debug!(job = %request.id, worker = %worker_id, "dispatched job");
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Reply {
                worker,
                job_id,
                outcome,
            } => self.handle_reply(worker, job_id, outcome),
            WorkerEvent::Exited { worker } => self.handle_worker_exited(worker),
        }
    }

    fn handle_reply(&mut self, worker: WorkerId, job_id: String, outcome: Result<Value, String>) {
        if let Some(entry) = self.pending.remove(&job_id) {
            let result = outcome.map_err(|reason| HostError::JobFailed {
                id: job_id.clone(),
                reason,
            });
            // The caller may have given up on the oneshot; that is fine.
            let _ = entry.reply.send(result);
        } else {
            // Settled earlier by timeout or shutdown.
            tracing::debug!(job = %job_id, "late reply for settled job ignored");
        }
        if let Some(handle) = self.workers.get_mut(&worker) {
            handle.state = WorkerState::Idle;
        }
        if !self.shutting_down {
            self.process_queue();
        }
    }

    /// A worker's runtime loop ended. Evictions we initiated have already
    /// removed the worker from the map; anything still present crashed.
    fn handle_worker_exited(&mut self, worker: WorkerId) {
        let Some(handle) = self.workers.remove(&worker) else {
            return;
        };
        tracing::warn!(worker = %worker, "worker exited unexpectedly");
        if let WorkerState::Busy { job_id } = handle.state
            && let Some(entry) = self.pending.remove(&job_id)
        {
            // Fail the in-flight job now rather than letting its timeout
            // fire half a minute later.
            let _ = entry.reply.send(Err(HostError::WorkerCrashed { id: job_id.clone() }));
            tracing::warn!(job = %job_id, "job rejected after worker crash");
        }
        if !self.shutting_down {
            self.replace_worker_if_needed();
            self.process_queue();
        }
    }

    fn replace_worker_if_needed(&mut self) {
        if self.shutting_down {
            return;
        }
        while self.workers.len() < self.config.min_workers {
            if self.spawn_worker().is_none() {
                break;
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.peek().map(|Reverse(d)| d.at)
    }

    /// Settle every pending entry whose deadline has passed. Stale heap
    /// entries (jobs that settled first) are skipped.
    fn fire_due_timeouts(&mut self) {
        let now = Instant::now();
        while self
            .deadlines
            .peek()
            .is_some_and(|Reverse(head)| head.at <= now)
        {
            let Some(Reverse(deadline)) = self.deadlines.pop() else {
                break;
            };
            let live = self
                .pending
                .get(&deadline.job_id)
                .is_some_and(|entry| entry.deadline == deadline.at);
            if !live {
                continue;
            }
            let Some(entry) = self.pending.remove(&deadline.job_id) else {
                continue;
            };
            tracing::warn!(
                job = %deadline.job_id,
                worker = %entry.worker,
                timeout = ?self.config.job_timeout,
                "job timed out; evicting worker"
            );
            let _ = entry.reply.send(Err(HostError::Timeout {
                id: deadline.job_id.clone(),
                timeout: self.config.job_timeout,
            }));
            // Dropping the handle closes the mailbox; the stuck thread
            // retires itself once its current run returns.
            self.workers.remove(&entry.worker);
            if !self.shutting_down {
                self.replace_worker_if_needed();
                self.process_queue();
            }
        }
    }

    fn stats(&self) -> PoolStats {
        let idle = self
            .workers
            .values()
            .filter(|w| w.state == WorkerState::Idle)
            .count();
        PoolStats {
            workers: self.workers.len(),
            idle,
            busy: self.workers.len() - idle,
            queued: self.queue.len(),
            pending: self.pending.len(),
        }
    }

    /// Reject everything queued and pending, retire all workers.
    fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        tracing::info!(
            queued = self.queue.len(),
            pending = self.pending.len(),
            workers = self.workers.len(),
            "shutting down worker host"
        );
        for request in self.queue.drain(..) {
            let _ = request.reply.send(Err(HostError::ShuttingDown));
        }
        for (_, entry) in self.pending.drain() {
            let _ = entry.reply.send(Err(HostError::ShuttingDown));
        }
        self.deadlines.clear();
        self.workers.clear();
    }
}

/// The control loop. Exits after shutdown, or when every host handle has
/// been dropped.
pub(crate) async fn run(
    mut state: HostState,
    mut commands: mpsc::UnboundedReceiver<HostCommand>,
    mut worker_events: mpsc::UnboundedReceiver<WorkerEvent>,
) {
    loop {
        let next = state.next_deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(HostCommand::Submit(request)) => state.submit(request),
                Some(HostCommand::Stats(reply)) => {
                    let _ = reply.send(state.stats());
                }
                Some(HostCommand::Shutdown(ack)) => {
                    state.shutdown();
                    let _ = ack.send(());
                    break;
                }
                None => {
                    state.shutdown();
                    break;
                }
            },
            Some(event) = worker_events.recv() => state.handle_worker_event(event),
            _ = sleep_until(next.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600))),
                if next.is_some() =>
            {
                state.fire_due_timeouts();
            }
        }
    }
}
