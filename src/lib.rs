//! Jobmill — a bounded worker-pool engine for CPU-heavy jobs.
//!
//! Named job implementations are collected in a [`registry::JobRegistry`],
//! dispatched FIFO onto a pool of worker threads by a [`host::WorkerHost`],
//! and observed through per-job [`events::EventBus`] subscriptions.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod host;
pub mod jobs;
pub mod registry;
mod runtime;
