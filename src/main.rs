use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use jobmill::config::HostConfig;
use jobmill::events::EventBus;
use jobmill::host::WorkerHost;
use jobmill::jobs;
use jobmill::registry::JobRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = HostConfig {
        min_workers: env_parse("JOBMILL_MIN_WORKERS", 2),
        max_workers: env_parse("JOBMILL_MAX_WORKERS", 6),
        job_timeout: Duration::from_secs(env_parse("JOBMILL_TIMEOUT_SECS", 30)),
        max_queue: env_parse("JOBMILL_QUEUE_LIMIT", 256),
    }
    .normalized();

    let mut registry = JobRegistry::new();
    jobs::register_builtin(&mut registry)?;
    let registry = Arc::new(registry);

    eprintln!("⚙️  Jobmill v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Jobs: {}", registry.names().join(", "));
    eprintln!(
        "   Pool: {}-{} workers, {:?} timeout, queue limit {}\n",
        config.min_workers, config.max_workers, config.job_timeout, config.max_queue
    );

    let events = Arc::new(EventBus::new());
    let host = WorkerHost::spawn(Arc::clone(&registry), Arc::clone(&events), config);

    // Demo run: stream lifecycle events while an echo job goes through the
    // pool, the same way a gateway would relay them to a remote caller.
    let job_id = Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    let mut stream = events.subscribe(&job_id, cancel.clone());
    let printer = tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            tracing::info!(?event, "job event");
        }
    });

    let outcome = host
        .run_job(&job_id, "echo", json!({ "msg": "hello from the pool" }))
        .await?;
    tracing::info!(result = %outcome.result, duration = ?outcome.duration, "echo finished");

    let stats = host.stats().await?;
    tracing::info!(
        workers = stats.workers,
        idle = stats.idle,
        "pool after the demo run"
    );

    cancel.cancel();
    printer.await?;
    host.shutdown().await;
    Ok(())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
