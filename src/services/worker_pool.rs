//! Fixed-size pool of workers that lease and process jobs until shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::services::processor::JobProcessor;
use crate::services::queue::JobQueue;

/// Handle to a running pool. Workers share nothing but the injected clients.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(size: usize, processor: Arc<JobProcessor>, poll_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..size)
            .map(|index| {
                let processor = Arc::clone(&processor);
                let mut rx = shutdown_rx.clone();
                let worker = format!("worker-{}-{index}", std::process::id());
                tokio::spawn(async move {
                    worker_loop(&worker, &processor, poll_interval, &mut rx).await;
                })
            })
            .collect();

        tracing::info!(size, "Worker pool started");
        Self { shutdown_tx, joins }
    }

    /// Receiver that flips to `true` when shutdown is requested.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Stop taking new leases. In-flight jobs run to completion.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker: &str,
    processor: &JobProcessor,
    poll_interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let idle = match processor.process_next(worker).await {
            Ok(Some(processed)) => {
                tracing::debug!(
                    worker,
                    job_id = %processed.job_id,
                    outcome = processed.outcome.label(),
                    "Job processed"
                );
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::error!(worker, error = %e, "Error processing job, lease will expire");
                true
            }
        };

        if idle {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // Pool handle dropped without an explicit shutdown.
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

/// Sample queue depth into the `scan_queue_depth` gauge until `shutdown` fires.
pub fn spawn_depth_monitor(
    queue: Arc<dyn JobQueue>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    match queue.depth().await {
                        Ok(depth) => metrics::gauge!("scan_queue_depth").set(depth.total() as f64),
                        Err(e) => tracing::warn!(error = %e, "Failed to sample queue depth"),
                    }
                }
            }
        }
    })
}
