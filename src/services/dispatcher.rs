//! Scan dispatch: persist a scan and its four job records, then enqueue the jobs.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

use crate::db::{NewScan, ResultStore, StoreError};
use crate::models::job::{JobDescriptor, JobType, RetryPolicy};
use crate::models::place::PlaceDetails;
use crate::models::scan::{Scan, ScanOrigin, ScanStatus};
use crate::services::queue::{JobQueue, QueueError};

const SESSION_ID_LEN: usize = 16;

/// Fresh unguessable session identifier.
pub fn generate_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

pub struct Dispatcher {
    store: Arc<dyn ResultStore>,
    queue: Arc<dyn JobQueue>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ResultStore>, queue: Arc<dyn JobQueue>, retry: RetryPolicy) -> Self {
        Self {
            store,
            queue,
            retry,
        }
    }

    /// Start a scan of `place` and return it as dispatched.
    ///
    /// Nothing is enqueued unless the scan and its job records were persisted
    /// and the scan was moved to `in_progress`. All four jobs go out together;
    /// the competitor benchmark waits on its siblings by re-queueing itself.
    pub async fn start_scan(
        &self,
        place: &PlaceDetails,
        origin: ScanOrigin,
    ) -> Result<Scan, DispatchError> {
        let session_id = generate_session_id();

        let business_id = self.store.upsert_business(place).await?;
        let mut scan = self
            .store
            .create_scan(&NewScan {
                session_id: session_id.clone(),
                business_id,
                origin,
            })
            .await?;

        // Once a job is visible to workers, only they move the scan forward.
        self.store
            .set_scan_status(&session_id, ScanStatus::InProgress)
            .await?;
        scan.status = ScanStatus::InProgress;

        let jobs: Vec<JobDescriptor> = JobType::ALL
            .iter()
            .map(|job_type| JobDescriptor::new(*job_type, &session_id, place.clone(), self.retry))
            .collect();

        if let Err(e) = self.queue.enqueue_all(&jobs).await {
            tracing::error!(session_id = %session_id, error = %e, "Failed to enqueue scan jobs");
            if let Err(mark_err) = self
                .store
                .set_scan_status(&session_id, ScanStatus::Failed)
                .await
            {
                tracing::warn!(
                    session_id = %session_id,
                    error = %mark_err,
                    "Could not mark undispatched scan as failed"
                );
            }
            return Err(DispatchError::Queue(e));
        }

        for job in &jobs {
            metrics::counter!("scan_jobs_enqueued_total", "job_type" => job.job_type.to_string())
                .increment(1);
        }

        tracing::info!(
            session_id = %session_id,
            scan_id = %scan.id,
            place_id = %place.place_id,
            "Scan dispatched"
        );
        Ok(scan)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to persist scan: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to enqueue scan jobs: {0}")]
    Queue(#[from] QueueError),
}
