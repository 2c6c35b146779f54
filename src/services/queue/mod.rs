//! Durable multi-consumer job queue with leases, retry backoff and deferral.
//!
//! A leased job is invisible to other leasers until it is completed, failed,
//! deferred, or its lease times out. Expired leases make the job visible again,
//! so delivery is at-least-once.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::models::job::JobDescriptor;

mod memory;
mod redis_backend;

pub use self::memory::MemoryJobQueue;
pub use self::redis_backend::RedisJobQueue;

/// What the queue did with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Re-queued; visible again after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// Retry budget spent; the job was removed and will never be leased again.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub ready: u64,
    pub delayed: u64,
    pub leased: u64,
}

impl QueueDepth {
    pub fn total(&self) -> u64 {
        self.ready + self.delayed + self.leased
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Make a job visible to leasers.
    async fn enqueue(&self, job: &JobDescriptor) -> Result<(), QueueError>;

    /// Enqueue several jobs as one unit.
    async fn enqueue_all(&self, jobs: &[JobDescriptor]) -> Result<(), QueueError> {
        for job in jobs {
            self.enqueue(job).await?;
        }
        Ok(())
    }

    /// Atomically take one ready job, or `None` when nothing is ready.
    async fn lease(&self, worker: &str) -> Result<Option<JobDescriptor>, QueueError>;

    /// Remove a finished job.
    async fn complete(&self, job: &JobDescriptor) -> Result<(), QueueError>;

    /// Record a failed execution and apply the job's retry policy.
    async fn fail(&self, job: &JobDescriptor, error: &str) -> Result<FailOutcome, QueueError>;

    /// Put a job back after `delay` without charging its retry budget.
    async fn defer(&self, job: &JobDescriptor, delay: Duration) -> Result<(), QueueError>;

    async fn depth(&self) -> Result<QueueDepth, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Bookkeeping shared by both backends for a failed execution.
fn next_failure(job: &JobDescriptor) -> (JobDescriptor, FailOutcome) {
    let attempts = job.attempts + 1;
    let mut updated = job.clone();
    updated.attempts = attempts;

    if job.retry.is_exhausted(attempts) {
        updated.next_retry_at = None;
        return (updated, FailOutcome::Exhausted { attempts });
    }

    let delay = job.retry.backoff(attempts);
    updated.next_retry_at = Some(retry_deadline(delay));
    (
        updated,
        FailOutcome::Retrying {
            attempt: attempts,
            delay,
        },
    )
}

fn next_deferral(job: &JobDescriptor, delay: Duration) -> JobDescriptor {
    let mut updated = job.clone();
    updated.deferrals += 1;
    updated.next_retry_at = Some(retry_deadline(delay));
    updated
}

fn retry_deadline(delay: Duration) -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobType, RetryPolicy};
    use crate::models::place::{LatLng, PlaceDetails};

    fn descriptor(retry: RetryPolicy) -> JobDescriptor {
        let place = PlaceDetails {
            place_id: "osm_1".into(),
            name: "Quick Stop".into(),
            formatted_address: "1 Main St".into(),
            formatted_phone_number: None,
            website: None,
            location: LatLng { lat: 1.0, lng: 2.0 },
            types: vec![],
            opening_hours: None,
            photos: vec![],
            rating: None,
            user_ratings_total: None,
            reviews: vec![],
        };
        JobDescriptor::new(JobType::LocalListings, "sess", place, retry)
    }

    #[test]
    fn test_failure_schedules_backoff_until_exhausted() {
        let job = descriptor(RetryPolicy::default());

        let (job, outcome) = next_failure(&job);
        assert_eq!(
            outcome,
            FailOutcome::Retrying {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );
        assert!(job.next_retry_at.is_some());

        let (job, outcome) = next_failure(&job);
        assert!(matches!(outcome, FailOutcome::Retrying { attempt: 2, .. }));

        let (_, outcome) = next_failure(&job);
        assert_eq!(outcome, FailOutcome::Exhausted { attempts: 3 });
    }

    #[test]
    fn test_deferral_does_not_touch_attempts() {
        let job = descriptor(RetryPolicy::default());
        let deferred = next_deferral(&job, Duration::from_millis(10));
        assert_eq!(deferred.attempts, 0);
        assert_eq!(deferred.deferrals, 1);
    }
}
