//! In-process queue with the same lease/retry semantics as the Redis backend.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{next_deferral, next_failure, FailOutcome, JobQueue, QueueDepth, QueueError};
use crate::models::job::JobDescriptor;

#[derive(Default)]
struct MemoryQueueState {
    /// Single source of truth for descriptors; ids elsewhere may go stale.
    jobs: HashMap<Uuid, JobDescriptor>,
    ready: VecDeque<Uuid>,
    delayed: Vec<(Instant, Uuid)>,
    leased: HashMap<Uuid, Instant>,
}

impl MemoryQueueState {
    fn promote(&mut self, now: Instant) {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|(ready_at, _)| *ready_at <= now);
        self.delayed = waiting;
        for (_, id) in due {
            self.ready.push_back(id);
        }

        let expired: Vec<Uuid> = self
            .leased
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.leased.remove(&id);
            self.ready.push_front(id);
        }
    }

    fn forget(&mut self, id: Uuid) {
        self.jobs.remove(&id);
        self.leased.remove(&id);
        self.delayed.retain(|(_, queued)| *queued != id);
    }

    fn schedule(&mut self, job: JobDescriptor, delay: Duration) {
        let id = job.id;
        self.leased.remove(&id);
        self.delayed.retain(|(_, queued)| *queued != id);
        self.delayed.push((Instant::now() + delay, id));
        self.jobs.insert(id, job);
    }
}

pub struct MemoryJobQueue {
    state: Mutex<MemoryQueueState>,
    lease_timeout: Duration,
}

impl MemoryJobQueue {
    pub fn new(lease_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryQueueState::default()),
            lease_timeout,
        }
    }

    /// Snapshot of every descriptor still known to the queue.
    pub async fn pending(&self) -> Vec<JobDescriptor> {
        let state = self.state.lock().await;
        state.jobs.values().cloned().collect()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.jobs.insert(job.id, job.clone());
        state.ready.push_back(job.id);
        Ok(())
    }

    async fn lease(&self, worker: &str) -> Result<Option<JobDescriptor>, QueueError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.promote(now);

        while let Some(id) = state.ready.pop_front() {
            if let Some(job) = state.jobs.get(&id).cloned() {
                state.leased.insert(id, now + self.lease_timeout);
                tracing::debug!(worker, job_id = %id, job_type = %job.job_type, "Leased job");
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn complete(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        self.state.lock().await.forget(job.id);
        Ok(())
    }

    async fn fail(&self, job: &JobDescriptor, _error: &str) -> Result<FailOutcome, QueueError> {
        let (updated, outcome) = next_failure(job);
        let mut state = self.state.lock().await;
        match outcome {
            FailOutcome::Retrying { delay, .. } => state.schedule(updated, delay),
            FailOutcome::Exhausted { .. } => state.forget(job.id),
        }
        Ok(outcome)
    }

    async fn defer(&self, job: &JobDescriptor, delay: Duration) -> Result<(), QueueError> {
        let updated = next_deferral(job, delay);
        self.state.lock().await.schedule(updated, delay);
        Ok(())
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let state = self.state.lock().await;
        let ready = state
            .ready
            .iter()
            .filter(|id| state.jobs.contains_key(*id))
            .count();
        Ok(QueueDepth {
            ready: ready as u64,
            delayed: state.delayed.len() as u64,
            leased: state.leased.len() as u64,
        })
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobType, RetryPolicy};
    use crate::models::place::{LatLng, PlaceDetails};
    use std::sync::Arc;

    fn job(job_type: JobType, retry: RetryPolicy) -> JobDescriptor {
        let place = PlaceDetails {
            place_id: "osm_42".into(),
            name: "Night Owl Market".into(),
            formatted_address: "42 Elm St".into(),
            formatted_phone_number: None,
            website: None,
            location: LatLng { lat: 0.0, lng: 0.0 },
            types: vec!["convenience_store".into()],
            opening_hours: None,
            photos: vec![],
            rating: None,
            user_ratings_total: None,
            reviews: vec![],
        };
        JobDescriptor::new(job_type, "sess-1", place, retry)
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_lease_is_fifo_and_exclusive() {
        let queue = MemoryJobQueue::new(Duration::from_secs(30));
        let first = job(JobType::SearchVisibility, fast_retry());
        let second = job(JobType::WebsiteExperience, fast_retry());
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        assert_eq!(queue.lease("w1").await.unwrap().unwrap().id, first.id);
        assert_eq!(queue.lease("w2").await.unwrap().unwrap().id, second.id);
        assert!(queue.lease("w3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_leasers_never_share_a_job() {
        let queue = Arc::new(MemoryJobQueue::new(Duration::from_secs(30)));
        for _ in 0..20 {
            queue.enqueue(&job(JobType::LocalListings, fast_retry())).await.unwrap();
        }

        let mut handles = Vec::new();
        for n in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(job) = queue.lease(&format!("w{n}")).await.unwrap() {
                    seen.push(job.id);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        let unique: std::collections::HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 20);
        assert_eq!(unique.len(), 20);
    }

    #[tokio::test]
    async fn test_expired_lease_becomes_visible_again() {
        let queue = MemoryJobQueue::new(Duration::from_millis(5));
        let original = job(JobType::CompetitorBenchmark, fast_retry());
        queue.enqueue(&original).await.unwrap();

        let leased = queue.lease("w1").await.unwrap().unwrap();
        assert!(queue.lease("w2").await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(15)).await;
        let again = queue.lease("w2").await.unwrap().unwrap();
        assert_eq!(leased.id, again.id);
    }

    #[tokio::test]
    async fn test_exhausted_job_is_never_leased_again() {
        let queue = MemoryJobQueue::new(Duration::from_secs(30));
        queue.enqueue(&job(JobType::WebsiteExperience, fast_retry())).await.unwrap();

        let mut outcomes = Vec::new();
        while let Some(leased) = queue.lease("w1").await.unwrap() {
            outcomes.push(queue.fail(&leased, "timeout").await.unwrap());
        }

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[2], FailOutcome::Exhausted { attempts: 3 });
        assert_eq!(queue.depth().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_deferred_job_waits_for_delay() {
        let queue = MemoryJobQueue::new(Duration::from_secs(30));
        queue.enqueue(&job(JobType::CompetitorBenchmark, fast_retry())).await.unwrap();

        let leased = queue.lease("w1").await.unwrap().unwrap();
        queue.defer(&leased, Duration::from_millis(20)).await.unwrap();
        assert!(queue.lease("w1").await.unwrap().is_none());
        assert_eq!(queue.depth().await.unwrap().delayed, 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let again = queue.lease("w1").await.unwrap().unwrap();
        assert_eq!(again.deferrals, 1);
        assert_eq!(again.attempts, 0);
    }

    #[tokio::test]
    async fn test_complete_removes_job() {
        let queue = MemoryJobQueue::new(Duration::from_millis(1));
        queue.enqueue(&job(JobType::LocalListings, fast_retry())).await.unwrap();
        let leased = queue.lease("w1").await.unwrap().unwrap();
        queue.complete(&leased).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(queue.lease("w1").await.unwrap().is_none());
        assert!(queue.pending().await.is_empty());
    }
}
