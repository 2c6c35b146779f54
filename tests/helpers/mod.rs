//! In-memory pipeline harness shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use presence_grader::app_state::{AppState, Backends, PipelineSettings};
use presence_grader::db::{MemoryResultStore, ResultStore};
use presence_grader::models::api::CreateScanRequest;
use presence_grader::models::job::{JobDescriptor, JobType, RetryPolicy};
use presence_grader::models::scan::{ScanOrigin, ScanStatus};
use presence_grader::services::cache::MemoryCache;
use presence_grader::services::processor::{JobProcessor, ProcessedJob, ReadinessPolicy};
use presence_grader::services::progress::ProgressChannel;
use presence_grader::services::queue::{JobQueue, MemoryJobQueue};

use crate::fixtures::{sample_place, FakeAnalyzer, FakePlaces, RecordingProgress};

/// Millisecond delays so retries and deferrals resolve inside a test.
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
        },
        readiness: ReadinessPolicy {
            retry_delay: Duration::from_millis(1),
            max_deferrals: 1_000,
        },
        rate_limit: 100,
        rate_window: Duration::from_secs(3600),
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryResultStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub progress: Arc<RecordingProgress>,
    pub analyzer: Arc<FakeAnalyzer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeAnalyzer::new(), fast_settings())
    }

    pub fn with_analyzer(analyzer: FakeAnalyzer) -> Self {
        Self::build(analyzer, fast_settings())
    }

    pub fn build(analyzer: FakeAnalyzer, settings: PipelineSettings) -> Self {
        let store = Arc::new(MemoryResultStore::new());
        let queue = Arc::new(MemoryJobQueue::new(Duration::from_secs(30)));
        let progress = Arc::new(RecordingProgress::default());
        let analyzer = Arc::new(analyzer);

        let state = AppState::new(
            Backends {
                store: Arc::clone(&store) as Arc<dyn ResultStore>,
                queue: Arc::clone(&queue) as Arc<dyn JobQueue>,
                progress: Arc::clone(&progress) as Arc<dyn ProgressChannel>,
                cache: Arc::new(MemoryCache::new()),
                places: Arc::new(FakePlaces::with_sample()),
                analyzer: Arc::clone(&analyzer) as _,
            },
            settings,
        );

        Self {
            state,
            store,
            queue,
            progress,
            analyzer,
        }
    }

    pub fn processor(&self) -> &JobProcessor {
        &self.state.processor
    }

    /// Accept a scan for the sample place and return its session id.
    pub async fn start_scan(&self) -> String {
        self.state
            .intake
            .create_scan(scan_request(), origin("203.0.113.10"))
            .await
            .expect("scan should be accepted")
            .session_id
    }

    /// Process jobs until the queue is fully drained.
    pub async fn drain(&self) -> Vec<ProcessedJob> {
        drain(self.processor(), self.queue.as_ref()).await
    }

    pub async fn scan_status(&self, session_id: &str) -> ScanStatus {
        self.store
            .get_scan(session_id)
            .await
            .unwrap()
            .expect("scan exists")
            .status
    }

    /// Take every ready job off the queue, then put back the given types in order.
    ///
    /// Jobs left out stay leased, as if a worker were still running them.
    pub async fn reorder(&self, order: &[JobType]) -> Vec<JobDescriptor> {
        let mut leased = Vec::new();
        while let Some(job) = self.queue.lease("test-reorder").await.unwrap() {
            leased.push(job);
        }
        for job_type in order {
            let job = leased
                .iter()
                .find(|j| j.job_type == *job_type)
                .expect("job type was queued");
            self.queue.enqueue(job).await.unwrap();
        }
        leased
    }
}

pub fn scan_request() -> CreateScanRequest {
    let place = sample_place();
    CreateScanRequest {
        place_id: place.place_id,
        lat: place.location.lat,
        lon: place.location.lng,
    }
}

pub fn origin(ip: &str) -> ScanOrigin {
    ScanOrigin {
        ip_address: Some(ip.to_string()),
        user_agent: Some("integration-test".to_string()),
    }
}

pub async fn drain(processor: &JobProcessor, queue: &dyn JobQueue) -> Vec<ProcessedJob> {
    let mut processed = Vec::new();
    for _ in 0..10_000 {
        match processor.process_next("test-worker").await.unwrap() {
            Some(job) => processed.push(job),
            None if queue.depth().await.unwrap().total() == 0 => return processed,
            None => tokio::time::sleep(Duration::from_millis(2)).await,
        }
    }
    panic!("queue did not drain");
}

/// Poll until the scan reaches a terminal status.
pub async fn wait_for_terminal(store: &dyn ResultStore, session_id: &str) -> ScanStatus {
    for _ in 0..500 {
        let status = store
            .get_scan(session_id)
            .await
            .unwrap()
            .expect("scan exists")
            .status;
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan {session_id} never finished");
}
