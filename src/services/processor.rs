//! Job processing: lease one job, run its analysis, record the outcome.
//!
//! The three independent analyses complete on their own. The competitor
//! benchmark is the fan-in point: it re-queues itself until all three siblings
//! have completed, then benchmarks and hands off to the report synthesizer.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::db::{ResultStore, StoreError};
use crate::models::analysis::{
    LocalListingsResult, SearchVisibilityResult, WebsiteExperienceResult,
};
use crate::models::job::{JobDescriptor, JobRecord, JobStatus, JobType};
use crate::models::progress::{ProgressEvent, ProgressStage};
use crate::models::scan::ScanStatus;
use crate::services::analysis::{AnalysisError, Analyzer};
use crate::services::progress::{publish_lossy, ProgressChannel};
use crate::services::queue::{FailOutcome, JobQueue, QueueError};
use crate::services::synthesizer::{ReportSynthesizer, SynthesisInputs};

/// How long the competitor benchmark waits for its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Delay before a not-ready benchmark is leased again.
    pub retry_delay: Duration,
    /// Not-ready re-queues allowed before the benchmark gives up.
    pub max_deferrals: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(5000),
            max_deferrals: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Siblings not finished yet; re-queued without spending a retry.
    Deferred { deferrals: u32 },
    Retrying { attempt: u32, delay: Duration },
    Failed { error: String },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Deferred { .. } => "deferred",
            JobOutcome::Retrying { .. } => "retrying",
            JobOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedJob {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub session_id: String,
    pub outcome: JobOutcome,
}

enum Readiness {
    Ready(SiblingResults),
    Pending,
    SiblingFailed(JobType),
}

struct SiblingResults {
    search: SearchVisibilityResult,
    website: WebsiteExperienceResult,
    listings: LocalListingsResult,
}

pub struct JobProcessor {
    store: Arc<dyn ResultStore>,
    queue: Arc<dyn JobQueue>,
    progress: Arc<dyn ProgressChannel>,
    analyzer: Arc<dyn Analyzer>,
    synthesizer: ReportSynthesizer,
    readiness: ReadinessPolicy,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn ResultStore>,
        queue: Arc<dyn JobQueue>,
        progress: Arc<dyn ProgressChannel>,
        analyzer: Arc<dyn Analyzer>,
        readiness: ReadinessPolicy,
    ) -> Self {
        let synthesizer = ReportSynthesizer::new(Arc::clone(&store), Arc::clone(&progress));
        Self {
            store,
            queue,
            progress,
            analyzer,
            synthesizer,
            readiness,
        }
    }

    /// Lease and process at most one job. `Ok(None)` means the queue was empty.
    ///
    /// An `Err` leaves the job leased; it becomes visible again once the lease
    /// times out.
    pub async fn process_next(&self, worker: &str) -> Result<Option<ProcessedJob>, ProcessError> {
        let Some(job) = self.queue.lease(worker).await? else {
            return Ok(None);
        };

        let span = tracing::info_span!(
            "job",
            session_id = %job.session_id,
            job_type = %job.job_type,
            job_id = %job.id,
            attempt = job.attempts + 1
        );
        let outcome = self.process(&job).instrument(span).await?;

        Ok(Some(ProcessedJob {
            job_id: job.id,
            job_type: job.job_type,
            session_id: job.session_id,
            outcome,
        }))
    }

    async fn process(&self, job: &JobDescriptor) -> Result<JobOutcome, ProcessError> {
        let records = self.store.get_jobs(&job.session_id).await?;
        if self.already_done(job, &records).await? {
            tracing::info!("Job already completed, acknowledging duplicate delivery");
            self.queue.complete(job).await?;
            return Ok(JobOutcome::Completed);
        }

        if job.job_type.is_dependent() {
            self.process_benchmark(job, &records).await
        } else {
            self.process_independent(job).await
        }
    }

    async fn already_done(
        &self,
        job: &JobDescriptor,
        records: &[JobRecord],
    ) -> Result<bool, ProcessError> {
        let own_done = records
            .iter()
            .any(|r| r.job_type == job.job_type && r.is_completed());
        if !own_done {
            return Ok(false);
        }
        if !job.job_type.is_dependent() {
            return Ok(true);
        }
        // The benchmark is only finished once its report exists.
        Ok(self.store.get_report(&job.session_id).await?.is_some())
    }

    async fn process_independent(&self, job: &JobDescriptor) -> Result<JobOutcome, ProcessError> {
        self.store
            .mark_job_running(&job.session_id, job.job_type)
            .await?;
        self.publish(job, start_event(job.job_type)).await;

        let started = Instant::now();
        let (result, done_event) = match self.run_independent(job).await {
            Ok(ran) => ran,
            Err(e) => return self.handle_failure(job, &e.to_string()).await,
        };

        self.store
            .save_job_result(&job.session_id, job.job_type, &result)
            .await?;
        self.publish(job, done_event).await;
        self.queue.complete(job).await?;
        record_completion(job.job_type, started);

        tracing::info!("Analysis completed");
        Ok(JobOutcome::Completed)
    }

    async fn run_independent(
        &self,
        job: &JobDescriptor,
    ) -> Result<(serde_json::Value, ProgressEvent), AnalysisError> {
        let place = &job.business;
        match job.job_type {
            JobType::SearchVisibility => {
                let result = self.analyzer.search_visibility(place).await?;
                let event = ProgressEvent::new(
                    ProgressStage::Search,
                    30,
                    format!("✓ Analyzed {} keyword themes", result.breakdown.len()),
                );
                Ok((encode(&result)?, event))
            }
            JobType::WebsiteExperience => {
                let result = self.analyzer.website_experience(place).await?;
                let event = ProgressEvent::new(
                    ProgressStage::Website,
                    55,
                    format!("✓ Scanned website (Mobile Performance: {}/100)", result.score),
                );
                Ok((encode(&result)?, event))
            }
            JobType::LocalListings => {
                let result = self.analyzer.local_listings(place).await?;
                let event = ProgressEvent::new(
                    ProgressStage::Listings,
                    70,
                    "✓ Analyzed Google Business Profile",
                );
                Ok((encode(&result)?, event))
            }
            JobType::CompetitorBenchmark => Err(AnalysisError::Failed(
                "competitor benchmark has dependencies".to_string(),
            )),
        }
    }

    async fn process_benchmark(
        &self,
        job: &JobDescriptor,
        records: &[JobRecord],
    ) -> Result<JobOutcome, ProcessError> {
        let siblings = match check_siblings(records) {
            Ok(Readiness::Ready(siblings)) => siblings,
            Ok(Readiness::Pending) => return self.defer(job).await,
            Ok(Readiness::SiblingFailed(sibling)) => {
                let error = format!("{sibling} analysis failed permanently");
                self.queue.complete(job).await?;
                return self.fail_permanently(job, &error).await;
            }
            Err(e) => {
                let error = format!("Unreadable sibling result: {e}");
                return self.handle_failure(job, &error).await;
            }
        };

        self.store
            .mark_job_running(&job.session_id, job.job_type)
            .await?;
        self.publish(job, start_event(job.job_type)).await;

        let started = Instant::now();
        let inputs = SynthesisInputs {
            search: siblings.search,
            website: siblings.website,
            listings: siblings.listings,
            competitors: Vec::new(),
        };
        let competitors = match self
            .analyzer
            .competitor_benchmark(&job.business, inputs.scores())
            .await
        {
            Ok(competitors) => competitors,
            Err(e) => return self.handle_failure(job, &e.to_string()).await,
        };
        let encoded = match encode(&competitors) {
            Ok(value) => value,
            Err(e) => return self.handle_failure(job, &e.to_string()).await,
        };

        self.store
            .save_job_result(&job.session_id, job.job_type, &encoded)
            .await?;
        self.publish(
            job,
            ProgressEvent::new(
                ProgressStage::Competitors,
                85,
                format!("✓ Benchmarked against {} nearby stores", competitors.len()),
            ),
        )
        .await;

        let inputs = SynthesisInputs {
            competitors,
            ..inputs
        };
        if let Err(e) = self.synthesizer.synthesize(&job.session_id, &inputs).await {
            return self
                .handle_failure(job, &format!("Report synthesis failed: {e}"))
                .await;
        }

        self.queue.complete(job).await?;
        record_completion(job.job_type, started);
        tracing::info!("Benchmark completed and report synthesized");
        Ok(JobOutcome::Completed)
    }

    async fn defer(&self, job: &JobDescriptor) -> Result<JobOutcome, ProcessError> {
        if job.deferrals >= self.readiness.max_deferrals {
            let error = format!(
                "Sibling analyses still incomplete after {} re-queues",
                job.deferrals
            );
            self.queue.complete(job).await?;
            return self.fail_permanently(job, &error).await;
        }

        self.queue.defer(job, self.readiness.retry_delay).await?;
        metrics::counter!("scan_jobs_deferred_total").increment(1);
        tracing::debug!(
            deferrals = job.deferrals + 1,
            "Sibling analyses pending, benchmark re-queued"
        );
        Ok(JobOutcome::Deferred {
            deferrals: job.deferrals + 1,
        })
    }

    /// Hand a failed execution back to the queue's retry policy.
    async fn handle_failure(
        &self,
        job: &JobDescriptor,
        error: &str,
    ) -> Result<JobOutcome, ProcessError> {
        match self.queue.fail(job, error).await? {
            FailOutcome::Retrying { attempt, delay } => {
                self.store
                    .mark_job_queued(&job.session_id, job.job_type)
                    .await?;
                metrics::counter!("scan_jobs_retried_total", "job_type" => job.job_type.to_string())
                    .increment(1);
                tracing::warn!(
                    error,
                    delay_ms = delay.as_millis() as u64,
                    "Job failed, retry scheduled"
                );
                Ok(JobOutcome::Retrying { attempt, delay })
            }
            FailOutcome::Exhausted { attempts } => {
                let error = format!("Failed after {attempts} attempts: {error}");
                self.fail_permanently(job, &error).await
            }
        }
    }

    /// Record a terminal failure. The job must already be out of the queue.
    async fn fail_permanently(
        &self,
        job: &JobDescriptor,
        error: &str,
    ) -> Result<JobOutcome, ProcessError> {
        self.store
            .mark_job_failed(&job.session_id, job.job_type, error)
            .await?;
        self.store
            .set_scan_status(&job.session_id, ScanStatus::Failed)
            .await?;
        metrics::counter!("scan_jobs_failed_total", "job_type" => job.job_type.to_string())
            .increment(1);
        tracing::error!(error, "Job failed permanently, scan marked failed");

        self.publish(job, ProgressEvent::failed(format!("Scan failed: {error}")))
            .await;
        Ok(JobOutcome::Failed {
            error: error.to_string(),
        })
    }

    async fn publish(&self, job: &JobDescriptor, event: ProgressEvent) {
        publish_lossy(self.progress.as_ref(), &job.session_id, event).await;
    }
}

fn start_event(job_type: JobType) -> ProgressEvent {
    let (percent, message) = match job_type {
        JobType::SearchVisibility => (20, "Checking search rankings..."),
        JobType::WebsiteExperience => (40, "Testing website speed..."),
        JobType::LocalListings => (60, "Checking local listings..."),
        JobType::CompetitorBenchmark => (75, "Analyzing competitors..."),
    };
    ProgressEvent::new(job_type.stage(), percent, message)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, AnalysisError> {
    serde_json::to_value(value).map_err(|e| AnalysisError::Failed(format!("encode result: {e}")))
}

fn record_completion(job_type: JobType, started: Instant) {
    let label = job_type.to_string();
    metrics::counter!("scan_jobs_completed_total", "job_type" => label.clone()).increment(1);
    metrics::histogram!("scan_job_duration_seconds", "job_type" => label)
        .record(started.elapsed().as_secs_f64());
}

/// Whether the three independent analyses have all completed.
fn check_siblings(records: &[JobRecord]) -> Result<Readiness, serde_json::Error> {
    let record = |job_type: JobType| records.iter().find(|r| r.job_type == job_type);

    if let Some(failed) = JobType::INDEPENDENT
        .into_iter()
        .find(|t| record(*t).is_some_and(|r| r.status == JobStatus::Failed))
    {
        return Ok(Readiness::SiblingFailed(failed));
    }

    let result = |job_type: JobType| {
        record(job_type)
            .filter(|r| r.is_completed())
            .and_then(|r| r.result.clone())
    };
    let (Some(search), Some(website), Some(listings)) = (
        result(JobType::SearchVisibility),
        result(JobType::WebsiteExperience),
        result(JobType::LocalListings),
    ) else {
        return Ok(Readiness::Pending);
    };

    Ok(Readiness::Ready(SiblingResults {
        search: serde_json::from_value(search)?,
        website: serde_json::from_value(website)?,
        listings: serde_json::from_value(listings)?,
    }))
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
