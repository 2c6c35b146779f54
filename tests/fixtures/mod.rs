//! Scripted stand-ins for the external lookups and backends.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use presence_grader::db::{MemoryResultStore, NewScan, ResultStore, StoreError};

use presence_grader::models::analysis::{
    CompetitorData, CompetitorScores, DimensionScores, ListingDetails, LocalListingsResult,
    SearchVisibilityResult, ThemeBreakdown, WebsiteExperienceResult,
};
use presence_grader::models::job::{JobDescriptor, JobRecord, JobType};
use presence_grader::models::place::{LatLng, NearbyPlace, OpeningHours, PlaceDetails, PlaceSummary};
use presence_grader::models::progress::ProgressEvent;
use presence_grader::models::report::Report;
use presence_grader::models::scan::{Scan, ScanStatus};
use presence_grader::services::analysis::{AnalysisError, Analyzer};
use presence_grader::services::places::{PlaceLookup, PlacesError};
use presence_grader::services::progress::{ProgressChannel, ProgressError, ProgressStream};
use presence_grader::services::queue::{FailOutcome, JobQueue, QueueDepth, QueueError};

pub const PLACE_ID: &str = "osm_4471";

/// Dimension scores the default analyzer produces. Weighted overall is 49.
pub const SEARCH_SCORE: u32 = 50;
pub const WEBSITE_SCORE: u32 = 40;
pub const LISTINGS_SCORE: u32 = 60;
pub const EXPECTED_OVERALL: u32 = 49;

pub fn sample_place() -> PlaceDetails {
    PlaceDetails {
        place_id: PLACE_ID.to_string(),
        name: "Corner Stop Market".to_string(),
        formatted_address: "118 Lamar Blvd, Austin, TX 78704".to_string(),
        formatted_phone_number: Some("+1 512-555-0142".to_string()),
        website: Some("https://cornerstop.example".to_string()),
        location: LatLng {
            lat: 30.2581,
            lng: -97.7612,
        },
        types: vec!["convenience_store".to_string(), "gas_station".to_string()],
        opening_hours: Some(OpeningHours {
            weekday_text: vec!["Monday: 6:00 AM – 11:00 PM".to_string()],
            open_now: None,
        }),
        photos: vec![],
        rating: Some(4.1),
        user_ratings_total: Some(12),
        reviews: vec![],
    }
}

pub fn sample_summary() -> PlaceSummary {
    let place = sample_place();
    PlaceSummary {
        place_id: place.place_id,
        name: place.name,
        address: place.formatted_address,
        lat: place.location.lat,
        lon: place.location.lng,
        types: place.types,
    }
}

pub fn nearby(place_id: &str, name: &str, rating: f64, reviews: u32) -> NearbyPlace {
    NearbyPlace {
        place_id: place_id.to_string(),
        name: name.to_string(),
        vicinity: "Austin".to_string(),
        location: LatLng {
            lat: 30.2600,
            lng: -97.7600,
        },
        rating: Some(rating),
        user_ratings_total: Some(reviews),
        types: vec!["convenience_store".to_string()],
    }
}

/// Place lookup over a fixed set of known places.
pub struct FakePlaces {
    places: HashMap<String, PlaceDetails>,
}

impl FakePlaces {
    pub fn with_sample() -> Self {
        let place = sample_place();
        Self {
            places: HashMap::from([(place.place_id.clone(), place)]),
        }
    }
}

#[async_trait]
impl PlaceLookup for FakePlaces {
    async fn search(&self, query: &str) -> Result<Vec<PlaceSummary>, PlacesError> {
        let needle = query.to_lowercase();
        Ok(self
            .places
            .values()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .map(|_| sample_summary())
            .collect())
    }

    async fn details(
        &self,
        place_id: &str,
        _lat: f64,
        _lon: f64,
    ) -> Result<Option<PlaceDetails>, PlacesError> {
        Ok(self.places.get(place_id).cloned())
    }

    async fn nearby(&self, _center: LatLng, _radius_m: f64) -> Result<Vec<NearbyPlace>, PlacesError> {
        Ok(vec![
            nearby("osm_1", "QuickMart", 4.5, 200),
            nearby("osm_2", "Fuel Express", 3.9, 80),
        ])
    }
}

/// Analyzer with fixed scores and a scripted number of failures per job type.
#[derive(Default)]
pub struct FakeAnalyzer {
    failures: Mutex<HashMap<JobType, u32>>,
    calls: Mutex<HashMap<JobType, u32>>,
}

impl FakeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` calls for `job_type`.
    pub fn failing(self, job_type: JobType, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(job_type, times);
        self
    }

    pub fn calls(&self, job_type: JobType) -> u32 {
        self.calls.lock().unwrap().get(&job_type).copied().unwrap_or(0)
    }

    fn attempt(&self, job_type: JobType) -> Result<(), AnalysisError> {
        *self.calls.lock().unwrap().entry(job_type).or_insert(0) += 1;
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&job_type) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(AnalysisError::Failed(format!("{job_type} upstream timeout")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn search_visibility(
        &self,
        _place: &PlaceDetails,
    ) -> Result<SearchVisibilityResult, AnalysisError> {
        self.attempt(JobType::SearchVisibility)?;
        Ok(SearchVisibilityResult {
            score: SEARCH_SCORE,
            keyword_score: 10,
            map_pack_score: 40,
            breakdown: vec![ThemeBreakdown {
                theme: "Gas station near me".to_string(),
                score: 10,
                max_score: 20,
                details: "Ranked #4 among nearby stores".to_string(),
                ranking: Some(4),
            }],
        })
    }

    async fn website_experience(
        &self,
        _place: &PlaceDetails,
    ) -> Result<WebsiteExperienceResult, AnalysisError> {
        self.attempt(JobType::WebsiteExperience)?;
        Ok(WebsiteExperienceResult {
            score: WEBSITE_SCORE,
            has_website: true,
            essential_info_score: 20,
            mobile_score: 15,
            conversion_score: 5,
            ..WebsiteExperienceResult::unavailable()
        })
    }

    async fn local_listings(
        &self,
        _place: &PlaceDetails,
    ) -> Result<LocalListingsResult, AnalysisError> {
        self.attempt(JobType::LocalListings)?;
        Ok(LocalListingsResult {
            score: LISTINGS_SCORE,
            profile_completeness_score: 30,
            nap_consistency_score: 15,
            reviews_score: 15,
            details: ListingDetails {
                has_basic_info: true,
                has_website: true,
                has_category: true,
                review_count: 12,
                average_rating: 4.1,
                ..ListingDetails::default()
            },
        })
    }

    async fn competitor_benchmark(
        &self,
        _place: &PlaceDetails,
        current: DimensionScores,
    ) -> Result<Vec<CompetitorData>, AnalysisError> {
        self.attempt(JobType::CompetitorBenchmark)?;
        Ok(vec![CompetitorData {
            id: "competitor_A".to_string(),
            name: Some("QuickMart".to_string()),
            distance: 0.4,
            scores: CompetitorScores {
                overall: current.overall() + 20,
                search: current.search + 20,
                website: current.website + 30,
                listings: current.listings + 10,
            },
            advantages: vec!["Better website experience".to_string()],
        }])
    }
}

/// Progress channel that records every published event.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<(String, ProgressEvent)>>,
}

impl RecordingProgress {
    pub fn events_for(&self, session_id: &str) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(session, _)| session == session_id)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait]
impl ProgressChannel for RecordingProgress {
    async fn publish(&self, session_id: &str, event: &ProgressEvent) -> Result<(), ProgressError> {
        self.events
            .lock()
            .unwrap()
            .push((session_id.to_string(), event.clone()));
        Ok(())
    }

    async fn subscribe(&self, _session_id: &str) -> Result<ProgressStream, ProgressError> {
        Ok(stream::empty().boxed())
    }
}

fn redis_down() -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"))
}

/// Progress channel whose every publish fails.
pub struct FailingProgress;

#[async_trait]
impl ProgressChannel for FailingProgress {
    async fn publish(&self, _session_id: &str, _event: &ProgressEvent) -> Result<(), ProgressError> {
        Err(ProgressError::Redis(redis_down()))
    }

    async fn subscribe(&self, _session_id: &str) -> Result<ProgressStream, ProgressError> {
        Err(ProgressError::Redis(redis_down()))
    }
}

/// Queue that refuses every write.
pub struct FailingQueue;

#[async_trait]
impl JobQueue for FailingQueue {
    async fn enqueue(&self, _job: &JobDescriptor) -> Result<(), QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn lease(&self, _worker: &str) -> Result<Option<JobDescriptor>, QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn complete(&self, _job: &JobDescriptor) -> Result<(), QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn fail(&self, _job: &JobDescriptor, _error: &str) -> Result<FailOutcome, QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn defer(&self, _job: &JobDescriptor, _delay: Duration) -> Result<(), QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        Ok(QueueDepth::default())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Err(QueueError::Redis(redis_down()))
    }
}

/// Store where another writer lands a report for the same scan just before
/// the first insert.
pub struct RacingStore {
    inner: Arc<MemoryResultStore>,
    rival_report: Mutex<Option<Uuid>>,
}

impl RacingStore {
    pub fn new(inner: Arc<MemoryResultStore>) -> Self {
        Self {
            inner,
            rival_report: Mutex::new(None),
        }
    }

    /// Id of the report the other writer inserted, once it has.
    pub fn rival_report(&self) -> Option<Uuid> {
        *self.rival_report.lock().unwrap()
    }
}

#[async_trait]
impl ResultStore for RacingStore {
    async fn upsert_business(&self, place: &PlaceDetails) -> Result<Uuid, StoreError> {
        self.inner.upsert_business(place).await
    }

    async fn create_scan(&self, scan: &NewScan) -> Result<Scan, StoreError> {
        self.inner.create_scan(scan).await
    }

    async fn get_scan(&self, session_id: &str) -> Result<Option<Scan>, StoreError> {
        self.inner.get_scan(session_id).await
    }

    async fn set_scan_status(
        &self,
        session_id: &str,
        status: ScanStatus,
    ) -> Result<(), StoreError> {
        self.inner.set_scan_status(session_id, status).await
    }

    async fn get_jobs(&self, session_id: &str) -> Result<Vec<JobRecord>, StoreError> {
        self.inner.get_jobs(session_id).await
    }

    async fn mark_job_running(&self, session_id: &str, job_type: JobType) -> Result<(), StoreError> {
        self.inner.mark_job_running(session_id, job_type).await
    }

    async fn mark_job_queued(&self, session_id: &str, job_type: JobType) -> Result<(), StoreError> {
        self.inner.mark_job_queued(session_id, job_type).await
    }

    async fn save_job_result(
        &self,
        session_id: &str,
        job_type: JobType,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.inner.save_job_result(session_id, job_type, result).await
    }

    async fn mark_job_failed(
        &self,
        session_id: &str,
        job_type: JobType,
        error: &str,
    ) -> Result<(), StoreError> {
        self.inner.mark_job_failed(session_id, job_type, error).await
    }

    async fn get_report(&self, session_id: &str) -> Result<Option<Report>, StoreError> {
        self.inner.get_report(session_id).await
    }

    async fn insert_report(&self, report: &Report) -> Result<bool, StoreError> {
        let first = self.rival_report.lock().unwrap().is_none();
        if first {
            let rival = Report {
                id: Uuid::new_v4(),
                ..report.clone()
            };
            self.inner.insert_report(&rival).await?;
            *self.rival_report.lock().unwrap() = Some(rival.id);
        }
        self.inner.insert_report(report).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }
}
