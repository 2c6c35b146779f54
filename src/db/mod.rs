//! Result store: businesses, scans, per-job records and final reports.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{JobRecord, JobType};
use crate::models::place::PlaceDetails;
use crate::models::report::Report;
use crate::models::scan::{Scan, ScanOrigin, ScanStatus};

pub mod memory;
pub mod queries;

pub use memory::MemoryResultStore;
pub use queries::PgResultStore;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Fields for a new scan row.
#[derive(Debug, Clone)]
pub struct NewScan {
    pub session_id: String,
    pub business_id: Uuid,
    pub origin: ScanOrigin,
}

/// Durable store shared by the dispatcher, workers and the report synthesizer.
///
/// Job records are keyed by (scan, job type) and only ever upserted. A completed
/// job record is never moved back to another status, and a completed scan is
/// never moved out of `completed`. Reports are insert-if-absent.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or refresh a business keyed by its external place id.
    async fn upsert_business(&self, place: &PlaceDetails) -> Result<Uuid, StoreError>;

    /// Create a `pending` scan together with one `queued` record per job type.
    async fn create_scan(&self, scan: &NewScan) -> Result<Scan, StoreError>;

    async fn get_scan(&self, session_id: &str) -> Result<Option<Scan>, StoreError>;

    async fn set_scan_status(&self, session_id: &str, status: ScanStatus)
        -> Result<(), StoreError>;

    async fn get_jobs(&self, session_id: &str) -> Result<Vec<JobRecord>, StoreError>;

    async fn mark_job_running(&self, session_id: &str, job_type: JobType)
        -> Result<(), StoreError>;

    async fn mark_job_queued(&self, session_id: &str, job_type: JobType)
        -> Result<(), StoreError>;

    /// Upsert the job record as completed with its result, overwriting in place.
    async fn save_job_result(
        &self,
        session_id: &str,
        job_type: JobType,
        result: &serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn mark_job_failed(
        &self,
        session_id: &str,
        job_type: JobType,
        error: &str,
    ) -> Result<(), StoreError>;

    async fn get_report(&self, session_id: &str) -> Result<Option<Report>, StoreError>;

    /// Insert the report unless one already exists for its scan.
    /// Returns `false` when a report was already present.
    async fn insert_report(&self, report: &Report) -> Result<bool, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Scan not found: {0}")]
    ScanNotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
