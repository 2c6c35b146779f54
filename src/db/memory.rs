//! In-process result store with the same upsert and uniqueness rules as PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{NewScan, ResultStore, StoreError};
use crate::models::job::{JobRecord, JobStatus, JobType};
use crate::models::place::PlaceDetails;
use crate::models::report::Report;
use crate::models::scan::{Scan, ScanStatus};

#[derive(Default)]
struct MemoryState {
    businesses: HashMap<String, (Uuid, PlaceDetails)>,
    scans: HashMap<String, Scan>,
    jobs: HashMap<(Uuid, JobType), JobRecord>,
    reports: HashMap<Uuid, Report>,
}

impl MemoryState {
    fn scan_id(&self, session_id: &str) -> Result<Uuid, StoreError> {
        self.scans
            .get(session_id)
            .map(|s| s.id)
            .ok_or_else(|| StoreError::ScanNotFound(session_id.to_string()))
    }

    fn job_entry(&mut self, scan_id: Uuid, job_type: JobType) -> &mut JobRecord {
        self.jobs
            .entry((scan_id, job_type))
            .or_insert_with(|| JobRecord {
                id: Uuid::new_v4(),
                scan_id,
                job_type,
                status: JobStatus::Queued,
                result: None,
                error: None,
                started_at: None,
                completed_at: None,
            })
    }
}

#[derive(Default)]
pub struct MemoryResultStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, simulating a database outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn scan_count(&self) -> usize {
        self.state.lock().await.scans.len()
    }

    pub async fn business_count(&self) -> usize {
        self.state.lock().await.businesses.len()
    }

    pub async fn report_count(&self) -> usize {
        self.state.lock().await.reports.len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    async fn set_job_status(
        &self,
        session_id: &str,
        job_type: JobType,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let scan_id = state.scan_id(session_id)?;
        let record = state.job_entry(scan_id, job_type);
        if record.status == JobStatus::Completed {
            return Ok(());
        }

        record.status = status;
        record.error = error.map(str::to_string);
        match status {
            JobStatus::Running => record.started_at = Some(Utc::now()),
            JobStatus::Failed => record.completed_at = Some(Utc::now()),
            JobStatus::Queued | JobStatus::Completed => {}
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn upsert_business(&self, place: &PlaceDetails) -> Result<Uuid, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let id = state
            .businesses
            .get(&place.place_id)
            .map(|(id, _)| *id)
            .unwrap_or_else(Uuid::new_v4);
        state
            .businesses
            .insert(place.place_id.clone(), (id, place.clone()));
        Ok(id)
    }

    async fn create_scan(&self, scan: &NewScan) -> Result<Scan, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        if state.scans.contains_key(&scan.session_id) {
            return Err(StoreError::Corrupt(format!(
                "duplicate session id {}",
                scan.session_id
            )));
        }

        let created = Scan {
            id: Uuid::new_v4(),
            session_id: scan.session_id.clone(),
            business_id: scan.business_id,
            status: ScanStatus::Pending,
            initiated_at: Utc::now(),
            completed_at: None,
        };
        state
            .scans
            .insert(created.session_id.clone(), created.clone());
        for job_type in JobType::ALL {
            state.job_entry(created.id, job_type);
        }
        Ok(created)
    }

    async fn get_scan(&self, session_id: &str) -> Result<Option<Scan>, StoreError> {
        self.check()?;
        Ok(self.state.lock().await.scans.get(session_id).cloned())
    }

    async fn set_scan_status(
        &self,
        session_id: &str,
        status: ScanStatus,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let scan = state
            .scans
            .get_mut(session_id)
            .ok_or_else(|| StoreError::ScanNotFound(session_id.to_string()))?;
        if scan.status == ScanStatus::Completed {
            return Ok(());
        }
        scan.status = status;
        if status.is_terminal() {
            scan.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_jobs(&self, session_id: &str) -> Result<Vec<JobRecord>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        let scan_id = state.scan_id(session_id)?;
        let mut jobs: Vec<JobRecord> = state
            .jobs
            .values()
            .filter(|j| j.scan_id == scan_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.job_type.as_ref().to_string());
        Ok(jobs)
    }

    async fn mark_job_running(
        &self,
        session_id: &str,
        job_type: JobType,
    ) -> Result<(), StoreError> {
        self.set_job_status(session_id, job_type, JobStatus::Running, None)
            .await
    }

    async fn mark_job_queued(
        &self,
        session_id: &str,
        job_type: JobType,
    ) -> Result<(), StoreError> {
        self.set_job_status(session_id, job_type, JobStatus::Queued, None)
            .await
    }

    async fn save_job_result(
        &self,
        session_id: &str,
        job_type: JobType,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let scan_id = state.scan_id(session_id)?;
        let record = state.job_entry(scan_id, job_type);
        record.status = JobStatus::Completed;
        record.result = Some(result.clone());
        record.error = None;
        record.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_job_failed(
        &self,
        session_id: &str,
        job_type: JobType,
        error: &str,
    ) -> Result<(), StoreError> {
        self.set_job_status(session_id, job_type, JobStatus::Failed, Some(error))
            .await
    }

    async fn get_report(&self, session_id: &str) -> Result<Option<Report>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        let scan_id = state.scan_id(session_id)?;
        Ok(state.reports.get(&scan_id).cloned())
    }

    async fn insert_report(&self, report: &Report) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        if state.reports.contains_key(&report.scan_id) {
            return Ok(false);
        }
        state.reports.insert(report.scan_id, report.clone());
        Ok(true)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check()
    }
}
