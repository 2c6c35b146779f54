use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::{NewScan, ResultStore, StoreError};
use crate::models::analysis::CompetitorData;
use crate::models::job::{JobRecord, JobStatus, JobType};
use crate::models::place::PlaceDetails;
use crate::models::report::{Problem, Report, RevenueEstimate};
use crate::models::scan::{Scan, ScanStatus};

/// PostgreSQL-backed result store.
#[derive(Clone)]
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn scan_id(&self, session_id: &str) -> Result<Uuid, StoreError> {
        let row = sqlx::query("SELECT id FROM scans WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(r.try_get("id")?),
            None => Err(StoreError::ScanNotFound(session_id.to_string())),
        }
    }

    /// Upsert a job record's status unless it has already completed.
    async fn upsert_job_status(
        &self,
        session_id: &str,
        job_type: JobType,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let scan_id = self.scan_id(session_id).await?;

        sqlx::query(
            r#"
            INSERT INTO scan_jobs (scan_id, job_type, status, error_message, started_at, completed_at)
            VALUES ($1, $2, $3, $4,
                    CASE WHEN $3 = 'running' THEN NOW() ELSE NULL END,
                    CASE WHEN $3 = 'failed' THEN NOW() ELSE NULL END)
            ON CONFLICT (scan_id, job_type) DO UPDATE
            SET status = EXCLUDED.status,
                error_message = EXCLUDED.error_message,
                started_at = CASE WHEN EXCLUDED.status = 'running' THEN NOW() ELSE scan_jobs.started_at END,
                completed_at = CASE WHEN EXCLUDED.status = 'failed' THEN NOW() ELSE scan_jobs.completed_at END
            WHERE scan_jobs.status <> 'completed'
            "#,
        )
        .bind(scan_id)
        .bind(job_type.as_ref())
        .bind(status.to_string())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn scan_from_row(r: &PgRow) -> Result<Scan, StoreError> {
    let status: String = r.try_get("status")?;
    Ok(Scan {
        id: r.try_get("id")?,
        session_id: r.try_get("session_id")?,
        business_id: r.try_get("business_id")?,
        status: ScanStatus::from_str(&status)
            .map_err(|_| StoreError::Corrupt(format!("scan status {status}")))?,
        initiated_at: r.try_get("initiated_at")?,
        completed_at: r.try_get("completed_at")?,
    })
}

fn job_from_row(r: &PgRow) -> Result<JobRecord, StoreError> {
    let job_type: String = r.try_get("job_type")?;
    let status: String = r.try_get("status")?;
    Ok(JobRecord {
        id: r.try_get("id")?,
        scan_id: r.try_get("scan_id")?,
        job_type: JobType::from_str(&job_type)
            .map_err(|_| StoreError::Corrupt(format!("job type {job_type}")))?,
        status: JobStatus::from_str(&status)
            .map_err(|_| StoreError::Corrupt(format!("job status {status}")))?,
        result: r.try_get("result")?,
        error: r.try_get("error_message")?,
        started_at: r.try_get("started_at")?,
        completed_at: r.try_get("completed_at")?,
    })
}

fn report_from_row(r: &PgRow) -> Result<Report, StoreError> {
    let score = |column: &str| -> Result<u32, StoreError> {
        let value: i32 = r.try_get(column)?;
        Ok(value.max(0) as u32)
    };
    let Json(problems): Json<Vec<Problem>> = r.try_get("problems")?;
    let Json(competitors): Json<Vec<CompetitorData>> = r.try_get("competitors")?;
    let Json(revenue_estimate): Json<RevenueEstimate> = r.try_get("revenue_estimate")?;

    Ok(Report {
        id: r.try_get("id")?,
        scan_id: r.try_get("scan_id")?,
        overall_score: score("overall_score")?,
        search_visibility_score: score("search_visibility_score")?,
        website_experience_score: score("website_experience_score")?,
        local_listings_score: score("local_listings_score")?,
        raw_data: r.try_get("raw_data")?,
        problems,
        competitors,
        revenue_estimate,
        generated_at: r.try_get("generated_at")?,
    })
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn upsert_business(&self, place: &PlaceDetails) -> Result<Uuid, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO businesses (place_id, name, address, lat, lng, phone, website, types)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (place_id) DO UPDATE
            SET name = EXCLUDED.name,
                address = EXCLUDED.address,
                lat = EXCLUDED.lat,
                lng = EXCLUDED.lng,
                phone = EXCLUDED.phone,
                website = EXCLUDED.website,
                types = EXCLUDED.types,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&place.place_id)
        .bind(&place.name)
        .bind(&place.formatted_address)
        .bind(place.location.lat)
        .bind(place.location.lng)
        .bind(place.formatted_phone_number.as_deref())
        .bind(place.website.as_deref())
        .bind(Json(&place.types))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("id")?)
    }

    async fn create_scan(&self, scan: &NewScan) -> Result<Scan, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO scans (session_id, business_id, status, ip_address, user_agent)
            VALUES ($1, $2, 'pending', $3, $4)
            RETURNING id, session_id, business_id, status, initiated_at, completed_at
            "#,
        )
        .bind(&scan.session_id)
        .bind(scan.business_id)
        .bind(scan.origin.ip_address.as_deref())
        .bind(scan.origin.user_agent.as_deref())
        .fetch_one(&mut *tx)
        .await?;
        let created = scan_from_row(&row)?;

        for job_type in JobType::ALL {
            sqlx::query(
                r#"
                INSERT INTO scan_jobs (scan_id, job_type, status)
                VALUES ($1, $2, 'queued')
                ON CONFLICT (scan_id, job_type) DO NOTHING
                "#,
            )
            .bind(created.id)
            .bind(job_type.as_ref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get_scan(&self, session_id: &str) -> Result<Option<Scan>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, session_id, business_id, status, initiated_at, completed_at
            FROM scans
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(scan_from_row).transpose()
    }

    async fn set_scan_status(
        &self,
        session_id: &str,
        status: ScanStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE scans
            SET status = $1,
                completed_at = CASE WHEN $1 IN ('completed', 'failed') THEN NOW() ELSE completed_at END
            WHERE session_id = $2 AND status <> 'completed'
            "#,
        )
        .bind(status.to_string())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && self.get_scan(session_id).await?.is_none() {
            return Err(StoreError::ScanNotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn get_jobs(&self, session_id: &str) -> Result<Vec<JobRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT j.id, j.scan_id, j.job_type, j.status, j.result, j.error_message,
                   j.started_at, j.completed_at
            FROM scan_jobs j
            JOIN scans s ON s.id = j.scan_id
            WHERE s.session_id = $1
            ORDER BY j.job_type
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn mark_job_running(
        &self,
        session_id: &str,
        job_type: JobType,
    ) -> Result<(), StoreError> {
        self.upsert_job_status(session_id, job_type, JobStatus::Running, None)
            .await
    }

    async fn mark_job_queued(
        &self,
        session_id: &str,
        job_type: JobType,
    ) -> Result<(), StoreError> {
        self.upsert_job_status(session_id, job_type, JobStatus::Queued, None)
            .await
    }

    async fn save_job_result(
        &self,
        session_id: &str,
        job_type: JobType,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let scan_id = self.scan_id(session_id).await?;

        sqlx::query(
            r#"
            INSERT INTO scan_jobs (scan_id, job_type, status, result, completed_at)
            VALUES ($1, $2, 'completed', $3, NOW())
            ON CONFLICT (scan_id, job_type) DO UPDATE
            SET status = 'completed',
                result = EXCLUDED.result,
                error_message = NULL,
                completed_at = NOW()
            "#,
        )
        .bind(scan_id)
        .bind(job_type.as_ref())
        .bind(result)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_job_failed(
        &self,
        session_id: &str,
        job_type: JobType,
        error: &str,
    ) -> Result<(), StoreError> {
        self.upsert_job_status(session_id, job_type, JobStatus::Failed, Some(error))
            .await
    }

    async fn get_report(&self, session_id: &str) -> Result<Option<Report>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT r.id, r.scan_id, r.overall_score, r.search_visibility_score,
                   r.website_experience_score, r.local_listings_score, r.raw_data,
                   r.problems, r.competitors, r.revenue_estimate, r.generated_at
            FROM reports r
            JOIN scans s ON s.id = r.scan_id
            WHERE s.session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(report_from_row).transpose()
    }

    async fn insert_report(&self, report: &Report) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO reports (id, scan_id, overall_score, search_visibility_score,
                                 website_experience_score, local_listings_score, raw_data,
                                 problems, competitors, revenue_estimate, generated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (scan_id) DO NOTHING
            "#,
        )
        .bind(report.id)
        .bind(report.scan_id)
        .bind(report.overall_score as i32)
        .bind(report.search_visibility_score as i32)
        .bind(report.website_experience_score as i32)
        .bind(report.local_listings_score as i32)
        .bind(&report.raw_data)
        .bind(Json(&report.problems))
        .bind(Json(&report.competitors))
        .bind(Json(&report.revenue_estimate))
        .bind(report.generated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
