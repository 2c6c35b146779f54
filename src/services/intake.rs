//! Front door for new scans and place search: validation, rate limiting,
//! place resolution, then dispatch.

use garde::Validate;
use std::sync::Arc;

use crate::models::api::{CreateScanRequest, ScanAccepted, SearchRequest, SearchResponse};
use crate::models::scan::ScanOrigin;
use crate::services::dispatcher::{DispatchError, Dispatcher};
use crate::services::places::{PlaceLookup, PlacesError};
use crate::services::rate_limit::RateLimiter;

pub struct ScanIntake {
    limiter: RateLimiter,
    places: Arc<dyn PlaceLookup>,
    dispatcher: Arc<Dispatcher>,
}

impl ScanIntake {
    pub fn new(
        limiter: RateLimiter,
        places: Arc<dyn PlaceLookup>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            limiter,
            places,
            dispatcher,
        }
    }

    /// Accept a scan request. Rejections have no side effects beyond the
    /// rate-limit counter.
    pub async fn create_scan(
        &self,
        request: CreateScanRequest,
        origin: ScanOrigin,
    ) -> Result<ScanAccepted, IntakeError> {
        metrics::counter!("scan_requests_total").increment(1);
        request.validate()?;

        let decision = self.limiter.check(origin.rate_limit_key()).await;
        if decision.is_limited() {
            metrics::counter!("scan_rate_limited_total").increment(1);
            tracing::warn!(client = origin.rate_limit_key(), "Scan request rate limited");
            return Err(IntakeError::RateLimited);
        }

        let place = self
            .places
            .details(&request.place_id, request.lat, request.lon)
            .await?
            .ok_or_else(|| IntakeError::PlaceNotFound(request.place_id.clone()))?;

        let scan = self.dispatcher.start_scan(&place, origin).await?;
        Ok(ScanAccepted {
            progress_url: format!("/api/v1/scans/{}/progress", scan.session_id),
            session_id: scan.session_id,
            status: scan.status,
        })
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, IntakeError> {
        request.validate()?;
        let results = self.places.search(request.query.trim()).await?;
        Ok(SearchResponse { results })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Invalid request: {0}")]
    Validation(#[from] garde::Report),

    #[error("Too many scans. Please try again in an hour.")]
    RateLimited,

    #[error("Place not found: {0}")]
    PlaceNotFound(String),

    #[error("Place lookup failed: {0}")]
    Lookup(#[from] PlacesError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
