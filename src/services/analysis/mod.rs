//! Analysis adapters: the four scoring dimensions a scan runs.
//!
//! Each dimension is a pure scoring function over collected evidence plus a thin
//! async layer that gathers that evidence. [`LiveAnalyzer`] wires the async layer
//! to the real lookups; tests substitute their own [`Analyzer`].

pub mod competitor;
pub mod listings;
pub mod pagespeed;
pub mod search;
pub mod website;

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::models::analysis::{
    CompetitorData, DimensionScores, LocalListingsResult, SearchVisibilityResult,
    WebsiteExperienceResult,
};
use crate::models::place::PlaceDetails;
use crate::services::places::{PlaceLookup, PlacesError};

pub use pagespeed::PageSpeedClient;

/// Nearby-search radius used as the local market: two miles.
pub const MARKET_RADIUS_METERS: f64 = 3219.0;

const MOBILE_USER_AGENT: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_0 like Mac OS X) AppleWebKit/605.1.15";

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn search_visibility(
        &self,
        place: &PlaceDetails,
    ) -> Result<SearchVisibilityResult, AnalysisError>;

    async fn website_experience(
        &self,
        place: &PlaceDetails,
    ) -> Result<WebsiteExperienceResult, AnalysisError>;

    async fn local_listings(&self, place: &PlaceDetails)
        -> Result<LocalListingsResult, AnalysisError>;

    /// Benchmark against the strongest nearby businesses, given this business's scores.
    async fn competitor_benchmark(
        &self,
        place: &PlaceDetails,
        current: DimensionScores,
    ) -> Result<Vec<CompetitorData>, AnalysisError>;
}

/// Analyzer backed by the place lookup, PageSpeed and direct website fetches.
pub struct LiveAnalyzer {
    places: Arc<dyn PlaceLookup>,
    pagespeed: Option<PageSpeedClient>,
    http: Client,
}

impl LiveAnalyzer {
    /// Without a PageSpeed client, Core Web Vitals are skipped and score zero.
    pub fn new(
        places: Arc<dyn PlaceLookup>,
        pagespeed: Option<PageSpeedClient>,
    ) -> Result<Self, AnalysisError> {
        let http = Client::builder()
            .user_agent(MOBILE_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            places,
            pagespeed,
            http,
        })
    }

    async fn score_rival(
        &self,
        details: &PlaceDetails,
    ) -> Result<competitor::ScoredCompetitor, AnalysisError> {
        Ok(competitor::ScoredCompetitor {
            search: self.search_visibility(details).await?,
            website: self.website_experience(details).await?,
            listings: self.local_listings(details).await?,
        })
    }

    async fn fetch_html(&self, url: &str) -> Result<String, reqwest::Error> {
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl Analyzer for LiveAnalyzer {
    async fn search_visibility(
        &self,
        place: &PlaceDetails,
    ) -> Result<SearchVisibilityResult, AnalysisError> {
        let nearby = self.places.nearby(place.location, MARKET_RADIUS_METERS).await?;
        let ranking = search::local_ranking(place, &nearby);
        tracing::debug!(place_id = %place.place_id, ranking, "Estimated local ranking");
        Ok(search::score_search_visibility(place, ranking))
    }

    async fn website_experience(
        &self,
        place: &PlaceDetails,
    ) -> Result<WebsiteExperienceResult, AnalysisError> {
        let Some(url) = place.website.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(WebsiteExperienceResult::unavailable());
        };

        let page_speed = match &self.pagespeed {
            Some(client) => Some(client.analyze(url).await),
            None => None,
        };
        let html = match self.fetch_html(url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(url, error = %e, "Website fetch failed, scoring as unavailable");
                return Ok(WebsiteExperienceResult::unavailable());
            }
        };

        let details = website::inspect_html(&html);
        Ok(website::score_website(page_speed, details))
    }

    async fn local_listings(
        &self,
        place: &PlaceDetails,
    ) -> Result<LocalListingsResult, AnalysisError> {
        Ok(listings::score_local_listings(
            place,
            chrono::Utc::now().timestamp(),
        ))
    }

    async fn competitor_benchmark(
        &self,
        place: &PlaceDetails,
        current: DimensionScores,
    ) -> Result<Vec<CompetitorData>, AnalysisError> {
        let nearby = self.places.nearby(place.location, MARKET_RADIUS_METERS).await?;
        let rivals = competitor::top_competitors(place, &nearby);

        let mut benchmarks = Vec::with_capacity(rivals.len());
        for rival in &rivals {
            let lookup = self
                .places
                .details(
                    &rival.place.place_id,
                    rival.place.location.lat,
                    rival.place.location.lng,
                )
                .await;
            let details = match lookup {
                Ok(Some(details)) => details,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        competitor = %rival.place.place_id,
                        error = %e,
                        "Skipping competitor after lookup failure"
                    );
                    continue;
                }
            };

            let scored = match self.score_rival(&details).await {
                Ok(scored) => scored,
                Err(e) => {
                    tracing::warn!(
                        competitor = %rival.place.place_id,
                        error = %e,
                        "Skipping competitor after scoring failure"
                    );
                    continue;
                }
            };
            // Ids are letters in listing order, so skipped rivals leave no gap.
            benchmarks.push(competitor::benchmark_entry(
                benchmarks.len(),
                rival.distance,
                place,
                current,
                &scored,
            ));
        }

        Ok(benchmarks)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Place lookup failed: {0}")]
    Places(#[from] PlacesError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Analysis failed: {0}")]
    Failed(String),
}
