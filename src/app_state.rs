use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::db::{PgResultStore, ResultStore};
use crate::models::job::RetryPolicy;
use crate::services::{
    analysis::{AnalysisError, Analyzer, LiveAnalyzer, PageSpeedClient},
    cache::{CacheError, KeyValueCache, RedisCache},
    dispatcher::Dispatcher,
    intake::ScanIntake,
    places::{NominatimClient, PlaceLookup, PlacesError},
    processor::{JobProcessor, ReadinessPolicy},
    progress::{ProgressChannel, ProgressError, RedisProgressChannel},
    queue::{JobQueue, QueueError, RedisJobQueue},
    rate_limit::RateLimiter,
};

/// Pipeline tuning shared by the server and the worker.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub retry: RetryPolicy,
    pub readiness: ReadinessPolicy,
    pub rate_limit: u64,
    pub rate_window: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            readiness: ReadinessPolicy::default(),
            rate_limit: 5,
            rate_window: Duration::from_secs(3600),
        }
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            retry: config.retry_policy(),
            readiness: config.readiness_policy(),
            rate_limit: config.rate_limit_scans_per_hour,
            rate_window: config.rate_limit_window(),
        }
    }
}

/// Backing services, injected so tests can run the pipeline in memory.
pub struct Backends {
    pub store: Arc<dyn ResultStore>,
    pub queue: Arc<dyn JobQueue>,
    pub progress: Arc<dyn ProgressChannel>,
    pub cache: Arc<dyn KeyValueCache>,
    pub places: Arc<dyn PlaceLookup>,
    pub analyzer: Arc<dyn Analyzer>,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResultStore>,
    pub queue: Arc<dyn JobQueue>,
    pub progress: Arc<dyn ProgressChannel>,
    pub intake: Arc<ScanIntake>,
    pub processor: Arc<JobProcessor>,
}

impl AppState {
    pub fn new(backends: Backends, settings: PipelineSettings) -> Self {
        let Backends {
            store,
            queue,
            progress,
            cache,
            places,
            analyzer,
        } = backends;

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            settings.retry,
        ));
        let limiter = RateLimiter::new(cache, settings.rate_limit, settings.rate_window);
        let intake = Arc::new(ScanIntake::new(limiter, places, dispatcher));
        let processor = Arc::new(JobProcessor::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&progress),
            analyzer,
            settings.readiness,
        ));

        Self {
            store,
            queue,
            progress,
            intake,
            processor,
        }
    }

    /// Connect the production backends: PostgreSQL, Redis and the live lookups.
    pub async fn connect(config: &AppConfig, pool: PgPool) -> Result<Self, BootstrapError> {
        tracing::info!("Connecting to Redis");
        let queue = RedisJobQueue::connect(
            &config.redis_url,
            &config.queue_prefix,
            config.lease_timeout(),
        )
        .await?;
        let progress = RedisProgressChannel::connect(&config.redis_url).await?;
        let cache: Arc<dyn KeyValueCache> = Arc::new(RedisCache::connect(&config.redis_url).await?);

        tracing::info!(base_url = %config.nominatim_base_url, "Initializing place lookup");
        let places: Arc<dyn PlaceLookup> = Arc::new(NominatimClient::new(
            &config.nominatim_base_url,
            Arc::clone(&cache),
        )?);

        let pagespeed = match config.pagespeed_key() {
            Some(key) => Some(
                PageSpeedClient::new(key, Arc::clone(&cache))
                    .map_err(|e| BootstrapError::Analysis(AnalysisError::Http(e)))?,
            ),
            None => {
                tracing::warn!("PAGESPEED_API_KEY not set, Core Web Vitals will be skipped");
                None
            }
        };
        let analyzer = LiveAnalyzer::new(Arc::clone(&places), pagespeed)?;

        let backends = Backends {
            store: Arc::new(PgResultStore::new(pool)),
            queue: Arc::new(queue),
            progress: Arc::new(progress),
            cache,
            places,
            analyzer: Arc::new(analyzer),
        };
        Ok(Self::new(backends, PipelineSettings::from(config)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Queue: {0}")]
    Queue(#[from] QueueError),

    #[error("Progress channel: {0}")]
    Progress(#[from] ProgressError),

    #[error("Cache: {0}")]
    Cache(#[from] CacheError),

    #[error("Place lookup: {0}")]
    Places(#[from] PlacesError),

    #[error("Analyzer: {0}")]
    Analysis(#[from] AnalysisError),
}
