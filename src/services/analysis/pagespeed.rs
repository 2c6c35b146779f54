//! Google PageSpeed Insights client and Core Web Vitals scoring.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::analysis::PageSpeedResult;
use crate::services::cache::{cached_json, store_json, KeyValueCache};

const DEFAULT_API_URL: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct PageSpeedResponse {
    #[serde(rename = "lighthouseResult")]
    lighthouse: LighthouseResult,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    categories: Categories,
    #[serde(default)]
    audits: HashMap<String, Audit>,
}

#[derive(Debug, Deserialize)]
struct Categories {
    performance: Category,
}

#[derive(Debug, Deserialize)]
struct Category {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Audit {
    #[serde(rename = "numericValue")]
    numeric_value: Option<f64>,
}

impl LighthouseResult {
    fn metric(&self, audit: &str) -> f64 {
        self.audits
            .get(audit)
            .and_then(|a| a.numeric_value)
            .unwrap_or(0.0)
    }

    fn into_result(self) -> PageSpeedResult {
        PageSpeedResult {
            performance_score: (self.categories.performance.score.unwrap_or(0.0) * 100.0).round()
                as u32,
            lcp: self.metric("largest-contentful-paint"),
            fid: self.metric("max-potential-fid"),
            cls: self.metric("cumulative-layout-shift"),
            fetch_success: true,
        }
    }
}

pub struct PageSpeedClient {
    http: Client,
    api_url: String,
    api_key: String,
    cache: Arc<dyn KeyValueCache>,
}

impl PageSpeedClient {
    pub fn new(api_key: String, cache: Arc<dyn KeyValueCache>) -> Result<Self, reqwest::Error> {
        Self::with_api_url(DEFAULT_API_URL, api_key, cache)
    }

    pub fn with_api_url(
        api_url: &str,
        api_key: String,
        cache: Arc<dyn KeyValueCache>,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_key,
            cache,
        })
    }

    /// Mobile performance audit of `url`.
    ///
    /// Never fails: an unreachable or broken audit yields a result with
    /// `fetch_success = false`, which scores zero.
    pub async fn analyze(&self, url: &str) -> PageSpeedResult {
        let cache_key = format!("pagespeed:{url}");
        if let Some(hit) = cached_json(self.cache.as_ref(), &cache_key).await {
            return hit;
        }

        match self.run_audit(url).await {
            Ok(result) => {
                store_json(self.cache.as_ref(), &cache_key, &result, CACHE_TTL).await;
                result
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "PageSpeed audit failed");
                failed_audit()
            }
        }
    }

    async fn run_audit(&self, url: &str) -> Result<PageSpeedResult, reqwest::Error> {
        let params = [
            ("url", url),
            ("key", self.api_key.as_str()),
            ("strategy", "mobile"),
            ("category", "performance"),
        ];

        let response: PageSpeedResponse = self
            .http
            .get(&self.api_url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.lighthouse.into_result())
    }
}

fn failed_audit() -> PageSpeedResult {
    PageSpeedResult {
        performance_score: 0,
        lcp: 0.0,
        fid: 0.0,
        cls: 0.0,
        fetch_success: false,
    }
}

/// Core Web Vitals points, out of 40.
pub fn score_core_web_vitals(result: &PageSpeedResult) -> u32 {
    if !result.fetch_success {
        return 0;
    }

    let lcp = if result.lcp < 2500.0 {
        15
    } else if result.lcp < 4000.0 {
        10
    } else {
        0
    };
    let fid = if result.fid < 100.0 {
        10
    } else if result.fid < 300.0 {
        5
    } else {
        0
    };
    let cls = if result.cls < 0.1 {
        10
    } else if result.cls < 0.25 {
        5
    } else {
        0
    };
    let performance = match result.performance_score {
        91.. => 5,
        50..=90 => 3,
        _ => 0,
    };

    lcp + fid + cls + performance
}
