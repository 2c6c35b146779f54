//! Typed results produced by the analysis adapters.
//!
//! Stored as JSON on the job record; the report synthesizer decodes them back.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThemeBreakdown {
    pub theme: String,
    pub score: u32,
    pub max_score: u32,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchVisibilityResult {
    pub score: u32,
    pub keyword_score: u32,
    pub map_pack_score: u32,
    #[serde(default)]
    pub breakdown: Vec<ThemeBreakdown>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageSpeedResult {
    pub performance_score: u32,
    /// Largest contentful paint, milliseconds.
    pub lcp: f64,
    /// Max potential first input delay, milliseconds.
    pub fid: f64,
    pub cls: f64,
    pub fetch_success: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct WebsiteDetails {
    pub has_hours: bool,
    pub has_phone: bool,
    pub has_address: bool,
    pub has_services: bool,
    pub has_promotions: bool,
    pub has_schema: bool,
    pub has_opening_hours_schema: bool,
    pub has_mobile_viewport: bool,
    pub has_directions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebsiteExperienceResult {
    pub score: u32,
    pub core_web_vitals_score: u32,
    pub essential_info_score: u32,
    pub schema_score: u32,
    pub mobile_score: u32,
    pub conversion_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_speed: Option<PageSpeedResult>,
    pub has_website: bool,
    pub details: WebsiteDetails,
}

impl WebsiteExperienceResult {
    pub fn unavailable() -> Self {
        Self {
            score: 0,
            core_web_vitals_score: 0,
            essential_info_score: 0,
            schema_score: 0,
            mobile_score: 0,
            conversion_score: 0,
            page_speed: None,
            has_website: false,
            details: WebsiteDetails::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ListingDetails {
    pub has_basic_info: bool,
    pub has_complete_hours: bool,
    pub has_website: bool,
    pub has_category: bool,
    pub photo_count: u32,
    pub attribute_count: u32,
    pub review_count: u32,
    pub average_rating: f64,
    pub has_recent_review: bool,
    pub response_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalListingsResult {
    pub score: u32,
    pub profile_completeness_score: u32,
    pub nap_consistency_score: u32,
    pub reviews_score: u32,
    pub details: ListingDetails,
}

/// Scores of the three independent dimensions; input to benchmarking and synthesis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DimensionScores {
    pub search: u32,
    pub website: u32,
    pub listings: u32,
}

impl DimensionScores {
    /// Weighted overall score: search 40%, website 35%, listings 25%.
    pub fn overall(&self) -> u32 {
        let weighted = f64::from(self.search) * 0.40
            + f64::from(self.website) * 0.35
            + f64::from(self.listings) * 0.25;
        weighted.round() as u32
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompetitorScores {
    pub overall: u32,
    pub search: u32,
    pub website: u32,
    pub listings: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompetitorData {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub distance: f64,
    pub scores: CompetitorScores,
    pub advantages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_weighting() {
        let scores = DimensionScores {
            search: 50,
            website: 40,
            listings: 60,
        };
        assert_eq!(scores.overall(), 49);
    }

    #[test]
    fn test_overall_bounds() {
        let zero = DimensionScores { search: 0, website: 0, listings: 0 };
        let full = DimensionScores { search: 100, website: 100, listings: 100 };
        assert_eq!(zero.overall(), 0);
        assert_eq!(full.overall(), 100);
    }
}
