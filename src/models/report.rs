use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::analysis::CompetitorData;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn weight(self) -> f64 {
        match self {
            Severity::Critical => 4.0,
            Severity::High => 3.0,
            Severity::Medium => 2.0,
            Severity::Low => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImpactArea {
    Search,
    Website,
    Listings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Quick,
    Easy,
    Moderate,
    Hard,
}

impl Complexity {
    pub fn weight(self) -> f64 {
        match self {
            Complexity::Quick => 1.0,
            Complexity::Easy => 2.0,
            Complexity::Moderate => 4.0,
            Complexity::Hard => 8.0,
        }
    }
}

/// A detected weakness with its fix, ranked by priority (1 = most urgent).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub impact_area: ImpactArea,
    pub impact_score: i32,
    pub explanation: String,
    pub fix: String,
    pub complexity: Complexity,
    pub estimated_time: String,
    pub priority_rank: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RevenueAssumptions {
    pub local_search_volume: u32,
    pub avg_transaction: f64,
    pub current_visibility_pct: f64,
    pub target_visibility_pct: f64,
    pub online_to_offline_rate: f64,
    pub margin: f64,
}

/// Annual gross-margin uplift projection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RevenueEstimate {
    pub conservative: i64,
    pub moderate: i64,
    pub optimistic: i64,
    pub assumptions: RevenueAssumptions,
}

/// Final scored report. Written once per scan and never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub overall_score: u32,
    pub search_visibility_score: u32,
    pub website_experience_score: u32,
    pub local_listings_score: u32,
    pub raw_data: serde_json::Value,
    pub problems: Vec<Problem>,
    pub competitors: Vec<CompetitorData>,
    pub revenue_estimate: RevenueEstimate,
    pub generated_at: DateTime<Utc>,
}
