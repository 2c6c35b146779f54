//! Report synthesis: overall score, prioritized problems and revenue projection.
//!
//! Scoring is pure ([`build_report`]); [`ReportSynthesizer`] persists the result
//! exactly once per scan and closes the scan out.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{ResultStore, StoreError};
use crate::models::analysis::{
    CompetitorData, DimensionScores, LocalListingsResult, SearchVisibilityResult,
    WebsiteExperienceResult,
};
use crate::models::progress::{ProgressEvent, ProgressStage};
use crate::models::report::{
    Complexity, ImpactArea, Problem, Report, RevenueAssumptions, RevenueEstimate, Severity,
};
use crate::models::scan::ScanStatus;
use crate::services::progress::{publish_lossy, ProgressChannel};

const LOCAL_SEARCH_VOLUME: u32 = 2800;
const AVG_TRANSACTION: f64 = 12.0;
const ONLINE_TO_OFFLINE_RATE: f64 = 0.2;
const GROSS_MARGIN: f64 = 0.3;
const TARGET_SEARCH_GAIN: u32 = 20;
const TARGET_SEARCH_CEILING: u32 = 95;

/// The four completed analyses for one scan.
#[derive(Debug, Clone)]
pub struct SynthesisInputs {
    pub search: SearchVisibilityResult,
    pub website: WebsiteExperienceResult,
    pub listings: LocalListingsResult,
    pub competitors: Vec<CompetitorData>,
}

impl SynthesisInputs {
    pub fn scores(&self) -> DimensionScores {
        DimensionScores {
            search: self.search.score,
            website: self.website.score,
            listings: self.listings.score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Written { report_id: Uuid },
    AlreadyExists,
}

/// Writes the report for a scan once, then marks the scan completed.
pub struct ReportSynthesizer {
    store: Arc<dyn ResultStore>,
    progress: Arc<dyn ProgressChannel>,
}

impl ReportSynthesizer {
    pub fn new(store: Arc<dyn ResultStore>, progress: Arc<dyn ProgressChannel>) -> Self {
        Self { store, progress }
    }

    /// Safe to call repeatedly: a second call finds the existing report and
    /// only re-asserts the scan's `completed` status.
    pub async fn synthesize(
        &self,
        session_id: &str,
        inputs: &SynthesisInputs,
    ) -> Result<SynthesisOutcome, StoreError> {
        let scan = self
            .store
            .get_scan(session_id)
            .await?
            .ok_or_else(|| StoreError::ScanNotFound(session_id.to_string()))?;

        if self.store.get_report(session_id).await?.is_some() {
            tracing::info!(session_id, "Report already exists, skipping synthesis");
            self.store
                .set_scan_status(session_id, ScanStatus::Completed)
                .await?;
            return Ok(SynthesisOutcome::AlreadyExists);
        }

        publish_lossy(
            self.progress.as_ref(),
            session_id,
            ProgressEvent::new(ProgressStage::Report, 90, "Generating your report..."),
        )
        .await;

        let report = build_report(scan.id, inputs);
        let inserted = self.store.insert_report(&report).await?;
        self.store
            .set_scan_status(session_id, ScanStatus::Completed)
            .await?;

        if !inserted {
            tracing::info!(session_id, "Concurrent synthesis won the report insert");
            return Ok(SynthesisOutcome::AlreadyExists);
        }

        metrics::counter!("scan_reports_generated_total").increment(1);
        tracing::info!(
            session_id,
            overall_score = report.overall_score,
            problems = report.problems.len(),
            "Final report generated"
        );

        publish_lossy(
            self.progress.as_ref(),
            session_id,
            ProgressEvent::new(ProgressStage::Complete, 100, "Report ready!"),
        )
        .await;

        Ok(SynthesisOutcome::Written {
            report_id: report.id,
        })
    }
}

/// Assemble the report for `scan_id` from the four analyses.
pub fn build_report(scan_id: Uuid, inputs: &SynthesisInputs) -> Report {
    let scores = inputs.scores();
    let target_search = (scores.search + TARGET_SEARCH_GAIN).min(TARGET_SEARCH_CEILING);

    Report {
        id: Uuid::new_v4(),
        scan_id,
        overall_score: scores.overall(),
        search_visibility_score: scores.search,
        website_experience_score: scores.website,
        local_listings_score: scores.listings,
        raw_data: serde_json::json!({
            "search": inputs.search,
            "website": inputs.website,
            "listings": inputs.listings,
        }),
        problems: detect_problems(&inputs.search, &inputs.website, &inputs.listings),
        competitors: inputs.competitors.clone(),
        revenue_estimate: estimate_revenue(
            scores.search,
            target_search,
            inputs.listings.details.review_count,
        ),
        generated_at: Utc::now(),
    }
}

struct Rule {
    id: &'static str,
    severity: Severity,
    impact_area: ImpactArea,
    impact_score: i32,
    complexity: Complexity,
    estimated_time: &'static str,
    explanation: &'static str,
    fix: &'static str,
}

impl Rule {
    fn problem(&self, title: String) -> Problem {
        Problem {
            id: self.id.to_string(),
            severity: self.severity,
            title,
            impact_area: self.impact_area,
            impact_score: self.impact_score,
            explanation: self.explanation.to_string(),
            fix: self.fix.to_string(),
            complexity: self.complexity,
            estimated_time: self.estimated_time.to_string(),
            priority_rank: 0,
        }
    }
}

const NO_WEBSITE: Rule = Rule {
    id: "no_website",
    severity: Severity::Critical,
    impact_area: ImpactArea::Website,
    impact_score: -35,
    complexity: Complexity::Moderate,
    estimated_time: "1-2 weeks",
    explanation: "Your business doesn't have a website or it's unreachable. 77% of customers research online before visiting.",
    fix: "Create a simple website with your hours, location, services, and contact info. Use a template like Wix, Squarespace, or WordPress.",
};

const SLOW_MOBILE_LOAD: Rule = Rule {
    id: "slow_mobile_load",
    severity: Severity::Critical,
    impact_area: ImpactArea::Website,
    impact_score: -15,
    complexity: Complexity::Moderate,
    estimated_time: "1-2 days with developer help",
    explanation: "Your website loads slower than Google's 2.5s recommendation on mobile. Slow sites lose 53% of mobile visitors.",
    fix: "Compress images, enable browser caching, and minify CSS/JS. Consider using a CDN.",
};

const MISSING_HOURS: Rule = Rule {
    id: "missing_hours",
    severity: Severity::High,
    impact_area: ImpactArea::Listings,
    impact_score: -10,
    complexity: Complexity::Quick,
    estimated_time: "2 minutes",
    explanation: "Google hides stores with incomplete hours from some searches. Customers can't tell if you're open.",
    fix: "Add all 7 days of hours in Google Business Profile at google.com/business",
};

const LOW_REVIEWS: Rule = Rule {
    id: "low_reviews",
    severity: Severity::High,
    impact_area: ImpactArea::Listings,
    impact_score: -8,
    complexity: Complexity::Moderate,
    estimated_time: "Ongoing (target 5 reviews/month)",
    explanation: "88% of customers trust online reviews as much as personal recommendations. Low review count = less trust.",
    fix: "Ask happy customers for reviews. Create review request cards with QR codes. Send follow-up emails/SMS to customers.",
};

const POOR_24HOUR_RANKING: Rule = Rule {
    id: "poor_24hour_ranking",
    severity: Severity::High,
    impact_area: ImpactArea::Search,
    impact_score: -6,
    complexity: Complexity::Quick,
    estimated_time: "30 minutes",
    explanation: "\"24 hour\" searches peak at 11 PM-4 AM (late-night customers). You're missing 200+ monthly searches.",
    fix: "Add \"24/7\" and \"Open 24 Hours\" to Google Business description. Create website page about 24-hour service.",
};

const NO_PHONE_WEBSITE: Rule = Rule {
    id: "no_phone_website",
    severity: Severity::High,
    impact_area: ImpactArea::Website,
    impact_score: -6,
    complexity: Complexity::Quick,
    estimated_time: "5 minutes",
    explanation: "Customers can't easily call you. 70% of mobile searches lead to a phone call within an hour.",
    fix: "Add a click-to-call link: <a href=\"tel:+15125550100\">Call Us</a>",
};

const MISSING_AMENITY_INFO: Rule = Rule {
    id: "missing_amenity_info",
    severity: Severity::Medium,
    impact_area: ImpactArea::Website,
    impact_score: -5,
    complexity: Complexity::Quick,
    estimated_time: "20 minutes",
    explanation: "Customers searching \"convenience store with ATM\" won't know you have one.",
    fix: "Add a \"Services & Amenities\" section listing: ATM, hot food, lottery, propane, etc.",
};

const FEW_PHOTOS: Rule = Rule {
    id: "few_photos",
    severity: Severity::Medium,
    impact_area: ImpactArea::Listings,
    impact_score: -5,
    complexity: Complexity::Quick,
    estimated_time: "30 minutes",
    explanation: "Fresh photos signal active business. Stores with 15+ photos get 35% more clicks.",
    fix: "Upload 10+ photos: exterior, interior, products, services. Update monthly.",
};

const NO_SCHEMA_MARKUP: Rule = Rule {
    id: "no_schema_markup",
    severity: Severity::Medium,
    impact_area: ImpactArea::Website,
    impact_score: -10,
    complexity: Complexity::Easy,
    estimated_time: "15 minutes with developer",
    explanation: "Google can't understand your business type, hours, or location from your website.",
    fix: "Add LocalBusiness schema markup (JSON-LD) to your website. Use Google's Structured Data Markup Helper.",
};

const NO_PROMOTIONS: Rule = Rule {
    id: "no_promotions",
    severity: Severity::Low,
    impact_area: ImpactArea::Website,
    impact_score: -2,
    complexity: Complexity::Quick,
    estimated_time: "10 minutes/week",
    explanation: "Competitors show \"Gas 10¢ off\" or weekly deals. You're missing traffic-driving opportunities.",
    fix: "Add a \"Weekly Deals\" section. Update weekly with current promotions.",
};

const LOW_RATING: Rule = Rule {
    id: "low_rating",
    severity: Severity::High,
    impact_area: ImpactArea::Listings,
    impact_score: -10,
    complexity: Complexity::Hard,
    estimated_time: "Ongoing (3-6 months to improve)",
    explanation: "Customers avoid businesses with ratings below 4.0. Your rating is hurting conversions.",
    fix: "Respond to negative reviews professionally. Improve service quality. Encourage satisfied customers to leave reviews to balance negatives.",
};

/// Evaluate the problem rules and rank the hits, most urgent first.
pub fn detect_problems(
    search: &SearchVisibilityResult,
    website: &WebsiteExperienceResult,
    listings: &LocalListingsResult,
) -> Vec<Problem> {
    let site = &website.details;
    let profile = &listings.details;
    let mut problems = Vec::new();

    if !website.has_website {
        problems.push(NO_WEBSITE.problem("No working website found".into()));
    }
    if let Some(audit) = website.page_speed.filter(|a| a.lcp > 4000.0) {
        let seconds = audit.lcp / 1000.0;
        problems.push(
            SLOW_MOBILE_LOAD.problem(format!("Slow mobile website ({seconds:.1}s load time)")),
        );
    }
    if !profile.has_complete_hours {
        problems.push(MISSING_HOURS.problem(
            "Missing or incomplete store hours on Google Business Profile".into(),
        ));
    }
    if profile.review_count < 10 {
        problems.push(LOW_REVIEWS.problem(format!("Only {} Google reviews", profile.review_count)));
    }
    let twenty_four_hour_rank = search
        .breakdown
        .iter()
        .find(|b| b.theme == "24_hour")
        .and_then(|b| b.ranking)
        .filter(|rank| *rank > 10);
    if let Some(rank) = twenty_four_hour_rank {
        problems.push(POOR_24HOUR_RANKING.problem(format!(
            "Not ranking for \"24 hour store\" keywords (ranked #{rank})"
        )));
    }
    if website.has_website && !site.has_phone {
        problems.push(NO_PHONE_WEBSITE.problem("No phone number on website".into()));
    }
    if website.has_website && !site.has_services {
        problems.push(MISSING_AMENITY_INFO.problem("No amenity information on website".into()));
    }
    if profile.photo_count < 8 {
        problems.push(FEW_PHOTOS.problem(format!(
            "Only {} photos on Google Business Profile",
            profile.photo_count
        )));
    }
    if website.has_website && !site.has_schema {
        problems.push(NO_SCHEMA_MARKUP.problem("Website missing schema markup".into()));
    }
    if website.has_website && !site.has_promotions {
        problems.push(
            NO_PROMOTIONS.problem("No current promotions or deals visible on website".into()),
        );
    }
    if profile.average_rating < 3.5 && profile.review_count > 5 {
        problems.push(LOW_RATING.problem(format!(
            "Low average rating ({} stars)",
            profile.average_rating
        )));
    }

    rank_problems(&mut problems);
    problems
}

fn priority(problem: &Problem) -> f64 {
    problem.severity.weight() * f64::from(problem.impact_score.unsigned_abs())
        / problem.complexity.weight()
}

/// Order by severity-weighted impact per unit of effort; ties keep rule order.
fn rank_problems(problems: &mut [Problem]) {
    problems.sort_by(|a, b| priority(b).total_cmp(&priority(a)));
    for (index, problem) in problems.iter_mut().enumerate() {
        problem.priority_rank = index as u32 + 1;
    }
}

fn visibility_pct(search_score: u32) -> f64 {
    match search_score {
        80.. => 40.0,
        60..=79 => 25.0,
        40..=59 => 10.0,
        _ => 5.0,
    }
}

/// Annual gross-margin uplift from moving search visibility to `target_search`.
pub fn estimate_revenue(
    current_search: u32,
    target_search: u32,
    review_count: u32,
) -> RevenueEstimate {
    let current_visibility_pct = visibility_pct(current_search);
    let target_visibility_pct = visibility_pct(target_search);

    let monthly_margin = |visibility_pct: f64| {
        f64::from(LOCAL_SEARCH_VOLUME) * (visibility_pct / 100.0)
            * ONLINE_TO_OFFLINE_RATE
            * AVG_TRANSACTION
            * GROSS_MARGIN
    };
    let moderate =
        (monthly_margin(target_visibility_pct) - monthly_margin(current_visibility_pct)) * 12.0;
    let review_boost = if review_count < 30 { 1.2 } else { 1.1 };

    RevenueEstimate {
        conservative: ((moderate * 0.8).round() as i64).max(0),
        moderate: moderate.round() as i64,
        optimistic: ((moderate * 1.2 * review_boost).round() as i64).max(0),
        assumptions: RevenueAssumptions {
            local_search_volume: LOCAL_SEARCH_VOLUME,
            avg_transaction: AVG_TRANSACTION,
            current_visibility_pct,
            target_visibility_pct,
            online_to_offline_rate: ONLINE_TO_OFFLINE_RATE,
            margin: GROSS_MARGIN,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryResultStore;
    use crate::db::NewScan;
    use crate::models::analysis::{ListingDetails, PageSpeedResult, ThemeBreakdown, WebsiteDetails};
    use crate::models::scan::ScanOrigin;
    use crate::services::progress::BroadcastProgressChannel;

    fn search(score: u32) -> SearchVisibilityResult {
        SearchVisibilityResult {
            score,
            keyword_score: score,
            map_pack_score: 0,
            breakdown: vec![],
        }
    }

    fn website(score: u32, details: WebsiteDetails) -> WebsiteExperienceResult {
        WebsiteExperienceResult {
            score,
            has_website: true,
            details,
            ..WebsiteExperienceResult::unavailable()
        }
    }

    fn listings(score: u32, details: ListingDetails) -> LocalListingsResult {
        LocalListingsResult {
            score,
            profile_completeness_score: 0,
            nap_consistency_score: 0,
            reviews_score: 0,
            details,
        }
    }

    fn healthy_listing() -> ListingDetails {
        ListingDetails {
            has_complete_hours: true,
            review_count: 80,
            average_rating: 4.6,
            photo_count: 20,
            ..ListingDetails::default()
        }
    }

    fn complete_site() -> WebsiteDetails {
        WebsiteDetails {
            has_phone: true,
            has_services: true,
            has_schema: true,
            has_promotions: true,
            ..WebsiteDetails::default()
        }
    }

    #[test]
    fn test_no_problems_for_healthy_business() {
        let problems = detect_problems(
            &search(90),
            &website(90, complete_site()),
            &listings(90, healthy_listing()),
        );
        assert!(problems.is_empty());
    }

    #[test]
    fn test_problems_ranked_by_priority() {
        let slow = WebsiteExperienceResult {
            page_speed: Some(PageSpeedResult {
                performance_score: 30,
                lcp: 5200.0,
                fid: 400.0,
                cls: 0.3,
                fetch_success: true,
            }),
            ..website(30, WebsiteDetails::default())
        };
        let weak_listing = ListingDetails {
            review_count: 3,
            average_rating: 4.0,
            photo_count: 2,
            ..ListingDetails::default()
        };
        let problems = detect_problems(&search(20), &slow, &listings(20, weak_listing));

        let ids: Vec<&str> = problems.iter().map(|p| p.id.as_str()).collect();
        // missing_hours 30, no_phone 18, slow_mobile 15, amenity 10, few_photos 10,
        // no_schema 10, low_reviews 6, no_promotions 2
        assert_eq!(
            ids,
            vec![
                "missing_hours",
                "no_phone_website",
                "slow_mobile_load",
                "missing_amenity_info",
                "few_photos",
                "no_schema_markup",
                "low_reviews",
                "no_promotions",
            ]
        );
        let ranks: Vec<u32> = problems.iter().map(|p| p.priority_rank).collect();
        assert_eq!(ranks, (1..=8).collect::<Vec<u32>>());
        assert_eq!(problems[2].title, "Slow mobile website (5.2s load time)");
    }

    #[test]
    fn test_missing_website_and_low_rating() {
        let poor = ListingDetails {
            has_complete_hours: true,
            review_count: 40,
            average_rating: 3.1,
            photo_count: 12,
            ..ListingDetails::default()
        };
        let ranked = SearchVisibilityResult {
            breakdown: vec![ThemeBreakdown {
                theme: "24_hour".into(),
                score: 3,
                max_score: 10,
                details: String::new(),
                ranking: Some(14),
            }],
            ..search(10)
        };
        let problems = detect_problems(
            &ranked,
            &WebsiteExperienceResult::unavailable(),
            &listings(40, poor),
        );
        let ids: Vec<&str> = problems.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["no_website", "poor_24hour_ranking", "low_rating"]);
        assert_eq!(problems[2].title, "Low average rating (3.1 stars)");
    }

    #[test]
    fn test_revenue_projection() {
        // 50 -> 10%, target 70 -> 25%; monthly margin 201.6 vs 504, delta 302.4 * 12
        let estimate = estimate_revenue(50, 70, 12);
        assert_eq!(estimate.moderate, 3629);
        assert_eq!(estimate.conservative, 2903);
        assert_eq!(estimate.optimistic, 5225);
        assert_eq!(estimate.assumptions.current_visibility_pct, 10.0);
        assert_eq!(estimate.assumptions.target_visibility_pct, 25.0);
    }

    #[test]
    fn test_revenue_flat_at_ceiling() {
        let estimate = estimate_revenue(90, 95, 100);
        assert_eq!(estimate.moderate, 0);
        assert_eq!(estimate.conservative, 0);
        assert_eq!(estimate.optimistic, 0);
    }

    #[test]
    fn test_build_report_scores() {
        let inputs = SynthesisInputs {
            search: search(50),
            website: website(40, complete_site()),
            listings: listings(60, healthy_listing()),
            competitors: vec![],
        };
        let scan_id = Uuid::new_v4();
        let report = build_report(scan_id, &inputs);
        assert_eq!(report.scan_id, scan_id);
        assert_eq!(report.overall_score, 49);
        assert_eq!(report.search_visibility_score, 50);
        assert_eq!(report.raw_data["website"]["score"], 40);
    }

    #[tokio::test]
    async fn test_synthesize_writes_once() {
        let store = Arc::new(MemoryResultStore::new());
        let progress = Arc::new(BroadcastProgressChannel::default());
        let place = crate::models::place::PlaceDetails {
            place_id: "p1".into(),
            name: "Quick Stop".into(),
            formatted_address: "1 Main St".into(),
            formatted_phone_number: None,
            website: None,
            location: crate::models::place::LatLng { lat: 30.0, lng: -97.0 },
            types: vec![],
            opening_hours: None,
            photos: vec![],
            rating: None,
            user_ratings_total: None,
            reviews: vec![],
        };
        let business_id = store.upsert_business(&place).await.unwrap();
        store
            .create_scan(&NewScan {
                session_id: "sess-1".into(),
                business_id,
                origin: ScanOrigin::default(),
            })
            .await
            .unwrap();

        let synthesizer = ReportSynthesizer::new(store.clone(), progress);
        let inputs = SynthesisInputs {
            search: search(50),
            website: website(40, complete_site()),
            listings: listings(60, healthy_listing()),
            competitors: vec![],
        };

        let first = synthesizer.synthesize("sess-1", &inputs).await.unwrap();
        assert!(matches!(first, SynthesisOutcome::Written { .. }));
        let second = synthesizer.synthesize("sess-1", &inputs).await.unwrap();
        assert_eq!(second, SynthesisOutcome::AlreadyExists);

        assert_eq!(store.report_count().await, 1);
        let scan = store.get_scan("sess-1").await.unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Completed);
    }

    #[tokio::test]
    async fn test_synthesize_unknown_scan() {
        let synthesizer = ReportSynthesizer::new(
            Arc::new(MemoryResultStore::new()),
            Arc::new(BroadcastProgressChannel::default()),
        );
        let inputs = SynthesisInputs {
            search: search(1),
            website: WebsiteExperienceResult::unavailable(),
            listings: listings(1, ListingDetails::default()),
            competitors: vec![],
        };
        let err = synthesizer.synthesize("missing", &inputs).await.unwrap_err();
        assert!(matches!(err, StoreError::ScanNotFound(_)));
    }
}
