//! Competitor benchmarking against the most prominent nearby businesses.

use std::cmp::Ordering;

use crate::models::analysis::{
    CompetitorData, CompetitorScores, DimensionScores, LocalListingsResult,
    SearchVisibilityResult, WebsiteExperienceResult,
};
use crate::models::place::{distance_miles, NearbyPlace, PlaceDetails};

const MAX_COMPETITORS: usize = 3;
const MAX_ADVANTAGES: usize = 3;

/// A nearby business selected for benchmarking.
#[derive(Debug, Clone)]
pub struct Rival<'a> {
    pub place: &'a NearbyPlace,
    pub distance: f64,
}

/// Dimension results for one competitor.
#[derive(Debug, Clone)]
pub struct ScoredCompetitor {
    pub search: SearchVisibilityResult,
    pub website: WebsiteExperienceResult,
    pub listings: LocalListingsResult,
}

impl ScoredCompetitor {
    fn dimensions(&self) -> DimensionScores {
        DimensionScores {
            search: self.search.score,
            website: self.website.score,
            listings: self.listings.score,
        }
    }
}

/// The most prominent nearby businesses other than `place`, strongest first.
pub fn top_competitors<'a>(place: &PlaceDetails, nearby: &'a [NearbyPlace]) -> Vec<Rival<'a>> {
    let mut rivals: Vec<(Rival<'a>, f64)> = nearby
        .iter()
        .filter(|p| p.place_id != place.place_id)
        .map(|p| {
            let distance = distance_miles(place.location, p.location);
            (Rival { place: p, distance }, p.prominence(distance))
        })
        .collect();
    rivals.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.distance.partial_cmp(&b.0.distance).unwrap_or(Ordering::Equal))
    });
    rivals
        .into_iter()
        .take(MAX_COMPETITORS)
        .map(|(rival, _)| rival)
        .collect()
}

/// Anonymised benchmark row; `index` is the row's position among those benchmarked.
pub fn benchmark_entry(
    index: usize,
    distance: f64,
    place: &PlaceDetails,
    current: DimensionScores,
    competitor: &ScoredCompetitor,
) -> CompetitorData {
    let dimensions = competitor.dimensions();
    CompetitorData {
        id: competitor_id(index),
        name: None,
        distance,
        scores: CompetitorScores {
            overall: dimensions.overall(),
            search: dimensions.search,
            website: dimensions.website,
            listings: dimensions.listings,
        },
        advantages: advantages(place, current, competitor),
    }
}

fn competitor_id(index: usize) -> String {
    let letter = char::from(b'A' + (index % 26) as u8);
    format!("competitor_{letter}")
}

fn advantages(
    place: &PlaceDetails,
    current: DimensionScores,
    competitor: &ScoredCompetitor,
) -> Vec<String> {
    let own_reviews = place.user_ratings_total.unwrap_or(0);
    let own_photos = place.photos.len() as u32;
    let mut found = Vec::new();

    let their_reviews = competitor.listings.details.review_count;
    if their_reviews > own_reviews + 20 {
        found.push(format!(
            "{their_reviews} Google reviews (you have {own_reviews})"
        ));
    }

    if competitor.search.score > current.search + 10 {
        let top_theme = competitor
            .search
            .breakdown
            .iter()
            .find(|b| b.ranking.is_some_and(|r| r <= 3));
        if let Some(theme) = top_theme {
            found.push(format!(
                "Ranks #{} for \"{}\"",
                theme.ranking.unwrap_or_default(),
                theme.theme
            ));
        }
    }

    if competitor.website.has_website {
        if let Some(audit) = competitor.website.page_speed.filter(|a| a.lcp > 0.0) {
            found.push(format!("Website loads in {:.1}s", audit.lcp / 1000.0));
        }
    }

    let their_photos = competitor.listings.details.photo_count;
    if their_photos > own_photos + 5 {
        found.push(format!("{their_photos} photos on Google"));
    }

    found.truncate(MAX_ADVANTAGES);
    found
}
