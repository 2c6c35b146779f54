//! Search visibility: keyword-theme coverage and map-pack presence, estimated
//! from the business's prominence rank among nearby competitors.

use std::cmp::Ordering;

use crate::models::analysis::{SearchVisibilityResult, ThemeBreakdown};
use crate::models::place::{distance_miles, NearbyPlace, PlaceDetails};

/// Rank assumed when the business is absent from the nearby results.
pub const UNRANKED: u32 = 20;

struct KeywordTheme {
    name: &'static str,
    keyword: &'static str,
    max_points: u32,
    applies: fn(&PlaceDetails) -> bool,
}

const THEMES: [KeywordTheme; 4] = [
    KeywordTheme {
        name: "core_convenience",
        keyword: "convenience store near me",
        max_points: 20,
        applies: |_| true,
    },
    KeywordTheme {
        name: "24_hour",
        keyword: "24 hour store near me",
        max_points: 10,
        applies: advertises_24_hours,
    },
    KeywordTheme {
        name: "gas_station",
        keyword: "gas station near me",
        max_points: 10,
        applies: |place| place.has_type("gas_station"),
    },
    KeywordTheme {
        name: "atm",
        keyword: "ATM near me",
        max_points: 5,
        applies: |_| true,
    },
];

fn advertises_24_hours(place: &PlaceDetails) -> bool {
    place
        .weekday_hours()
        .iter()
        .any(|h| h.contains("24 hours") || h.contains("Open 24"))
}

/// 1-based position of `place` among `nearby`, ordered by prominence.
///
/// Equal prominence is broken by distance, nearest first.
pub fn local_ranking(place: &PlaceDetails, nearby: &[NearbyPlace]) -> u32 {
    let mut ranked: Vec<(&NearbyPlace, f64, f64)> = nearby
        .iter()
        .map(|p| {
            let distance = distance_miles(place.location, p.location);
            (p, p.prominence(distance), distance)
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
    });

    ranked
        .iter()
        .position(|(p, _, _)| p.place_id == place.place_id)
        .map(|i| i as u32 + 1)
        .unwrap_or(UNRANKED)
}

fn theme_points(max_points: u32, ranking: u32) -> u32 {
    match ranking {
        0..=3 => max_points,
        4..=10 => (f64::from(max_points) * 0.6).round() as u32,
        11..=20 => (f64::from(max_points) * 0.3).round() as u32,
        _ => 0,
    }
}

pub fn score_search_visibility(place: &PlaceDetails, ranking: u32) -> SearchVisibilityResult {
    let breakdown: Vec<ThemeBreakdown> = THEMES
        .iter()
        .filter(|theme| (theme.applies)(place))
        .map(|theme| ThemeBreakdown {
            theme: theme.name.to_string(),
            score: theme_points(theme.max_points, ranking),
            max_score: theme.max_points,
            details: format!("Ranked #{ranking} for \"{}\"", theme.keyword),
            ranking: Some(ranking),
        })
        .collect();

    let keyword_score: u32 = breakdown.iter().map(|b| b.score).sum();
    let map_pack_score = match ranking {
        0..=3 => 40,
        4..=10 => 20,
        _ => 0,
    };

    SearchVisibilityResult {
        score: (keyword_score + map_pack_score).min(100),
        keyword_score,
        map_pack_score,
        breakdown,
    }
}
