//! Local listings: profile completeness, NAP consistency and reputation.

use crate::models::analysis::{ListingDetails, LocalListingsResult};
use crate::models::place::PlaceDetails;

const RECENT_REVIEW_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;

/// Score a business profile as of `now` (unix seconds).
pub fn score_local_listings(place: &PlaceDetails, now: i64) -> LocalListingsResult {
    let details = collect_details(place, now);

    let mut profile = 0;
    if details.has_basic_info {
        profile += 15;
    }
    if details.has_complete_hours {
        profile += 10;
    } else if place.opening_hours.is_some() {
        profile += 5;
    }
    if details.has_website {
        profile += 5;
    }
    if details.has_category {
        profile += 5;
    }
    profile += tiered(details.photo_count, [(16, 10), (6, 7), (1, 3)]);
    profile += tiered(details.attribute_count, [(5, 10), (3, 7), (1, 3)]);

    // No cross-directory data: a complete profile is taken as consistent.
    let nap = if details.has_basic_info { 15 } else { 0 };

    let mut reviews = tiered(details.review_count, [(50, 10), (20, 7), (10, 4)]);
    reviews += if details.average_rating >= 4.5 {
        10
    } else if details.average_rating >= 4.0 {
        7
    } else if details.average_rating >= 3.5 {
        4
    } else {
        0
    };
    if details.has_recent_review {
        reviews += 5;
    } else if details.review_count > 0 {
        reviews += 3;
    }
    if details.response_rate >= 0.8 {
        reviews += 5;
    } else if details.response_rate >= 0.5 {
        reviews += 3;
    }

    LocalListingsResult {
        score: (profile + nap + reviews).min(100),
        profile_completeness_score: profile,
        nap_consistency_score: nap,
        reviews_score: reviews,
        details,
    }
}

fn tiered(value: u32, tiers: [(u32, u32); 3]) -> u32 {
    tiers
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(_, points)| *points)
        .unwrap_or(0)
}

fn collect_details(place: &PlaceDetails, now: i64) -> ListingDetails {
    let has_phone = place
        .formatted_phone_number
        .as_deref()
        .is_some_and(|p| !p.is_empty());

    ListingDetails {
        has_basic_info: !place.name.is_empty() && !place.formatted_address.is_empty() && has_phone,
        has_complete_hours: place.weekday_hours().len() >= 7,
        has_website: place.website.as_deref().is_some_and(|w| !w.is_empty()),
        has_category: !place.types.is_empty(),
        photo_count: place.photos.len() as u32,
        attribute_count: estimate_attributes(place),
        review_count: place.user_ratings_total.unwrap_or(0),
        average_rating: place.rating.unwrap_or(0.0),
        has_recent_review: place
            .reviews
            .iter()
            .any(|r| r.time > now - RECENT_REVIEW_WINDOW_SECS),
        // Owner replies are not exposed by the lookup source.
        response_rate: 0.0,
    }
}

fn estimate_attributes(place: &PlaceDetails) -> u32 {
    let mut count = 2;
    if place
        .opening_hours
        .as_ref()
        .is_some_and(|h| h.open_now.is_some())
    {
        count += 1;
    }
    if place.has_type("gas_station") {
        count += 1;
    }
    count.min(5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::place::{LatLng, OpeningHours, Photo, Review};

    const NOW: i64 = 1_790_000_000;

    fn bare_place() -> PlaceDetails {
        PlaceDetails {
            place_id: "p1".into(),
            name: "Quick Stop".into(),
            formatted_address: "1 Main St, Austin, TX".into(),
            formatted_phone_number: None,
            website: None,
            location: LatLng { lat: 30.0, lng: -97.0 },
            types: vec![],
            opening_hours: None,
            photos: vec![],
            rating: None,
            user_ratings_total: None,
            reviews: vec![],
        }
    }

    fn photo() -> Photo {
        Photo {
            photo_reference: "ref".into(),
            height: 100,
            width: 100,
        }
    }

    #[test]
    fn test_bare_profile_gets_attribute_estimate_only() {
        let result = score_local_listings(&bare_place(), NOW);
        assert_eq!(result.details.attribute_count, 2);
        assert_eq!(result.profile_completeness_score, 3);
        assert_eq!(result.nap_consistency_score, 0);
        assert_eq!(result.reviews_score, 0);
        assert_eq!(result.score, 3);
    }

    #[test]
    fn test_complete_profile() {
        let mut place = bare_place();
        place.formatted_phone_number = Some("(512) 555-0100".into());
        place.website = Some("https://quickstop.example".into());
        place.types = vec!["convenience_store".into(), "gas_station".into()];
        place.opening_hours = Some(OpeningHours {
            weekday_text: (0..7).map(|d| format!("Day {d}: Open 24 hours")).collect(),
            open_now: Some(true),
        });
        place.photos = (0..20).map(|_| photo()).collect();
        place.rating = Some(4.6);
        place.user_ratings_total = Some(120);
        place.reviews = vec![Review {
            author_name: "A".into(),
            rating: 5.0,
            text: "Great".into(),
            time: NOW - 3600,
        }];

        let result = score_local_listings(&place, NOW);
        assert_eq!(result.profile_completeness_score, 15 + 10 + 5 + 5 + 10 + 7);
        assert_eq!(result.nap_consistency_score, 15);
        assert_eq!(result.reviews_score, 10 + 10 + 5);
        assert_eq!(result.score, 92);
    }

    #[test]
    fn test_partial_hours_and_stale_reviews() {
        let mut place = bare_place();
        place.opening_hours = Some(OpeningHours {
            weekday_text: vec!["Monday: 6AM-10PM".into()],
            open_now: None,
        });
        place.photos = vec![photo(); 6];
        place.rating = Some(3.7);
        place.user_ratings_total = Some(12);
        place.reviews = vec![Review {
            author_name: "B".into(),
            rating: 3.0,
            text: "Ok".into(),
            time: NOW - 90 * 24 * 60 * 60,
        }];

        let result = score_local_listings(&place, NOW);
        assert!(!result.details.has_recent_review);
        assert_eq!(result.profile_completeness_score, 5 + 7 + 3);
        assert_eq!(result.reviews_score, 4 + 4 + 3);
    }
}
