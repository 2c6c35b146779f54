use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OpeningHours {
    #[serde(default)]
    pub weekday_text: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_now: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub photo_reference: String,
    pub height: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub author_name: String,
    pub rating: f64,
    pub text: String,
    /// Unix seconds.
    pub time: i64,
}

/// Business profile data shared by every analysis. Denormalized into each queued job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceDetails {
    pub place_id: String,
    pub name: String,
    pub formatted_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub location: LatLng,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<OpeningHours>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

impl PlaceDetails {
    pub fn weekday_hours(&self) -> &[String] {
        self.opening_hours
            .as_ref()
            .map(|h| h.weekday_text.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_type(&self, kind: &str) -> bool {
        self.types.iter().any(|t| t == kind)
    }
}

/// A place returned by a radius search around a business.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NearbyPlace {
    pub place_id: String,
    pub name: String,
    pub vicinity: String,
    pub location: LatLng,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub types: Vec<String>,
}

impl NearbyPlace {
    /// Prominence heuristic used as a local-ranking proxy.
    pub fn prominence(&self, distance_miles: f64) -> f64 {
        let rating = self.rating.unwrap_or(0.0);
        let reviews = f64::from(self.user_ratings_total.unwrap_or(0));
        rating * reviews / (distance_miles + 0.5).powi(2)
    }
}

/// Free-text place search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceSummary {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lon: f64,
    pub types: Vec<String>,
}

const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Great-circle distance in miles.
pub fn distance_miles(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_MILES * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero_for_same_point() {
        let p = LatLng { lat: 30.27, lng: -97.74 };
        assert!(distance_miles(p, p).abs() < 1e-9);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = LatLng { lat: 30.0, lng: -97.0 };
        let b = LatLng { lat: 31.0, lng: -97.0 };
        let d = distance_miles(a, b);
        assert!((d - 69.1).abs() < 0.2, "got {d}");
    }

    #[test]
    fn test_prominence_without_reviews_is_zero() {
        let place = NearbyPlace {
            place_id: "p".into(),
            name: "Corner Mart".into(),
            vicinity: "Main St".into(),
            location: LatLng { lat: 0.0, lng: 0.0 },
            rating: Some(4.5),
            user_ratings_total: None,
            types: vec![],
        };
        assert_eq!(place.prominence(1.0), 0.0);
    }
}
