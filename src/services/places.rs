//! Place lookup over the OpenStreetMap Nominatim API.
//!
//! Responses are memoized in the shared cache, and requests are spaced to honour
//! Nominatim's one-request-per-second usage policy.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::models::place::{LatLng, NearbyPlace, OpeningHours, PlaceDetails, PlaceSummary};
use crate::services::cache::{cached_json, store_json, KeyValueCache};

const USER_AGENT: &str = "PresenceGrader/0.1";
const DETAILS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const SEARCH_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const NEARBY_TTL: Duration = Duration::from_secs(12 * 60 * 60);
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);
const METERS_PER_DEGREE: f64 = 111_320.0;

const WEEKDAYS: [(&str, &str); 7] = [
    ("Mo", "Monday"),
    ("Tu", "Tuesday"),
    ("We", "Wednesday"),
    ("Th", "Thursday"),
    ("Fr", "Friday"),
    ("Sa", "Saturday"),
    ("Su", "Sunday"),
];

/// Source of business profiles and their surroundings.
#[async_trait]
pub trait PlaceLookup: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<PlaceSummary>, PlacesError>;

    /// Full profile for a place picked from search results; `None` if unknown.
    async fn details(
        &self,
        place_id: &str,
        lat: f64,
        lon: f64,
    ) -> Result<Option<PlaceDetails>, PlacesError>;

    /// Comparable businesses within `radius_m` meters.
    async fn nearby(&self, center: LatLng, radius_m: f64) -> Result<Vec<NearbyPlace>, PlacesError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    place_id: u64,
    #[serde(default)]
    name: Option<String>,
    display_name: String,
    lat: String,
    lon: String,
    #[serde(default)]
    class: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    extratags: Option<HashMap<String, String>>,
}

impl NominatimPlace {
    fn location(&self) -> Result<LatLng, PlacesError> {
        let lat = self
            .lat
            .parse()
            .map_err(|_| PlacesError::Parse(format!("latitude {}", self.lat)))?;
        let lng = self
            .lon
            .parse()
            .map_err(|_| PlacesError::Parse(format!("longitude {}", self.lon)))?;
        Ok(LatLng { lat, lng })
    }

    fn short_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| {
                self.display_name
                    .split(',')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            })
    }

    fn tag(&self, keys: &[&str]) -> Option<String> {
        let tags = self.extratags.as_ref()?;
        keys.iter().find_map(|k| tags.get(*k).cloned())
    }

    fn types(&self) -> Vec<String> {
        let mut types = vec!["convenience_store".to_string()];
        if self.kind.as_deref() == Some("fuel") {
            types.push("gas_station".to_string());
        }
        types
    }

    fn is_store(&self) -> bool {
        self.class.as_deref() == Some("shop")
            || matches!(self.kind.as_deref(), Some("fuel") | Some("convenience"))
    }
}

/// Nominatim HTTP client.
pub struct NominatimClient {
    http: Client,
    base_url: String,
    cache: Arc<dyn KeyValueCache>,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimClient {
    pub fn new(base_url: &str, cache: Arc<dyn KeyValueCache>) -> Result<Self, PlacesError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
            last_request: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + MIN_REQUEST_INTERVAL;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, PlacesError> {
        self.throttle().await;
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PlaceLookup for NominatimClient {
    async fn search(&self, query: &str) -> Result<Vec<PlaceSummary>, PlacesError> {
        let cache_key = format!("nominatim:search:{}", query.to_lowercase());
        if let Some(hit) = cached_json(self.cache.as_ref(), &cache_key).await {
            return Ok(hit);
        }

        let body = self
            .get_json(
                "search",
                &[
                    ("q", format!("{query} convenience store")),
                    ("format", "json".to_string()),
                    ("addressdetails", "1".to_string()),
                    ("limit", "10".to_string()),
                ],
            )
            .await?;
        let places: Vec<NominatimPlace> = serde_json::from_value(body)?;

        let mut results = Vec::new();
        for place in places.iter().filter(|p| p.is_store()) {
            let location = place.location()?;
            results.push(PlaceSummary {
                place_id: format!("osm_{}", place.place_id),
                name: place.short_name(),
                address: place.display_name.clone(),
                lat: location.lat,
                lon: location.lng,
                types: place.types(),
            });
        }

        store_json(self.cache.as_ref(), &cache_key, &results, SEARCH_TTL).await;
        Ok(results)
    }

    async fn details(
        &self,
        place_id: &str,
        lat: f64,
        lon: f64,
    ) -> Result<Option<PlaceDetails>, PlacesError> {
        let cache_key = format!("nominatim:details:{place_id}");
        if let Some(hit) = cached_json(self.cache.as_ref(), &cache_key).await {
            return Ok(Some(hit));
        }

        let body = self
            .get_json(
                "reverse",
                &[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("format", "json".to_string()),
                    ("addressdetails", "1".to_string()),
                    ("extratags", "1".to_string()),
                    ("zoom", "18".to_string()),
                ],
            )
            .await?;
        if body.get("error").is_some() {
            return Ok(None);
        }
        let place: NominatimPlace = serde_json::from_value(body)?;

        let details = PlaceDetails {
            place_id: place_id.to_string(),
            name: place.short_name(),
            formatted_address: place.display_name.clone(),
            formatted_phone_number: place.tag(&["phone", "contact:phone"]),
            website: place.tag(&["website", "contact:website", "url"]),
            location: place.location()?,
            types: place.types(),
            opening_hours: place.tag(&["opening_hours"]).map(|raw| OpeningHours {
                weekday_text: expand_osm_hours(&raw),
                open_now: None,
            }),
            photos: Vec::new(),
            rating: None,
            user_ratings_total: None,
            reviews: Vec::new(),
        };

        store_json(self.cache.as_ref(), &cache_key, &details, DETAILS_TTL).await;
        Ok(Some(details))
    }

    async fn nearby(&self, center: LatLng, radius_m: f64) -> Result<Vec<NearbyPlace>, PlacesError> {
        let cache_key = format!(
            "nominatim:nearby:{:.4},{:.4},{}",
            center.lat, center.lng, radius_m as u64
        );
        if let Some(hit) = cached_json(self.cache.as_ref(), &cache_key).await {
            return Ok(hit);
        }

        let delta = radius_m / METERS_PER_DEGREE;
        let viewbox = format!(
            "{},{},{},{}",
            center.lng - delta,
            center.lat - delta,
            center.lng + delta,
            center.lat + delta
        );
        let body = self
            .get_json(
                "search",
                &[
                    ("q", "convenience store".to_string()),
                    ("format", "json".to_string()),
                    ("bounded", "1".to_string()),
                    ("viewbox", viewbox),
                    ("limit", "20".to_string()),
                ],
            )
            .await?;
        let places: Vec<NominatimPlace> = serde_json::from_value(body)?;

        let mut results = Vec::with_capacity(places.len());
        for place in &places {
            results.push(NearbyPlace {
                place_id: format!("osm_{}", place.place_id),
                name: place.short_name(),
                vicinity: place.display_name.clone(),
                location: place.location()?,
                rating: None,
                user_ratings_total: None,
                types: place.types(),
            });
        }

        store_json(self.cache.as_ref(), &cache_key, &results, NEARBY_TTL).await;
        Ok(results)
    }
}

/// Expand an OSM `opening_hours` value into one "Day: hours" line per covered day.
///
/// Handles `24/7`, day ranges (`Mo-Fr`), day lists (`Sa,Su`) and rules without a
/// day selector (every day). Later rules override earlier ones for the same day.
pub fn expand_osm_hours(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw == "24/7" {
        return WEEKDAYS
            .iter()
            .map(|(_, day)| format!("{day}: Open 24 hours"))
            .collect();
    }

    let mut by_day: BTreeMap<usize, String> = BTreeMap::new();
    for rule in raw.split(';').map(str::trim).filter(|r| !r.is_empty()) {
        let (days, times) = match rule.split_once(' ') {
            Some((selector, times)) => match parse_day_selector(selector) {
                Some(days) => (days, times.trim()),
                None => ((0..7).collect(), rule),
            },
            None => match parse_day_selector(rule) {
                Some(days) => (days, "open"),
                None => ((0..7).collect(), rule),
            },
        };
        let times = if times == "00:00-24:00" {
            "Open 24 hours"
        } else {
            times
        };
        for day in days {
            by_day.insert(day, times.to_string());
        }
    }

    by_day
        .into_iter()
        .map(|(day, times)| format!("{}: {}", WEEKDAYS[day].1, times))
        .collect()
}

fn day_index(abbrev: &str) -> Option<usize> {
    WEEKDAYS.iter().position(|(short, _)| *short == abbrev)
}

fn parse_day_selector(selector: &str) -> Option<Vec<usize>> {
    let mut days = Vec::new();
    for part in selector.split(',') {
        match part.split_once('-') {
            Some((from, to)) => {
                let (from, to) = (day_index(from)?, day_index(to)?);
                let mut day = from;
                loop {
                    days.push(day);
                    if day == to {
                        break;
                    }
                    day = (day + 1) % 7;
                }
            }
            None => days.push(day_index(part)?),
        }
    }
    Some(days)
}

#[derive(Debug, thiserror::Error)]
pub enum PlacesError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode place data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid place data: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_always_open() {
        let hours = expand_osm_hours("24/7");
        assert_eq!(hours.len(), 7);
        assert!(hours.iter().all(|h| h.contains("Open 24")));
    }

    #[test]
    fn test_expand_ranges_and_lists() {
        let hours = expand_osm_hours("Mo-Fr 06:00-22:00; Sa,Su 07:00-21:00");
        assert_eq!(hours.len(), 7);
        assert_eq!(hours[0], "Monday: 06:00-22:00");
        assert_eq!(hours[6], "Sunday: 07:00-21:00");
    }

    #[test]
    fn test_expand_wrapping_range_and_override() {
        let hours = expand_osm_hours("Fr-Mo 08:00-20:00; Mo off");
        assert_eq!(
            hours,
            vec![
                "Monday: off".to_string(),
                "Friday: 08:00-20:00".to_string(),
                "Saturday: 08:00-20:00".to_string(),
                "Sunday: 08:00-20:00".to_string(),
            ]
        );
    }

    #[test]
    fn test_expand_rule_without_days_covers_week() {
        let hours = expand_osm_hours("00:00-24:00");
        assert_eq!(hours.len(), 7);
        assert_eq!(hours[3], "Thursday: Open 24 hours");
    }

    #[test]
    fn test_short_name_falls_back_to_display_name() {
        let place = NominatimPlace {
            place_id: 1,
            name: None,
            display_name: "Quick Mart, 12 Main St, Austin".into(),
            lat: "30.0".into(),
            lon: "-97.0".into(),
            class: Some("shop".into()),
            kind: Some("convenience".into()),
            extratags: None,
        };
        assert_eq!(place.short_name(), "Quick Mart");
        assert!(place.is_store());
    }
}
