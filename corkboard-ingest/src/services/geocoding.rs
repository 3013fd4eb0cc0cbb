//! Address geocoding
//!
//! Resolves a free-text address to coordinates via Mapbox, or via a
//! deterministic stub when no Mapbox credential is configured. Geocoding
//! never gates the publish decision; its failures cost a candidate only
//! its location data.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AddressComponents, GeocodeResult};

const MAPBOX_BASE_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places";
const USER_AGENT: &str = "Corkboard/0.1.0 (https://corkboard.app)";

/// Geocoding stage errors
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// Empty or unusable query, rejected before any provider call
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Provider found nothing for the query
    #[error("No match for address")]
    NoResult,

    /// Transport or decode failure talking to the provider
    #[error("Geocoding provider error: {0}")]
    ProviderError(String),

    #[error("Geocoding request timed out after {0}s")]
    Timeout(u64),
}

/// Geocoding capability
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a free-text address to its best match
    async fn geocode(&self, address: &str) -> Result<GeocodeResult, GeocodeError>;
}

/// Compose the geocoding query from venue address parts
///
/// The venue name is included only when it contains a street-suffix-like
/// token; bare names ("The Blue Room") add noise rather than precision.
/// State rides with its city and is dropped without one. Country is
/// included only when it is not the default. Returns None when no part
/// carries text.
pub fn compose_query(
    venue_name: Option<&str>,
    address_line: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
    postal_code: Option<&str>,
    country: Option<&str>,
) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();

    if let Some(name) = nonempty(venue_name) {
        if has_street_suffix(name) {
            parts.push(name);
        }
    }
    if let Some(line) = nonempty(address_line) {
        parts.push(line);
    }
    if let Some(city) = nonempty(city) {
        parts.push(city);
        if let Some(state) = nonempty(state) {
            parts.push(state);
        }
    }
    if let Some(postal) = nonempty(postal_code) {
        parts.push(postal);
    }
    if let Some(country) = nonempty(country) {
        if !country.eq_ignore_ascii_case("us") && !country.eq_ignore_ascii_case("usa") {
            parts.push(country);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

const STREET_SUFFIXES: [&str; 20] = [
    "st", "street", "ave", "avenue", "rd", "road", "blvd", "boulevard", "dr", "drive", "ln",
    "lane", "way", "pl", "place", "ct", "court", "hwy", "highway", "sq",
];

fn has_street_suffix(text: &str) -> bool {
    text.split_whitespace().any(|token| {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        STREET_SUFFIXES.contains(&token.as_str())
    })
}

/// Geocoder backed by the Mapbox places API
pub struct MapboxGeocoder {
    http_client: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl MapboxGeocoder {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, GeocodeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| GeocodeError::ProviderError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl Geocoder for MapboxGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodeResult, GeocodeError> {
        let query = address.trim();
        if query.is_empty() {
            return Err(GeocodeError::InvalidAddress("empty address".to_string()));
        }

        let url = format!(
            "{}/{}.json?access_token={}&limit=1&types=address,poi",
            MAPBOX_BASE_URL,
            escape_path_segment(query),
            self.api_key
        );

        tracing::debug!(address = query, "Querying Mapbox geocoder");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                GeocodeError::Timeout(self.timeout.as_secs())
            } else {
                GeocodeError::ProviderError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeocodeError::ProviderError(format!(
                "status {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let mapbox: MapboxResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::ProviderError(e.to_string()))?;

        let feature = mapbox.features.into_iter().next().ok_or(GeocodeError::NoResult)?;
        let result = feature_to_result(feature)?;

        tracing::info!(
            address = query,
            latitude = result.latitude,
            longitude = result.longitude,
            confidence = result.confidence,
            "Address geocoded"
        );

        Ok(result)
    }
}

// Mapbox takes the query inside the URL path; reqwest's Url parser
// percent-encodes spaces but treats these four as structural.
fn escape_path_segment(s: &str) -> String {
    s.replace('%', "%25")
        .replace('#', "%23")
        .replace('?', "%3F")
        .replace('/', "%2F")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct MapboxResponse {
    #[serde(default)]
    features: Vec<MapboxFeature>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct MapboxFeature {
    #[serde(default)]
    place_name: Option<String>,
    /// How well the match fits the query, in [0,1]
    #[serde(default)]
    relevance: Option<f64>,
    /// [longitude, latitude]
    center: Vec<f64>,
    #[serde(default)]
    context: Vec<MapboxContext>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct MapboxContext {
    id: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    short_code: Option<String>,
}

fn feature_to_result(feature: MapboxFeature) -> Result<GeocodeResult, GeocodeError> {
    if feature.center.len() < 2 {
        return Err(GeocodeError::ProviderError(
            "feature center is not a [longitude, latitude] pair".to_string(),
        ));
    }

    let mut components = AddressComponents::default();
    for entry in &feature.context {
        // Context ids look like "place.12345", "region.678", ...
        let kind = entry.id.split('.').next().unwrap_or("");
        let text = entry.text.clone();
        match kind {
            "place" => components.city = text,
            "region" => components.state = entry.short_code.clone().or(text),
            "postcode" => components.postal_code = text,
            "country" => components.country = entry.short_code.clone().or(text),
            _ => {}
        }
    }

    let formatted_address = feature.place_name.clone().unwrap_or_default();
    let confidence = feature.relevance.unwrap_or(0.5);
    let longitude = feature.center[0];
    let latitude = feature.center[1];
    let raw = serde_json::to_value(&feature).ok();

    Ok(GeocodeResult {
        latitude,
        longitude,
        formatted_address,
        confidence,
        components,
        raw,
    })
}

/// Known city reference points for the credential-free stub
///
/// Needles match as plain substrings, first hit wins; the two-letter
/// aliases catch "Brooklyn, NY" style addresses.
const STUB_CITIES: [(&str, f64, f64, &str, &str); 6] = [
    ("new york", 40.7128, -74.0060, "New York", "NY"),
    ("ny", 40.7128, -74.0060, "New York", "NY"),
    ("los angeles", 34.0522, -118.2437, "Los Angeles", "CA"),
    ("la", 34.0522, -118.2437, "Los Angeles", "CA"),
    ("chicago", 41.8781, -87.6298, "Chicago", "IL"),
    ("seattle", 47.6062, -122.3321, "Seattle", "WA"),
];

/// Fallback point for addresses matching no known city
const STUB_DEFAULT: (f64, f64, &str, &str) = (37.7749, -122.4194, "San Francisco", "CA");

/// Deterministic credential-free geocoder
///
/// Substring-matches a handful of city names to fixed reference points.
/// Confidence is 0.7, raised to 0.8 when the address has a comma and more
/// than three whitespace-delimited tokens, so a full street address clears
/// the venue-location threshold while a bare city name does not.
pub struct StubGeocoder;

#[async_trait::async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodeResult, GeocodeError> {
        let query = address.trim();
        if query.is_empty() {
            return Err(GeocodeError::InvalidAddress("empty address".to_string()));
        }

        let lower = query.to_lowercase();
        let (latitude, longitude, city, state) = STUB_CITIES
            .iter()
            .find(|(name, ..)| lower.contains(name))
            .map(|(_, lat, lng, city, state)| (*lat, *lng, *city, *state))
            .unwrap_or(STUB_DEFAULT);

        let detailed = query.contains(',') && query.split_whitespace().count() > 3;
        let confidence = if detailed { 0.8 } else { 0.7 };

        tracing::debug!(
            address = query,
            city = city,
            confidence = confidence,
            "Stub geocoder resolved address"
        );

        Ok(GeocodeResult {
            latitude,
            longitude,
            formatted_address: query.to_string(),
            confidence,
            components: AddressComponents {
                city: Some(city.to_string()),
                state: Some(state.to_string()),
                postal_code: None,
                country: Some("US".to_string()),
            },
            raw: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_resolves_known_cities() {
        let geocoder = StubGeocoder;

        let seattle = geocoder.geocode("400 Pine St, Seattle, WA").await.unwrap();
        assert!((seattle.latitude - 47.6062).abs() < 1e-6);
        assert!((seattle.longitude - (-122.3321)).abs() < 1e-6);

        let chicago = geocoder.geocode("Chicago").await.unwrap();
        assert!((chicago.latitude - 41.8781).abs() < 1e-6);

        let brooklyn = geocoder.geocode("Brooklyn, NY").await.unwrap();
        assert!((brooklyn.latitude - 40.7128).abs() < 1e-6);
        assert_eq!(brooklyn.components.city.as_deref(), Some("New York"));
    }

    #[tokio::test]
    async fn test_stub_defaults_unknown_addresses() {
        let geocoder = StubGeocoder;
        let result = geocoder.geocode("123 Main St, Springfield, IL").await.unwrap();
        assert!((result.latitude - 37.7749).abs() < 1e-6);
        assert!((result.longitude - (-122.4194)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_stub_confidence_rules() {
        let geocoder = StubGeocoder;

        // Comma plus more than three tokens reads as a full street address
        let detailed = geocoder.geocode("400 Pine St, Seattle, WA").await.unwrap();
        assert_eq!(detailed.confidence, 0.8);

        let bare = geocoder.geocode("Seattle").await.unwrap();
        assert_eq!(bare.confidence, 0.7);

        // Comma alone is not enough
        let short = geocoder.geocode("Seattle, WA").await.unwrap();
        assert_eq!(short.confidence, 0.7);
    }

    #[tokio::test]
    async fn test_stub_rejects_empty_address() {
        let geocoder = StubGeocoder;
        assert!(matches!(
            geocoder.geocode("   ").await,
            Err(GeocodeError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_compose_query_street_suffix_rule() {
        // Bare venue names stay out of the query
        assert_eq!(
            compose_query(Some("The Blue Room"), Some("123 Main St"), None, None, None, None),
            Some("123 Main St".to_string())
        );
        // Address-like venue names are included
        assert_eq!(
            compose_query(
                Some("Main St Community Hall"),
                Some("123 Main St"),
                Some("Springfield"),
                Some("IL"),
                None,
                None
            ),
            Some("Main St Community Hall, 123 Main St, Springfield, IL".to_string())
        );
    }

    #[test]
    fn test_compose_query_omits_default_country_and_blanks() {
        assert_eq!(
            compose_query(None, Some("123 Main St"), Some("Springfield"), None, Some("62701"), Some("US")),
            Some("123 Main St, Springfield, 62701".to_string())
        );
        assert_eq!(
            compose_query(None, Some("10 Rue de Rivoli"), Some("Paris"), None, None, Some("FR")),
            Some("10 Rue de Rivoli, Paris, FR".to_string())
        );
        assert_eq!(compose_query(None, None, None, None, None, None), None);
        assert_eq!(compose_query(Some("The Blue Room"), Some("  "), None, None, None, None), None);
    }

    #[test]
    fn test_compose_query_drops_state_without_city() {
        assert_eq!(
            compose_query(None, Some("123 Main St"), None, Some("IL"), None, None),
            Some("123 Main St".to_string())
        );
    }

    #[test]
    fn test_street_suffix_matches_whole_tokens_only() {
        assert!(has_street_suffix("123 Main St."));
        assert!(has_street_suffix("Fifth Avenue Theater"));
        // "st" inside a word does not count
        assert!(!has_street_suffix("Stadium Entrance"));
        assert!(!has_street_suffix("The Blue Room"));
    }

    #[test]
    fn test_escape_path_segment() {
        assert_eq!(escape_path_segment("50% off #1 / why?"), "50%25 off %231 %2F why%3F");
    }

    #[test]
    fn test_feature_to_result_maps_context() {
        let feature = MapboxFeature {
            place_name: Some("400 Pine St, Seattle, Washington 98101, United States".to_string()),
            relevance: Some(0.96),
            center: vec![-122.3321, 47.6062],
            context: vec![
                MapboxContext {
                    id: "postcode.123".to_string(),
                    text: Some("98101".to_string()),
                    short_code: None,
                },
                MapboxContext {
                    id: "place.456".to_string(),
                    text: Some("Seattle".to_string()),
                    short_code: None,
                },
                MapboxContext {
                    id: "region.789".to_string(),
                    text: Some("Washington".to_string()),
                    short_code: Some("US-WA".to_string()),
                },
                MapboxContext {
                    id: "country.1".to_string(),
                    text: Some("United States".to_string()),
                    short_code: Some("us".to_string()),
                },
            ],
        };

        let result = feature_to_result(feature).unwrap();
        assert_eq!(result.latitude, 47.6062);
        assert_eq!(result.longitude, -122.3321);
        assert_eq!(result.confidence, 0.96);
        assert_eq!(result.components.city.as_deref(), Some("Seattle"));
        assert_eq!(result.components.state.as_deref(), Some("US-WA"));
        assert_eq!(result.components.postal_code.as_deref(), Some("98101"));
        assert!(result.raw.is_some());
    }

    #[test]
    fn test_feature_without_relevance_scores_half() {
        let feature = MapboxFeature {
            place_name: None,
            relevance: None,
            center: vec![-87.6298, 41.8781],
            context: vec![],
        };
        assert_eq!(feature_to_result(feature).unwrap().confidence, 0.5);
    }

    #[test]
    fn test_feature_with_bad_center_is_rejected() {
        let feature = MapboxFeature {
            place_name: None,
            relevance: None,
            center: vec![-87.6298],
            context: vec![],
        };
        assert!(matches!(
            feature_to_result(feature),
            Err(GeocodeError::ProviderError(_))
        ));
    }
}
