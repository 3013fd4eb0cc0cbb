//! Geocoding result model

use serde::{Deserialize, Serialize};

/// Structured address parts returned by a geocoder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressComponents {
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Best match for a free-text address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeResult {
    /// Latitude in [-90, 90]
    pub latitude: f64,

    /// Longitude in [-180, 180]
    pub longitude: f64,

    /// Provider-formatted address for display
    pub formatted_address: String,

    /// Provider confidence in [0,1]
    pub confidence: f64,

    /// Structured components for venue records
    pub components: AddressComponents,

    /// Opaque provider payload, kept for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}
