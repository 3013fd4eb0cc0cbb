//! Venue model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical place events happen at
///
/// Shared by many events. The stored location is upgraded only when a new
/// geocode's confidence strictly exceeds the stored confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    /// Unique venue identifier
    pub venue_id: Uuid,

    /// Venue name as printed on flyers
    pub name: String,

    /// Street address line
    pub address_line: Option<String>,

    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,

    /// Point location, present after a confident geocode
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Confidence of the geocode that produced the stored location
    pub geocode_confidence: Option<f64>,

    /// When the venue was created
    pub created_at: DateTime<Utc>,

    /// When the venue was last written
    pub updated_at: DateTime<Utc>,
}

impl Venue {
    /// Minimal venue carrying only what a flyer printed (no location)
    pub fn minimal(name: impl Into<String>, address_line: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            venue_id: Uuid::new_v4(),
            name: name.into(),
            address_line,
            city: None,
            state: None,
            postal_code: None,
            country: None,
            latitude: None,
            longitude: None,
            geocode_confidence: None,
            created_at: now,
            updated_at: now,
        }
    }
}
