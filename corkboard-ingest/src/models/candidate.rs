//! Event candidate model
//!
//! An EventCandidate is one extracted event proposal from a flyer region,
//! prior to the publish decision. Composite score is set only after the
//! moderation stage runs; decision is set only after the decision engine
//! runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::geocode::GeocodeResult;

/// Terminal per-candidate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Auto- or manually published; an Event exists (or promotion was attempted)
    Published,
    /// Rejected as inappropriate
    Blocked,
    /// Parked for a human reviewer
    NeedsReview,
}

impl Decision {
    /// Stable name used in storage and payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Published => "published",
            Decision::Blocked => "blocked",
            Decision::NeedsReview => "needs_review",
        }
    }

    /// Parse a stored decision name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "published" => Some(Decision::Published),
            "blocked" => Some(Decision::Blocked),
            "needs_review" => Some(Decision::NeedsReview),
            _ => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw field values read off the flyer by the extraction capability
///
/// Everything is optional free text exactly as printed; interpretation
/// (date parsing, address composition) happens downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedFields {
    pub title: Option<String>,
    /// Datetime hint, e.g. "July 15, 7pm" or "2026-07-15 19:00"
    pub date_time: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Venue name hint
    pub venue: Option<String>,
    /// Street address hint
    pub address: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
    pub organizer: Option<String>,
    pub url: Option<String>,
    pub contact_info: Option<String>,
    pub category: Option<String>,
    pub age_restriction: Option<String>,
}

impl ExtractedFields {
    /// Title with surrounding whitespace stripped, if non-empty
    pub fn trimmed_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Per-field extraction confidences reported alongside the fields
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfidences {
    pub title: f64,
    pub date_time: f64,
    pub location: f64,
    pub overall: f64,
}

/// One extracted event proposal from a flyer region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCandidate {
    /// Unique candidate identifier
    pub candidate_id: Uuid,

    /// Owning flyer region
    pub flyer_id: Uuid,

    /// Candidate identifier assigned by the extraction capability
    ///
    /// Together with `flyer_id` it keys the idempotent upsert.
    pub extraction_event_id: String,

    /// Extracted field values
    pub fields: ExtractedFields,

    /// Per-field extraction confidences
    pub confidences: FieldConfidences,

    /// Text snippet the extractor based this candidate on
    pub source_excerpt: Option<String>,

    /// Geocode result, once the geocoding stage has run
    pub geocode: Option<GeocodeResult>,

    /// Weighted quality score, set by the moderation stage
    pub composite_score: Option<f64>,

    /// Terminal decision, set by the decision engine
    pub decision: Option<Decision>,

    /// Human-readable reason accompanying the decision
    pub decision_reason: Option<String>,

    /// Event this candidate was promoted into, if any
    pub event_id: Option<Uuid>,

    /// When the candidate was persisted
    pub created_at: DateTime<Utc>,

    /// When the candidate was last written
    pub updated_at: DateTime<Utc>,
}
