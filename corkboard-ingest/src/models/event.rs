//! Public event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Moderation state of a public event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationState {
    /// Awaiting review; not listed
    Pending,
    /// Listed publicly
    Approved,
    /// Taken down; not listed
    Blocked,
}

impl ModerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationState::Pending => "pending",
            ModerationState::Approved => "approved",
            ModerationState::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ModerationState::Pending),
            "approved" => Some(ModerationState::Approved),
            "blocked" => Some(ModerationState::Blocked),
            _ => None,
        }
    }
}

/// How an event got published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishedVia {
    /// Decision engine crossed the auto-publish threshold
    Auto,
    /// Operator action through the review surface
    Manual,
}

impl PublishedVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishedVia::Auto => "auto",
            PublishedVia::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(PublishedVia::Auto),
            "manual" => Some(PublishedVia::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for PublishedVia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted takedown reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnpublishReason {
    Spam,
    Duplicate,
    BadLocation,
    Inappropriate,
}

impl UnpublishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnpublishReason::Spam => "spam",
            UnpublishReason::Duplicate => "duplicate",
            UnpublishReason::BadLocation => "bad_location",
            UnpublishReason::Inappropriate => "inappropriate",
        }
    }

    /// Parse a takedown reason; anything outside the fixed set is rejected
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spam" => Some(UnpublishReason::Spam),
            "duplicate" => Some(UnpublishReason::Duplicate),
            "bad_location" => Some(UnpublishReason::BadLocation),
            "inappropriate" => Some(UnpublishReason::Inappropriate),
            _ => None,
        }
    }
}

/// A published (or publishable) public event
///
/// Created exclusively via candidate promotion, which looks up by
/// `canonical_key` before inserting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    pub event_id: Uuid,

    /// Globally unique dedup key: normalized title + "_" + start date
    pub canonical_key: String,

    pub title: String,
    pub description: Option<String>,

    /// Event start
    pub start_ts: DateTime<Utc>,

    /// Event end, when the flyer printed one
    pub end_ts: Option<DateTime<Utc>>,

    /// Venue reference, when one was resolved
    pub venue_id: Option<Uuid>,

    pub price: Option<String>,
    pub organizer: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,

    /// Listing state
    pub moderation_state: ModerationState,

    /// Quality score copied from the promoting candidate
    pub quality_score: Option<f64>,

    /// How the event got published
    pub published_via: Option<PublishedVia>,

    /// When the event was created
    pub created_at: DateTime<Utc>,

    /// When the event was last written
    pub updated_at: DateTime<Utc>,
}

/// Recorded non-exact merge between two canonical events
///
/// Structural placeholder: rows are written by operator tooling, never by an
/// automatic matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeLink {
    pub link_id: Uuid,
    /// The event kept as canonical
    pub event_id: Uuid,
    /// The event judged to duplicate it
    pub duplicate_event_id: Uuid,
    /// Similarity in [0,1] as judged by whoever recorded the link
    pub similarity: f64,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
