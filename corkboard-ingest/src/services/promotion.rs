//! Candidate promotion
//!
//! Converts a published candidate into a persisted public Event, exactly
//! one per canonical key. Promotion is safe to retry and safe under
//! concurrent candidates resolving to the same key: an insert that loses
//! the race falls through to the upgrade path instead of failing.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use corkboard_common::{EventBus, PipelineEvent};

use crate::db;
use crate::models::{Event, EventCandidate, ModerationState, PublishedVia, Venue};

/// Promotion errors
///
/// `MissingTitle` aborts only the candidate at hand; siblings and the
/// submission are unaffected.
#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("Candidate has no title")]
    MissingTitle,

    #[error("Storage error: {0}")]
    Storage(#[from] corkboard_common::Error),
}

/// Canonical dedup key: normalized title plus calendar date
///
/// Case- and whitespace-insensitive, ignores time-of-day.
pub fn canonical_key(title: &str, start_ts: DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        title.trim().to_lowercase(),
        start_ts.format("%Y-%m-%d")
    )
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y"];

/// Resolve the flyer's datetime hint to a concrete start instant
///
/// Tries the fixed format list in order; a parsed instant strictly before
/// `now` is shifted one year forward (flyers rarely advertise the past; a
/// year-less date parsed into last year is the usual cause). An unparsable
/// or absent hint falls back to `now + 24h` so the event still surfaces
/// instead of being dropped.
pub fn resolve_start_time(hint: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let parsed = hint
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .and_then(parse_datetime_text);

    match parsed {
        Some(instant) if instant < now => shift_year_forward(instant),
        Some(instant) => instant,
        None => now + Duration::hours(24),
    }
}

/// Resolve the end-time hint, if it parses to an instant after the start
pub fn resolve_end_time(hint: Option<&str>, start_ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
    hint.map(str::trim)
        .filter(|h| !h.is_empty())
        .and_then(parse_datetime_text)
        .filter(|end| *end > start_ts)
}

fn parse_datetime_text(text: &str) -> Option<DateTime<Utc>> {
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

fn shift_year_forward(instant: DateTime<Utc>) -> DateTime<Utc> {
    // with_year fails for Feb 29 into a non-leap year
    instant
        .with_year(instant.year() + 1)
        .unwrap_or_else(|| instant + Duration::days(365))
}

/// Promotes published candidates into public events
pub struct Promoter {
    db: SqlitePool,
    event_bus: Arc<EventBus>,
}

impl Promoter {
    pub fn new(db: SqlitePool, event_bus: Arc<EventBus>) -> Self {
        Self { db, event_bus }
    }

    /// Promote one candidate with a `published` decision
    ///
    /// Looks up the canonical key first: an existing non-approved event is
    /// upgraded in place, an approved one is left alone. Only when no event
    /// exists for the key is a new row inserted. Returns the event id and
    /// records it on the candidate row.
    pub async fn promote(
        &self,
        candidate: &EventCandidate,
        published_via: PublishedVia,
    ) -> Result<Uuid, PromotionError> {
        let title = candidate
            .fields
            .trimmed_title()
            .ok_or(PromotionError::MissingTitle)?;

        let now = Utc::now();
        let start_ts = resolve_start_time(candidate.fields.date_time.as_deref(), now);
        let end_ts = resolve_end_time(candidate.fields.end_time.as_deref(), start_ts);
        let key = canonical_key(title, start_ts);

        if let Some(existing) = db::events::find_event_by_canonical_key(&self.db, &key).await? {
            let event_id = self.reuse_existing(existing, published_via).await?;
            db::candidates::update_candidate_event(&self.db, candidate.candidate_id, event_id)
                .await?;
            return Ok(event_id);
        }

        let venue_id = self.resolve_venue(candidate).await?;

        let event = Event {
            event_id: Uuid::new_v4(),
            canonical_key: key.clone(),
            title: title.to_string(),
            description: candidate.fields.description.clone(),
            start_ts,
            end_ts,
            venue_id,
            price: candidate.fields.price.clone(),
            organizer: candidate.fields.organizer.clone(),
            url: candidate.fields.url.clone(),
            category: candidate.fields.category.clone(),
            moderation_state: ModerationState::Approved,
            quality_score: candidate.composite_score,
            published_via: Some(published_via),
            created_at: now,
            updated_at: now,
        };

        let event_id = match db::events::insert_event(&self.db, &event).await {
            Ok(()) => {
                tracing::info!(
                    event_id = %event.event_id,
                    canonical_key = %key,
                    published_via = %published_via,
                    "Event published"
                );
                self.event_bus.emit_lossy(PipelineEvent::EventPublished {
                    event_id: event.event_id,
                    canonical_key: key.clone(),
                    published_via: published_via.to_string(),
                    timestamp: Utc::now(),
                });
                event.event_id
            }
            Err(corkboard_common::Error::Database(e)) if db::is_unique_violation(&e) => {
                // A concurrent promotion inserted this key first
                let existing = db::events::find_event_by_canonical_key(&self.db, &key)
                    .await?
                    .ok_or_else(|| {
                        corkboard_common::Error::Internal(format!(
                            "Event for key {} missing after unique conflict",
                            key
                        ))
                    })?;
                self.reuse_existing(existing, published_via).await?
            }
            Err(e) => return Err(e.into()),
        };

        db::candidates::update_candidate_event(&self.db, candidate.candidate_id, event_id).await?;
        Ok(event_id)
    }

    async fn reuse_existing(
        &self,
        existing: Event,
        published_via: PublishedVia,
    ) -> Result<Uuid, PromotionError> {
        if existing.moderation_state == ModerationState::Approved {
            tracing::debug!(
                event_id = %existing.event_id,
                canonical_key = %existing.canonical_key,
                "Event already published for this key"
            );
            return Ok(existing.event_id);
        }

        db::events::approve_event(&self.db, existing.event_id, published_via).await?;
        tracing::info!(
            event_id = %existing.event_id,
            canonical_key = %existing.canonical_key,
            "Existing event upgraded to approved"
        );
        self.event_bus.emit_lossy(PipelineEvent::EventPublished {
            event_id: existing.event_id,
            canonical_key: existing.canonical_key.clone(),
            published_via: published_via.to_string(),
            timestamp: Utc::now(),
        });
        Ok(existing.event_id)
    }

    // Venue by case-insensitive name; minimal row when absent. Geocoding
    // already ran (or will run) in its own stage, so no provider call here.
    async fn resolve_venue(
        &self,
        candidate: &EventCandidate,
    ) -> Result<Option<Uuid>, PromotionError> {
        let Some(name) = candidate
            .fields
            .venue
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };

        if let Some(existing) = db::venues::find_venue_by_name(&self.db, name).await? {
            return Ok(Some(existing.venue_id));
        }

        let venue = Venue::minimal(name, candidate.fields.address.clone());
        db::venues::save_venue(&self.db, &venue).await?;
        tracing::debug!(venue_id = %venue.venue_id, name = name, "Created minimal venue");
        Ok(Some(venue.venue_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_canonical_key_normalization() {
        let evening = at(2024, 7, 15, 19, 0);
        let morning = at(2024, 7, 15, 8, 0);

        assert_eq!(
            canonical_key("Jazz Night", evening),
            canonical_key("  jazz night ", morning)
        );
        assert_eq!(canonical_key("Jazz Night", evening), "jazz night_2024-07-15");
    }

    #[test]
    fn test_start_time_format_list() {
        let now = at(2026, 1, 1, 0, 0);

        assert_eq!(
            resolve_start_time(Some("2026-07-15T19:00:00"), now),
            at(2026, 7, 15, 19, 0)
        );
        assert_eq!(
            resolve_start_time(Some("2026-07-15 19:00"), now),
            at(2026, 7, 15, 19, 0)
        );
        assert_eq!(
            resolve_start_time(Some("2026-07-15"), now),
            at(2026, 7, 15, 0, 0)
        );
        assert_eq!(
            resolve_start_time(Some("July 15, 2026"), now),
            at(2026, 7, 15, 0, 0)
        );
        assert_eq!(
            resolve_start_time(Some("Jul 15, 2026"), now),
            at(2026, 7, 15, 0, 0)
        );
    }

    #[test]
    fn test_past_dates_shift_one_year_forward() {
        let now = at(2024, 6, 1, 12, 0);
        assert_eq!(
            resolve_start_time(Some("2024-01-01"), now),
            at(2025, 1, 1, 0, 0)
        );
        // Future dates are left alone
        assert_eq!(
            resolve_start_time(Some("2024-12-31"), now),
            at(2024, 12, 31, 0, 0)
        );
    }

    #[test]
    fn test_unparsable_hint_falls_back_to_tomorrow() {
        let now = at(2026, 3, 10, 9, 30);
        let expected = now + Duration::hours(24);

        assert_eq!(resolve_start_time(Some("every Friday night!"), now), expected);
        assert_eq!(resolve_start_time(None, now), expected);
        assert_eq!(resolve_start_time(Some("   "), now), expected);
    }

    #[test]
    fn test_leap_day_shift_does_not_panic() {
        let now = at(2026, 6, 1, 0, 0);
        let shifted = resolve_start_time(Some("2024-02-29"), now);
        // 365 days past Feb 29 2024
        assert_eq!(shifted, at(2025, 2, 28, 0, 0));
    }

    #[test]
    fn test_end_time_must_follow_start() {
        let start = at(2026, 7, 15, 19, 0);

        assert_eq!(
            resolve_end_time(Some("2026-07-15 22:00"), start),
            Some(at(2026, 7, 15, 22, 0))
        );
        assert_eq!(resolve_end_time(Some("2026-07-15 18:00"), start), None);
        assert_eq!(resolve_end_time(Some("10pm sharp"), start), None);
        assert_eq!(resolve_end_time(None, start), None);
    }
}
