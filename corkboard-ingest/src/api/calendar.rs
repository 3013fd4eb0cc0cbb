//! ICS calendar export
//!
//! Renders one approved event as an RFC 5545 VCALENDAR so phone calendars can
//! add it straight from the event page. All times are emitted in UTC.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use corkboard_common::{Error, Result};

use crate::db;
use crate::models::{Event, Venue};

/// DTEND fallback when the flyer printed no end time
const DEFAULT_DURATION_HOURS: i64 = 2;

/// Render the ICS document for one approved event
pub async fn event_ics(
    pool: &SqlitePool,
    event_id: Uuid,
    uid_domain: &str,
    prod_id: &str,
) -> Result<String> {
    let (event, venue) = db::events::load_approved_event_with_venue(pool, event_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Event {} not found", event_id)))?;

    Ok(render_ics(&event, venue.as_ref(), uid_domain, prod_id))
}

/// Build the VCALENDAR text, CRLF line endings per RFC 5545
///
/// The UID is derived from the event id and uid domain only, so repeated
/// exports of the same event update rather than duplicate it in subscribing
/// calendars.
pub fn render_ics(event: &Event, venue: Option<&Venue>, uid_domain: &str, prod_id: &str) -> String {
    let start = event.start_ts;
    let end = event
        .end_ts
        .unwrap_or_else(|| start + Duration::hours(DEFAULT_DURATION_HOURS));

    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{}", prod_id),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:evt_{}@{}", event.event_id, uid_domain),
        format!("DTSTAMP:{}", format_utc(Utc::now())),
        format!("DTSTART:{}", format_utc(start)),
        format!("DTEND:{}", format_utc(end)),
        format!("SUMMARY:{}", escape_ics_text(&event.title)),
    ];

    if let Some(location) = location_line(venue) {
        lines.push(format!("LOCATION:{}", escape_ics_text(&location)));
    }
    if let Some(description) = &event.description {
        lines.push(format!("DESCRIPTION:{}", escape_ics_text(description)));
    }
    if let Some(url) = &event.url {
        lines.push(format!("URL:{}", url));
    }
    lines.push("STATUS:CONFIRMED".to_string());
    lines.push("END:VEVENT".to_string());
    lines.push("END:VCALENDAR".to_string());

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

fn format_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Venue name and street address joined for the LOCATION property
fn location_line(venue: Option<&Venue>) -> Option<String> {
    let venue = venue?;
    match &venue.address_line {
        Some(address) => Some(format!("{}, {}", venue.name, address)),
        None => Some(venue.name.clone()),
    }
}

/// Escape text per RFC 5545 section 3.3.11
///
/// Backslash must go first so the escapes themselves are not re-escaped.
fn escape_ics_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\r', "")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModerationState, PublishedVia};
    use chrono::TimeZone;

    fn sample_event() -> Event {
        let start = Utc.with_ymd_and_hms(2025, 6, 14, 19, 30, 0).unwrap();
        Event {
            event_id: Uuid::new_v4(),
            canonical_key: "jazz night_2025-06-14".to_string(),
            title: "Jazz Night".to_string(),
            description: Some("Live sets, walk-ins welcome".to_string()),
            start_ts: start,
            end_ts: None,
            venue_id: None,
            price: None,
            organizer: None,
            url: Some("https://example.com/jazz".to_string()),
            category: None,
            moderation_state: ModerationState::Approved,
            quality_score: Some(0.85),
            published_via: Some(PublishedVia::Auto),
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_escape_ics_text() {
        assert_eq!(escape_ics_text("a,b;c"), "a\\,b\\;c");
        assert_eq!(escape_ics_text("back\\slash"), "back\\\\slash");
        assert_eq!(escape_ics_text("line\r\nbreak"), "line\\nbreak");
        assert_eq!(escape_ics_text("plain"), "plain");
    }

    #[test]
    fn test_dtend_defaults_to_two_hours() {
        let event = sample_event();
        let ics = render_ics(&event, None, "corkboard.app", "-//Corkboard//Ingest//EN");

        assert!(ics.contains("DTSTART:20250614T193000Z\r\n"));
        assert!(ics.contains("DTEND:20250614T213000Z\r\n"));
        assert!(ics.contains("STATUS:CONFIRMED\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn test_explicit_end_time_kept() {
        let mut event = sample_event();
        event.end_ts = Some(event.start_ts + Duration::hours(4));
        let ics = render_ics(&event, None, "corkboard.app", "-//Corkboard//Ingest//EN");

        assert!(ics.contains("DTEND:20250614T233000Z\r\n"));
    }

    #[test]
    fn test_uid_is_stable_across_renders() {
        let event = sample_event();
        let expected = format!("UID:evt_{}@corkboard.app\r\n", event.event_id);

        let first = render_ics(&event, None, "corkboard.app", "-//Corkboard//Ingest//EN");
        let second = render_ics(&event, None, "corkboard.app", "-//Corkboard//Ingest//EN");
        assert!(first.contains(&expected));
        assert!(second.contains(&expected));
    }

    #[test]
    fn test_location_escapes_commas() {
        let mut event = sample_event();
        event.title = "Food, Glorious Food".to_string();
        let venue = Venue::minimal("The Hall", Some("12 Elm St, Springfield".to_string()));

        let ics = render_ics(
            &event,
            Some(&venue),
            "corkboard.app",
            "-//Corkboard//Ingest//EN",
        );

        assert!(ics.contains("SUMMARY:Food\\, Glorious Food\r\n"));
        assert!(ics.contains("LOCATION:The Hall\\, 12 Elm St\\, Springfield\r\n"));
    }

    #[tokio::test]
    async fn test_event_ics_requires_approved_event() {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        crate::db::init_tables(&pool).await.unwrap();

        let mut event = sample_event();
        event.moderation_state = ModerationState::Pending;
        db::events::insert_event(&pool, &event).await.unwrap();

        assert!(matches!(
            event_ics(&pool, event.event_id, "corkboard.app", "-//Corkboard//Ingest//EN").await,
            Err(Error::NotFound(_))
        ));

        db::events::approve_event(&pool, event.event_id, PublishedVia::Manual)
            .await
            .unwrap();
        let ics = event_ics(&pool, event.event_id, "corkboard.app", "-//Corkboard//Ingest//EN")
            .await
            .unwrap();
        assert!(ics.contains("SUMMARY:Jazz Night\r\n"));
    }
}
