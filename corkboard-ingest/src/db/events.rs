//! Public event database operations
//!
//! `canonical_key` uniqueness is the concurrency-safety mechanism for
//! promotion; everything here leans on it rather than on external locks.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use corkboard_common::Result;

use crate::models::{DedupeLink, Event, ModerationState, PublishedVia, Venue};

/// Filters for the public event listing
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Include events that already started
    pub include_past: bool,
    /// Only events starting at or after this instant
    pub start_after: Option<DateTime<Utc>>,
    /// Only events starting at or before this instant
    pub start_before: Option<DateTime<Utc>>,
    /// Case-insensitive substring over title and description
    pub keyword: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            include_past: false,
            start_after: None,
            start_before: None,
            keyword: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Insert a new event row
///
/// A unique violation on `canonical_key` is surfaced unchanged inside
/// `Error::Database` so promotion can fall through to its upgrade path.
pub async fn insert_event(pool: &SqlitePool, event: &Event) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO events (
            event_id, canonical_key, title, description, start_ts, end_ts,
            venue_id, price, organizer, url, category,
            moderation_state, quality_score, published_via, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.event_id.to_string())
    .bind(&event.canonical_key)
    .bind(&event.title)
    .bind(&event.description)
    .bind(event.start_ts.to_rfc3339())
    .bind(event.end_ts.map(|dt| dt.to_rfc3339()))
    .bind(event.venue_id.map(|id| id.to_string()))
    .bind(&event.price)
    .bind(&event.organizer)
    .bind(&event.url)
    .bind(&event.category)
    .bind(event.moderation_state.as_str())
    .bind(event.quality_score)
    .bind(event.published_via.map(|v| v.as_str()))
    .bind(event.created_at.to_rfc3339())
    .bind(event.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up an event by its canonical dedup key
pub async fn find_event_by_canonical_key(
    pool: &SqlitePool,
    canonical_key: &str,
) -> Result<Option<Event>> {
    let row = sqlx::query(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE canonical_key = ?"
    ))
    .bind(canonical_key)
    .fetch_optional(pool)
    .await?;

    row.map(|row| event_from_row(&row)).transpose()
}

/// Load one event by id, regardless of moderation state
pub async fn load_event(pool: &SqlitePool, event_id: Uuid) -> Result<Option<Event>> {
    let row = sqlx::query(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?"
    ))
    .bind(event_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| event_from_row(&row)).transpose()
}

/// Upgrade an existing event to approved, in place
pub async fn approve_event(
    pool: &SqlitePool,
    event_id: Uuid,
    published_via: PublishedVia,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE events
        SET moderation_state = 'approved', published_via = ?, updated_at = ?
        WHERE event_id = ?
        "#,
    )
    .bind(published_via.as_str())
    .bind(Utc::now().to_rfc3339())
    .bind(event_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Take a published event down
///
/// Returns false when no such event exists.
pub async fn unpublish_event(pool: &SqlitePool, event_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE events
        SET moderation_state = 'blocked', updated_at = ?
        WHERE event_id = ?
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(event_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load one approved event with its venue, for the public detail payload
pub async fn load_approved_event_with_venue(
    pool: &SqlitePool,
    event_id: Uuid,
) -> Result<Option<(Event, Option<Venue>)>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {JOINED_COLUMNS}
        FROM events e
        LEFT JOIN venues v ON v.venue_id = e.venue_id
        WHERE e.event_id = ? AND e.moderation_state = 'approved'
        "#
    ))
    .bind(event_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let event = event_from_row(&row)?;
        let venue = venue_from_prefixed_row(&row)?;
        Ok((event, venue))
    })
    .transpose()
}

/// List approved events with their venues, filtered and paginated
pub async fn list_approved_events(
    pool: &SqlitePool,
    query: &EventQuery,
) -> Result<Vec<(Event, Option<Venue>)>> {
    let now = Utc::now().to_rfc3339();
    let start_after = query.start_after.map(|dt| dt.to_rfc3339());
    let start_before = query.start_before.map(|dt| dt.to_rfc3339());
    let pattern = query
        .keyword
        .as_deref()
        .map(|kw| format!("%{}%", kw.to_lowercase()));

    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOINED_COLUMNS}
        FROM events e
        LEFT JOIN venues v ON v.venue_id = e.venue_id
        WHERE e.moderation_state = 'approved'
          AND (? OR e.start_ts >= ?)
          AND (? IS NULL OR e.start_ts >= ?)
          AND (? IS NULL OR e.start_ts <= ?)
          AND (? IS NULL OR lower(e.title) LIKE ? OR lower(COALESCE(e.description, '')) LIKE ?)
        ORDER BY e.start_ts
        LIMIT ? OFFSET ?
        "#
    ))
    .bind(query.include_past)
    .bind(&now)
    .bind(&start_after)
    .bind(&start_after)
    .bind(&start_before)
    .bind(&start_before)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(query.limit)
    .bind(query.offset)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let event = event_from_row(row)?;
            let venue = venue_from_prefixed_row(row)?;
            Ok((event, venue))
        })
        .collect()
}

/// Total approved events
pub async fn count_approved_events(pool: &SqlitePool) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE moderation_state = 'approved'")
            .fetch_one(pool)
            .await?;

    Ok(count)
}

/// Approved events created today (UTC)
pub async fn count_published_today(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM events
        WHERE moderation_state = 'approved' AND date(created_at) = date('now')
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Record a non-exact duplicate merge between two events
pub async fn record_dedupe_link(pool: &SqlitePool, link: &DedupeLink) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dedupe_links (
            link_id, event_id, duplicate_event_id, similarity, reason, created_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(event_id, duplicate_event_id) DO UPDATE SET
            similarity = excluded.similarity,
            reason = excluded.reason
        "#,
    )
    .bind(link.link_id.to_string())
    .bind(link.event_id.to_string())
    .bind(link.duplicate_event_id.to_string())
    .bind(link.similarity)
    .bind(&link.reason)
    .bind(link.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Dedupe links where the given event is the canonical side
pub async fn list_dedupe_links(pool: &SqlitePool, event_id: Uuid) -> Result<Vec<DedupeLink>> {
    let rows = sqlx::query(
        r#"
        SELECT link_id, event_id, duplicate_event_id, similarity, reason, created_at
        FROM dedupe_links
        WHERE event_id = ?
        ORDER BY created_at
        "#,
    )
    .bind(event_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let link_id: String = row.get("link_id");
            let event_id: String = row.get("event_id");
            let duplicate_event_id: String = row.get("duplicate_event_id");
            let created_at: String = row.get("created_at");

            Ok(DedupeLink {
                link_id: parse_uuid(&link_id, "link_id")?,
                event_id: parse_uuid(&event_id, "event_id")?,
                duplicate_event_id: parse_uuid(&duplicate_event_id, "duplicate_event_id")?,
                similarity: row.get("similarity"),
                reason: row.get("reason"),
                created_at: parse_timestamp(&created_at, "created_at")?,
            })
        })
        .collect()
}

const EVENT_COLUMNS: &str = "event_id, canonical_key, title, description, start_ts, end_ts, \
     venue_id, price, organizer, url, category, moderation_state, quality_score, \
     published_via, created_at, updated_at";

const JOINED_COLUMNS: &str = "e.event_id, e.canonical_key, e.title, e.description, e.start_ts, e.end_ts, \
     e.venue_id, e.price, e.organizer, e.url, e.category, e.moderation_state, \
     e.quality_score, e.published_via, e.created_at, e.updated_at, \
     v.venue_id AS v_venue_id, v.name AS v_name, v.address_line AS v_address_line, \
     v.city AS v_city, v.state AS v_state, v.postal_code AS v_postal_code, \
     v.country AS v_country, v.latitude AS v_latitude, v.longitude AS v_longitude, \
     v.geocode_confidence AS v_geocode_confidence, v.created_at AS v_created_at, \
     v.updated_at AS v_updated_at";

fn parse_uuid(s: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(s)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn parse_timestamp(s: &str, column: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Event> {
    let event_id: String = row.get("event_id");
    let venue_id: Option<String> = row.get("venue_id");
    let start_ts: String = row.get("start_ts");
    let end_ts: Option<String> = row.get("end_ts");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let moderation_state: String = row.get("moderation_state");
    let moderation_state = ModerationState::parse(&moderation_state).ok_or_else(|| {
        corkboard_common::Error::Internal(format!("Unknown moderation state: {}", moderation_state))
    })?;

    let published_via: Option<String> = row.get("published_via");
    let published_via = match published_via {
        Some(v) => Some(PublishedVia::parse(&v).ok_or_else(|| {
            corkboard_common::Error::Internal(format!("Unknown published_via: {}", v))
        })?),
        None => None,
    };

    Ok(Event {
        event_id: parse_uuid(&event_id, "event_id")?,
        canonical_key: row.get("canonical_key"),
        title: row.get("title"),
        description: row.get("description"),
        start_ts: parse_timestamp(&start_ts, "start_ts")?,
        end_ts: end_ts.as_deref().map(|s| parse_timestamp(s, "end_ts")).transpose()?,
        venue_id: venue_id.as_deref().map(|s| parse_uuid(s, "venue_id")).transpose()?,
        price: row.get("price"),
        organizer: row.get("organizer"),
        url: row.get("url"),
        category: row.get("category"),
        moderation_state,
        quality_score: row.get("quality_score"),
        published_via,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

// Joined rows carry the event columns unprefixed and venue columns as v_*,
// so event_from_row works on them directly.
fn venue_from_prefixed_row(row: &sqlx::sqlite::SqliteRow) -> Result<Option<Venue>> {
    let venue_id: Option<String> = row.get("v_venue_id");
    let Some(venue_id) = venue_id else {
        return Ok(None);
    };

    let created_at: String = row.get("v_created_at");
    let updated_at: String = row.get("v_updated_at");

    Ok(Some(Venue {
        venue_id: parse_uuid(&venue_id, "v_venue_id")?,
        name: row.get("v_name"),
        address_line: row.get("v_address_line"),
        city: row.get("v_city"),
        state: row.get("v_state"),
        postal_code: row.get("v_postal_code"),
        country: row.get("v_country"),
        latitude: row.get("v_latitude"),
        longitude: row.get("v_longitude"),
        geocode_confidence: row.get("v_geocode_confidence"),
        created_at: parse_timestamp(&created_at, "v_created_at")?,
        updated_at: parse_timestamp(&updated_at, "v_updated_at")?,
    }))
}
