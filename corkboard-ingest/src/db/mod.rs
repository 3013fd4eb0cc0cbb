//! Database access for corkboard-ingest
//!
//! SQLite is the single source of truth for the pipeline. Each aggregate has
//! its own module of free async functions over `&SqlitePool`.

pub mod candidates;
pub mod events;
pub mod flyers;
pub mod submissions;
pub mod venues;

use corkboard_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Connects to the corkboard database, creating the file and the ingest
/// tables if they don't exist yet.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the ingest tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submissions (
            submission_id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'uploaded',
            source_label TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flyer_regions (
            flyer_id TEXT PRIMARY KEY,
            submission_id TEXT NOT NULL REFERENCES submissions(submission_id),
            region_id TEXT NOT NULL,
            polygon TEXT NOT NULL,
            rotation_deg REAL,
            detection_confidence REAL NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (submission_id, region_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS event_candidates (
            candidate_id TEXT PRIMARY KEY,
            flyer_id TEXT NOT NULL REFERENCES flyer_regions(flyer_id),
            extraction_event_id TEXT NOT NULL,
            fields TEXT NOT NULL,
            confidences TEXT NOT NULL,
            source_excerpt TEXT,
            geocode TEXT,
            composite_score REAL,
            decision TEXT,
            decision_reason TEXT,
            event_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (flyer_id, extraction_event_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS venues (
            venue_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            address_line TEXT,
            city TEXT,
            state TEXT,
            postal_code TEXT,
            country TEXT,
            latitude REAL,
            longitude REAL,
            geocode_confidence REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (name, address_line, city, state)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            event_id TEXT PRIMARY KEY,
            canonical_key TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            description TEXT,
            start_ts TEXT NOT NULL,
            end_ts TEXT,
            venue_id TEXT REFERENCES venues(venue_id),
            price TEXT,
            organizer TEXT,
            url TEXT,
            category TEXT,
            moderation_state TEXT NOT NULL DEFAULT 'pending',
            quality_score REAL,
            published_via TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dedupe_links (
            link_id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(event_id),
            duplicate_event_id TEXT NOT NULL REFERENCES events(event_id),
            similarity REAL NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (event_id, duplicate_event_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_events_start_ts ON events(start_ts)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_flyer_regions_submission ON flyer_regions(submission_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (submissions, flyer_regions, event_candidates, venues, events, dedupe_links)"
    );

    Ok(())
}

/// Check whether a sqlx error is a unique-constraint violation
///
/// Promotion treats a unique violation on event insert as "already exists,
/// fall through to the upgrade path", so the distinction matters.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
