//! Event candidate database operations

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use corkboard_common::Result;

use crate::models::{Decision, EventCandidate, ExtractedFields, FieldConfidences, GeocodeResult};

/// Save a candidate, upserting on (flyer_id, extraction_event_id)
///
/// Re-extraction refreshes the extraction-owned columns (fields,
/// confidences, excerpt) and leaves moderation/decision columns alone; they
/// are re-derived by the stages that own them. Returns the canonical
/// candidate id.
pub async fn save_candidate(pool: &SqlitePool, candidate: &EventCandidate) -> Result<Uuid> {
    let fields = serde_json::to_string(&candidate.fields)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to serialize fields: {}", e)))?;
    let confidences = serde_json::to_string(&candidate.confidences).map_err(|e| {
        corkboard_common::Error::Internal(format!("Failed to serialize confidences: {}", e))
    })?;
    let now = chrono::Utc::now().to_rfc3339();

    let existing: Option<String> = sqlx::query_scalar(
        "SELECT candidate_id FROM event_candidates WHERE flyer_id = ? AND extraction_event_id = ?",
    )
    .bind(candidate.flyer_id.to_string())
    .bind(&candidate.extraction_event_id)
    .fetch_optional(pool)
    .await?;

    if let Some(existing_id) = existing {
        sqlx::query(
            r#"
            UPDATE event_candidates
            SET fields = ?, confidences = ?, source_excerpt = ?, updated_at = ?
            WHERE candidate_id = ?
            "#,
        )
        .bind(&fields)
        .bind(&confidences)
        .bind(&candidate.source_excerpt)
        .bind(&now)
        .bind(&existing_id)
        .execute(pool)
        .await?;

        return Uuid::parse_str(&existing_id).map_err(|e| {
            corkboard_common::Error::Internal(format!("Failed to parse candidate_id: {}", e))
        });
    }

    sqlx::query(
        r#"
        INSERT INTO event_candidates (
            candidate_id, flyer_id, extraction_event_id, fields, confidences,
            source_excerpt, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(candidate.candidate_id.to_string())
    .bind(candidate.flyer_id.to_string())
    .bind(&candidate.extraction_event_id)
    .bind(&fields)
    .bind(&confidences)
    .bind(&candidate.source_excerpt)
    .bind(candidate.created_at.to_rfc3339())
    .bind(candidate.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(candidate.candidate_id)
}

/// Store the moderation outcome and the decision it led to
pub async fn update_candidate_review(
    pool: &SqlitePool,
    candidate_id: Uuid,
    composite_score: f64,
    decision: Decision,
    reason: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE event_candidates
        SET composite_score = ?, decision = ?, decision_reason = ?, updated_at = ?
        WHERE candidate_id = ?
        "#,
    )
    .bind(composite_score)
    .bind(decision.as_str())
    .bind(reason)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(candidate_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite the decision alone (operator override path)
pub async fn update_candidate_decision(
    pool: &SqlitePool,
    candidate_id: Uuid,
    decision: Decision,
    reason: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE event_candidates
        SET decision = ?, decision_reason = ?, updated_at = ?
        WHERE candidate_id = ?
        "#,
    )
    .bind(decision.as_str())
    .bind(reason)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(candidate_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Store a geocode result on the candidate
pub async fn update_candidate_geocode(
    pool: &SqlitePool,
    candidate_id: Uuid,
    geocode: &GeocodeResult,
) -> Result<()> {
    let geocode_json = serde_json::to_string(geocode)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to serialize geocode: {}", e)))?;

    sqlx::query(
        r#"
        UPDATE event_candidates
        SET geocode = ?, updated_at = ?
        WHERE candidate_id = ?
        "#,
    )
    .bind(&geocode_json)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(candidate_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Record which event the candidate was promoted into
pub async fn update_candidate_event(
    pool: &SqlitePool,
    candidate_id: Uuid,
    event_id: Uuid,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE event_candidates
        SET event_id = ?, updated_at = ?
        WHERE candidate_id = ?
        "#,
    )
    .bind(event_id.to_string())
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(candidate_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one candidate by id
pub async fn load_candidate(
    pool: &SqlitePool,
    candidate_id: Uuid,
) -> Result<Option<EventCandidate>> {
    let row = sqlx::query(
        r#"
        SELECT candidate_id, flyer_id, extraction_event_id, fields, confidences,
               source_excerpt, geocode, composite_score, decision, decision_reason,
               event_id, created_at, updated_at
        FROM event_candidates
        WHERE candidate_id = ?
        "#,
    )
    .bind(candidate_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| candidate_from_row(&row)).transpose()
}

/// Load all candidates of one flyer region
pub async fn load_candidates_for_flyer(
    pool: &SqlitePool,
    flyer_id: Uuid,
) -> Result<Vec<EventCandidate>> {
    let rows = sqlx::query(
        r#"
        SELECT candidate_id, flyer_id, extraction_event_id, fields, confidences,
               source_excerpt, geocode, composite_score, decision, decision_reason,
               event_id, created_at, updated_at
        FROM event_candidates
        WHERE flyer_id = ?
        ORDER BY extraction_event_id
        "#,
    )
    .bind(flyer_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(candidate_from_row).collect()
}

/// Load all candidates of a submission, across its flyer regions
pub async fn load_candidates_for_submission(
    pool: &SqlitePool,
    submission_id: Uuid,
) -> Result<Vec<EventCandidate>> {
    let rows = sqlx::query(
        r#"
        SELECT c.candidate_id, c.flyer_id, c.extraction_event_id, c.fields, c.confidences,
               c.source_excerpt, c.geocode, c.composite_score, c.decision, c.decision_reason,
               c.event_id, c.created_at, c.updated_at
        FROM event_candidates c
        JOIN flyer_regions f ON f.flyer_id = c.flyer_id
        WHERE f.submission_id = ?
        ORDER BY f.region_id, c.extraction_event_id
        "#,
    )
    .bind(submission_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(candidate_from_row).collect()
}

/// Candidates parked for a human reviewer
pub async fn count_needing_review(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM event_candidates WHERE decision = 'needs_review'",
    )
    .fetch_one(pool)
    .await?;

    Ok(count)
}

fn candidate_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<EventCandidate> {
    let candidate_id: String = row.get("candidate_id");
    let candidate_id = Uuid::parse_str(&candidate_id)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse candidate_id: {}", e)))?;

    let flyer_id: String = row.get("flyer_id");
    let flyer_id = Uuid::parse_str(&flyer_id)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse flyer_id: {}", e)))?;

    let fields: String = row.get("fields");
    let fields: ExtractedFields = serde_json::from_str(&fields)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to deserialize fields: {}", e)))?;

    let confidences: String = row.get("confidences");
    let confidences: FieldConfidences = serde_json::from_str(&confidences).map_err(|e| {
        corkboard_common::Error::Internal(format!("Failed to deserialize confidences: {}", e))
    })?;

    let geocode: Option<String> = row.get("geocode");
    let geocode: Option<GeocodeResult> = geocode
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to deserialize geocode: {}", e)))?;

    let decision: Option<String> = row.get("decision");
    let decision = match decision {
        Some(d) => Some(Decision::parse(&d).ok_or_else(|| {
            corkboard_common::Error::Internal(format!("Unknown decision: {}", d))
        })?),
        None => None,
    };

    let event_id: Option<String> = row.get("event_id");
    let event_id = event_id
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse event_id: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(EventCandidate {
        candidate_id,
        flyer_id,
        extraction_event_id: row.get("extraction_event_id"),
        fields,
        confidences,
        source_excerpt: row.get("source_excerpt"),
        geocode,
        composite_score: row.get("composite_score"),
        decision,
        decision_reason: row.get("decision_reason"),
        event_id,
        created_at,
        updated_at,
    })
}
