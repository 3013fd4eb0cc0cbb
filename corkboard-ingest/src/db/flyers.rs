//! Flyer region database operations

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use corkboard_common::Result;

use crate::models::{FlyerRegion, PolygonPoint};

/// Save a flyer region, upserting on (submission_id, region_id)
///
/// Re-running extraction for a submission must not duplicate regions, so an
/// existing row for the same extraction-assigned region id is refreshed in
/// place. Returns the canonical flyer id (the existing one on conflict).
pub async fn save_flyer_region(pool: &SqlitePool, flyer: &FlyerRegion) -> Result<Uuid> {
    let polygon = serde_json::to_string(&flyer.polygon)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to serialize polygon: {}", e)))?;

    let existing: Option<String> = sqlx::query_scalar(
        "SELECT flyer_id FROM flyer_regions WHERE submission_id = ? AND region_id = ?",
    )
    .bind(flyer.submission_id.to_string())
    .bind(&flyer.region_id)
    .fetch_optional(pool)
    .await?;

    if let Some(existing_id) = existing {
        sqlx::query(
            r#"
            UPDATE flyer_regions
            SET polygon = ?, rotation_deg = ?, detection_confidence = ?, notes = ?
            WHERE flyer_id = ?
            "#,
        )
        .bind(&polygon)
        .bind(flyer.rotation_deg)
        .bind(flyer.detection_confidence)
        .bind(&flyer.notes)
        .bind(&existing_id)
        .execute(pool)
        .await?;

        return Uuid::parse_str(&existing_id).map_err(|e| {
            corkboard_common::Error::Internal(format!("Failed to parse flyer_id: {}", e))
        });
    }

    sqlx::query(
        r#"
        INSERT INTO flyer_regions (
            flyer_id, submission_id, region_id, polygon,
            rotation_deg, detection_confidence, notes, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(flyer.flyer_id.to_string())
    .bind(flyer.submission_id.to_string())
    .bind(&flyer.region_id)
    .bind(&polygon)
    .bind(flyer.rotation_deg)
    .bind(flyer.detection_confidence)
    .bind(&flyer.notes)
    .bind(flyer.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(flyer.flyer_id)
}

/// Load one flyer region by id
pub async fn load_flyer(pool: &SqlitePool, flyer_id: Uuid) -> Result<Option<FlyerRegion>> {
    let row = sqlx::query(
        r#"
        SELECT flyer_id, submission_id, region_id, polygon,
               rotation_deg, detection_confidence, notes, created_at
        FROM flyer_regions
        WHERE flyer_id = ?
        "#,
    )
    .bind(flyer_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(flyer_from_row).transpose()
}

/// Load all flyer regions of a submission, in region order
pub async fn load_flyers_for_submission(
    pool: &SqlitePool,
    submission_id: Uuid,
) -> Result<Vec<FlyerRegion>> {
    let rows = sqlx::query(
        r#"
        SELECT flyer_id, submission_id, region_id, polygon,
               rotation_deg, detection_confidence, notes, created_at
        FROM flyer_regions
        WHERE submission_id = ?
        ORDER BY region_id
        "#,
    )
    .bind(submission_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(flyer_from_row).collect()
}

fn flyer_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FlyerRegion> {
    let flyer_id: String = row.get("flyer_id");
    let flyer_id = Uuid::parse_str(&flyer_id)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse flyer_id: {}", e)))?;

    let submission_id: String = row.get("submission_id");
    let submission_id = Uuid::parse_str(&submission_id)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse submission_id: {}", e)))?;

    let polygon: String = row.get("polygon");
    let polygon: Vec<PolygonPoint> = serde_json::from_str(&polygon)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to deserialize polygon: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(FlyerRegion {
        flyer_id,
        submission_id,
        region_id: row.get("region_id"),
        polygon,
        rotation_deg: row.get("rotation_deg"),
        detection_confidence: row.get("detection_confidence"),
        notes: row.get("notes"),
        created_at,
    })
}
