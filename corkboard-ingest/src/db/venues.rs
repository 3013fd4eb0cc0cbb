//! Venue database operations

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use corkboard_common::Result;

use crate::models::{GeocodeResult, Venue};

/// Insert a new venue
pub async fn save_venue(pool: &SqlitePool, venue: &Venue) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO venues (
            venue_id, name, address_line, city, state, postal_code, country,
            latitude, longitude, geocode_confidence, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(venue.venue_id.to_string())
    .bind(&venue.name)
    .bind(&venue.address_line)
    .bind(&venue.city)
    .bind(&venue.state)
    .bind(&venue.postal_code)
    .bind(&venue.country)
    .bind(venue.latitude)
    .bind(venue.longitude)
    .bind(venue.geocode_confidence)
    .bind(venue.created_at.to_rfc3339())
    .bind(venue.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Case-insensitive venue lookup by name
pub async fn find_venue_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Venue>> {
    let row = sqlx::query(
        r#"
        SELECT venue_id, name, address_line, city, state, postal_code, country,
               latitude, longitude, geocode_confidence, created_at, updated_at
        FROM venues
        WHERE name = ? COLLATE NOCASE
        LIMIT 1
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.map(|row| venue_from_row(&row)).transpose()
}

/// Upgrade a venue's location from a new geocode, compare-and-upgrade style
///
/// The write lands only when the new confidence strictly exceeds the stored
/// one (or none is stored). The guard lives in the UPDATE itself so two
/// candidates racing on the same venue cannot lose the better geocode.
/// Returns whether the row was written.
pub async fn upgrade_venue_location(
    pool: &SqlitePool,
    venue_id: Uuid,
    geocode: &GeocodeResult,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE venues
        SET latitude = ?,
            longitude = ?,
            geocode_confidence = ?,
            city = COALESCE(?, city),
            state = COALESCE(?, state),
            postal_code = COALESCE(?, postal_code),
            country = COALESCE(?, country),
            updated_at = ?
        WHERE venue_id = ?
          AND (geocode_confidence IS NULL OR geocode_confidence < ?)
        "#,
    )
    .bind(geocode.latitude)
    .bind(geocode.longitude)
    .bind(geocode.confidence)
    .bind(&geocode.components.city)
    .bind(&geocode.components.state)
    .bind(&geocode.components.postal_code)
    .bind(&geocode.components.country)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(venue_id.to_string())
    .bind(geocode.confidence)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load one venue by id
pub async fn load_venue(pool: &SqlitePool, venue_id: Uuid) -> Result<Option<Venue>> {
    let row = sqlx::query(
        r#"
        SELECT venue_id, name, address_line, city, state, postal_code, country,
               latitude, longitude, geocode_confidence, created_at, updated_at
        FROM venues
        WHERE venue_id = ?
        "#,
    )
    .bind(venue_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| venue_from_row(&row)).transpose()
}

/// Total venue count
pub async fn count_venues(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM venues")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

fn venue_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Venue> {
    let venue_id: String = row.get("venue_id");
    let venue_id = Uuid::parse_str(&venue_id)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse venue_id: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(Venue {
        venue_id,
        name: row.get("name"),
        address_line: row.get("address_line"),
        city: row.get("city"),
        state: row.get("state"),
        postal_code: row.get("postal_code"),
        country: row.get("country"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        geocode_confidence: row.get("geocode_confidence"),
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AddressComponents;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    fn geocode(confidence: f64) -> GeocodeResult {
        GeocodeResult {
            latitude: 41.8781,
            longitude: -87.6298,
            formatted_address: "Chicago, IL".to_string(),
            confidence,
            components: AddressComponents {
                city: Some("Chicago".to_string()),
                state: Some("IL".to_string()),
                postal_code: None,
                country: Some("US".to_string()),
            },
            raw: None,
        }
    }

    #[tokio::test]
    async fn test_name_lookup_is_case_insensitive() {
        let pool = test_pool().await;

        let venue = Venue::minimal("The Hideout", Some("1354 W Wabansia Ave".to_string()));
        save_venue(&pool, &venue).await.unwrap();

        let found = find_venue_by_name(&pool, "the hideout").await.unwrap();
        assert_eq!(found.map(|v| v.venue_id), Some(venue.venue_id));
    }

    #[tokio::test]
    async fn test_location_upgrade_requires_strictly_higher_confidence() {
        let pool = test_pool().await;

        let venue = Venue::minimal("The Hideout", None);
        save_venue(&pool, &venue).await.unwrap();

        // First confident geocode lands
        assert!(upgrade_venue_location(&pool, venue.venue_id, &geocode(0.8))
            .await
            .unwrap());

        // Equal confidence does not overwrite
        assert!(!upgrade_venue_location(&pool, venue.venue_id, &geocode(0.8))
            .await
            .unwrap());

        // Strictly higher does
        assert!(upgrade_venue_location(&pool, venue.venue_id, &geocode(0.95))
            .await
            .unwrap());

        let stored = load_venue(&pool, venue.venue_id).await.unwrap().unwrap();
        assert_eq!(stored.geocode_confidence, Some(0.95));
        assert_eq!(stored.latitude, Some(41.8781));
        assert_eq!(stored.city.as_deref(), Some("Chicago"));
    }
}
