//! Published event feed
//!
//! The listing is a GeoJSON FeatureCollection so map clients can render it
//! directly; events whose venue has no stored location ride along with a
//! null geometry. Only approved events are ever visible here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use corkboard_common::{Error, Result};

use crate::db;
use crate::db::events::EventQuery;
use crate::models::{Event, Venue};

/// GeoJSON feature collection of published events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Option<Geometry>,
    pub properties: EventProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    /// [longitude, latitude], GeoJSON axis order
    pub coordinates: [f64; 2],
}

/// Event attributes carried on each feature
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventProperties {
    pub event_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_ts: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_via: Option<String>,
}

/// Single-event detail payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetailPayload {
    #[serde(flatten)]
    pub properties: EventProperties,
    pub canonical_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<VenuePayload>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenuePayload {
    pub venue_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geocode_confidence: Option<f64>,
}

/// Build the published-event feed
pub async fn event_feed(pool: &SqlitePool, query: &EventQuery) -> Result<FeatureCollection> {
    let rows = db::events::list_approved_events(pool, query).await?;

    let features = rows
        .into_iter()
        .map(|(event, venue)| to_feature(&event, venue.as_ref()))
        .collect();

    Ok(FeatureCollection {
        kind: "FeatureCollection".to_string(),
        features,
    })
}

/// Load the detail payload for one published event
pub async fn event_detail(pool: &SqlitePool, event_id: Uuid) -> Result<EventDetailPayload> {
    let (event, venue) = db::events::load_approved_event_with_venue(pool, event_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Event {} not found", event_id)))?;

    Ok(EventDetailPayload {
        properties: to_properties(&event, venue.as_ref()),
        canonical_key: event.canonical_key.clone(),
        venue: venue.map(|v| VenuePayload {
            venue_id: v.venue_id,
            name: v.name,
            address_line: v.address_line,
            city: v.city,
            state: v.state,
            latitude: v.latitude,
            longitude: v.longitude,
            geocode_confidence: v.geocode_confidence,
        }),
        created_at: event.created_at,
    })
}

fn to_feature(event: &Event, venue: Option<&Venue>) -> Feature {
    let geometry = venue.and_then(|v| match (v.longitude, v.latitude) {
        (Some(longitude), Some(latitude)) => Some(Geometry {
            kind: "Point".to_string(),
            coordinates: [longitude, latitude],
        }),
        _ => None,
    });

    Feature {
        kind: "Feature".to_string(),
        geometry,
        properties: to_properties(event, venue),
    }
}

fn to_properties(event: &Event, venue: Option<&Venue>) -> EventProperties {
    EventProperties {
        event_id: event.event_id,
        title: event.title.clone(),
        description: event.description.clone(),
        start_ts: event.start_ts,
        end_ts: event.end_ts,
        venue_name: venue.map(|v| v.name.clone()),
        venue_address: venue.and_then(|v| v.address_line.clone()),
        price: event.price.clone(),
        organizer: event.organizer.clone(),
        url: event.url.clone(),
        category: event.category.clone(),
        quality_score: event.quality_score,
        published_via: event.published_via.map(|v| v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModerationState, PublishedVia};
    use chrono::Duration;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    fn venue(name: &str, latitude: Option<f64>, longitude: Option<f64>) -> Venue {
        let mut venue = Venue::minimal(name, Some("123 Main St".to_string()));
        venue.latitude = latitude;
        venue.longitude = longitude;
        venue.geocode_confidence = latitude.map(|_| 0.9);
        venue
    }

    fn event(title: &str, key: &str, venue_id: Option<Uuid>) -> Event {
        let now = Utc::now();
        Event {
            event_id: Uuid::new_v4(),
            canonical_key: key.to_string(),
            title: title.to_string(),
            description: Some("Live music".to_string()),
            start_ts: now + Duration::days(5),
            end_ts: None,
            venue_id,
            price: Some("$10".to_string()),
            organizer: None,
            url: None,
            category: Some("music".to_string()),
            moderation_state: ModerationState::Approved,
            quality_score: Some(0.85),
            published_via: Some(PublishedVia::Auto),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_feed_carries_point_geometry() {
        let pool = test_pool().await;

        let located = venue("The Blue Room", Some(47.6062), Some(-122.3321));
        db::venues::save_venue(&pool, &located).await.unwrap();
        db::events::insert_event(&pool, &event("Jazz Night", "jazz night_a", Some(located.venue_id)))
            .await
            .unwrap();
        db::events::insert_event(&pool, &event("Open Mic", "open mic_b", None))
            .await
            .unwrap();

        let feed = event_feed(&pool, &EventQuery::default()).await.unwrap();
        assert_eq!(feed.kind, "FeatureCollection");
        assert_eq!(feed.features.len(), 2);

        let jazz = feed
            .features
            .iter()
            .find(|f| f.properties.title == "Jazz Night")
            .unwrap();
        let geometry = jazz.geometry.as_ref().unwrap();
        assert_eq!(geometry.kind, "Point");
        // GeoJSON order: longitude first
        assert_eq!(geometry.coordinates, [-122.3321, 47.6062]);
        assert_eq!(jazz.properties.venue_name.as_deref(), Some("The Blue Room"));

        let open_mic = feed
            .features
            .iter()
            .find(|f| f.properties.title == "Open Mic")
            .unwrap();
        assert!(open_mic.geometry.is_none());
    }

    #[tokio::test]
    async fn test_detail_includes_venue_and_key() {
        let pool = test_pool().await;

        let v = venue("The Blue Room", None, None);
        db::venues::save_venue(&pool, &v).await.unwrap();
        let e = event("Jazz Night", "jazz night_c", Some(v.venue_id));
        db::events::insert_event(&pool, &e).await.unwrap();

        let detail = event_detail(&pool, e.event_id).await.unwrap();
        assert_eq!(detail.canonical_key, "jazz night_c");
        assert_eq!(detail.venue.as_ref().unwrap().name, "The Blue Room");
        assert_eq!(detail.properties.title, "Jazz Night");

        let json = serde_json::to_string(&detail).unwrap();
        assert!(json.contains("\"eventId\""));
        assert!(json.contains("\"canonicalKey\""));
    }

    #[tokio::test]
    async fn test_detail_hides_unapproved_events() {
        let pool = test_pool().await;

        let mut pending = event("Hidden", "hidden_d", None);
        pending.moderation_state = ModerationState::Pending;
        db::events::insert_event(&pool, &pending).await.unwrap();

        assert!(matches!(
            event_detail(&pool, pending.event_id).await,
            Err(Error::NotFound(_))
        ));
    }
}
