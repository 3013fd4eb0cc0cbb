//! Review surface
//!
//! Operator actions consumed by the serving layer: manual candidate
//! decisions, event takedowns, and ingest statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use corkboard_common::{Error, EventBus, PipelineEvent, Result};

use crate::db;
use crate::models::{Decision, EventCandidate, PublishedVia, UnpublishReason};
use crate::services::{PromotionError, Promoter};

/// Apply an operator decision to one candidate
///
/// Only `published` and `blocked` are accepted; `needs_review` is the
/// automatic pipeline's parking state, not an operator action. A manual
/// publish runs the same idempotent promotion as the automatic path, tagged
/// `published_via = manual`. Returns the event id when the decision produced
/// (or reused) one.
pub async fn apply_manual_decision(
    pool: &SqlitePool,
    event_bus: &Arc<EventBus>,
    candidate_id: Uuid,
    decision: &str,
    reason: Option<&str>,
) -> Result<Option<Uuid>> {
    let decision = match decision {
        "published" => Decision::Published,
        "blocked" => Decision::Blocked,
        other => {
            return Err(Error::InvalidInput(format!(
                "Unknown decision: {} (expected published or blocked)",
                other
            )))
        }
    };

    let candidate = db::candidates::load_candidate(pool, candidate_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Candidate {} not found", candidate_id)))?;

    db::candidates::update_candidate_decision(pool, candidate_id, decision, reason).await?;
    tracing::info!(
        candidate_id = %candidate_id,
        decision = %decision,
        "Manual decision applied"
    );

    if let Some(submission_id) = owning_submission(pool, &candidate).await? {
        event_bus.emit_lossy(PipelineEvent::CandidateDecided {
            submission_id,
            candidate_id,
            decision: decision.to_string(),
            score: candidate.composite_score.unwrap_or(0.0),
            timestamp: Utc::now(),
        });
    }

    if decision != Decision::Published {
        return Ok(None);
    }

    let promoter = Promoter::new(pool.clone(), Arc::clone(event_bus));
    match promoter.promote(&candidate, PublishedVia::Manual).await {
        Ok(event_id) => Ok(Some(event_id)),
        Err(PromotionError::MissingTitle) => Err(Error::InvalidInput(
            "Candidate has no title to publish under".to_string(),
        )),
        Err(PromotionError::Storage(e)) => Err(e),
    }
}

/// Take a published event down
///
/// The reason must come from the fixed takedown set; free text is rejected
/// so stored reasons stay queryable.
pub async fn unpublish(
    pool: &SqlitePool,
    event_bus: &Arc<EventBus>,
    event_id: Uuid,
    reason: &str,
) -> Result<()> {
    let reason = UnpublishReason::parse(reason).ok_or_else(|| {
        Error::InvalidInput(format!(
            "Unknown unpublish reason: {} (expected spam, duplicate, bad_location or inappropriate)",
            reason
        ))
    })?;

    if !db::events::unpublish_event(pool, event_id).await? {
        return Err(Error::NotFound(format!("Event {} not found", event_id)));
    }

    tracing::info!(event_id = %event_id, reason = reason.as_str(), "Event unpublished");
    event_bus.emit_lossy(PipelineEvent::EventUnpublished {
        event_id,
        reason: reason.as_str().to_string(),
        timestamp: Utc::now(),
    });

    Ok(())
}

/// Operational counters for the review dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatistics {
    /// Submission counts keyed by lifecycle status
    pub submissions_by_status: BTreeMap<String, i64>,
    pub candidates_needing_review: i64,
    pub approved_events: i64,
    pub events_published_today: i64,
    pub venues: i64,
}

/// Collect ingest statistics
pub async fn statistics(pool: &SqlitePool) -> Result<IngestStatistics> {
    let submissions_by_status = db::submissions::count_by_status(pool)
        .await?
        .into_iter()
        .collect();

    Ok(IngestStatistics {
        submissions_by_status,
        candidates_needing_review: db::candidates::count_needing_review(pool).await?,
        approved_events: db::events::count_approved_events(pool).await?,
        events_published_today: db::events::count_published_today(pool).await?,
        venues: db::venues::count_venues(pool).await?,
    })
}

async fn owning_submission(pool: &SqlitePool, candidate: &EventCandidate) -> Result<Option<Uuid>> {
    Ok(db::flyers::load_flyer(pool, candidate.flyer_id)
        .await?
        .map(|f| f.submission_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Event, ExtractedFields, FieldConfidences, FlyerRegion, ModerationState, PolygonPoint,
        Submission,
    };

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    async fn seed_candidate(pool: &SqlitePool, title: Option<&str>) -> EventCandidate {
        let submission = Submission::new(Some("board.jpg".to_string()));
        db::submissions::save_submission(pool, &submission)
            .await
            .unwrap();

        let flyer = FlyerRegion {
            flyer_id: Uuid::new_v4(),
            submission_id: submission.submission_id,
            region_id: "flyer_1".to_string(),
            polygon: vec![
                PolygonPoint { x: 0.0, y: 0.0 },
                PolygonPoint { x: 1.0, y: 0.0 },
                PolygonPoint { x: 1.0, y: 1.0 },
                PolygonPoint { x: 0.0, y: 1.0 },
            ],
            rotation_deg: None,
            detection_confidence: 0.9,
            notes: None,
            created_at: Utc::now(),
        };
        db::flyers::save_flyer_region(pool, &flyer).await.unwrap();

        let now = Utc::now();
        let candidate = EventCandidate {
            candidate_id: Uuid::new_v4(),
            flyer_id: flyer.flyer_id,
            extraction_event_id: "event_1".to_string(),
            fields: ExtractedFields {
                title: title.map(str::to_string),
                date_time: Some("2030-07-15 19:00".to_string()),
                venue: Some("The Hall".to_string()),
                ..Default::default()
            },
            confidences: FieldConfidences::default(),
            source_excerpt: None,
            geocode: None,
            composite_score: None,
            decision: None,
            decision_reason: None,
            event_id: None,
            created_at: now,
            updated_at: now,
        };
        db::candidates::save_candidate(pool, &candidate).await.unwrap();
        db::candidates::update_candidate_review(
            pool,
            candidate.candidate_id,
            0.55,
            Decision::NeedsReview,
            Some("requires manual review (low quality score)"),
        )
        .await
        .unwrap();

        db::candidates::load_candidate(pool, candidate.candidate_id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_manual_publish_promotes_and_records_event() {
        let pool = test_pool().await;
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let candidate = seed_candidate(&pool, Some("Jazz Night")).await;

        let event_id = apply_manual_decision(
            &pool,
            &bus,
            candidate.candidate_id,
            "published",
            Some("verified with the venue"),
        )
        .await
        .unwrap()
        .expect("manual publish should yield an event");

        let event = db::events::load_event(&pool, event_id).await.unwrap().unwrap();
        assert_eq!(event.moderation_state, ModerationState::Approved);
        assert_eq!(event.published_via, Some(PublishedVia::Manual));
        assert_eq!(event.quality_score, Some(0.55));

        let stored = db::candidates::load_candidate(&pool, candidate.candidate_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.decision, Some(Decision::Published));
        assert_eq!(stored.decision_reason.as_deref(), Some("verified with the venue"));
        assert_eq!(stored.event_id, Some(event_id));

        match rx.recv().await.unwrap() {
            PipelineEvent::CandidateDecided { decision, .. } => {
                assert_eq!(decision, "published");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            PipelineEvent::EventPublished { published_via, .. } => {
                assert_eq!(published_via, "manual");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_manual_publish_reuses_the_event() {
        let pool = test_pool().await;
        let bus = Arc::new(EventBus::new(16));
        let candidate = seed_candidate(&pool, Some("Jazz Night")).await;

        let first = apply_manual_decision(&pool, &bus, candidate.candidate_id, "published", None)
            .await
            .unwrap();
        let second = apply_manual_decision(&pool, &bus, candidate.candidate_id, "published", None)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(db::events::count_approved_events(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_manual_block_does_not_promote() {
        let pool = test_pool().await;
        let bus = Arc::new(EventBus::new(16));
        let candidate = seed_candidate(&pool, Some("Jazz Night")).await;

        let outcome =
            apply_manual_decision(&pool, &bus, candidate.candidate_id, "blocked", Some("spam"))
                .await
                .unwrap();

        assert!(outcome.is_none());
        assert_eq!(db::events::count_approved_events(&pool).await.unwrap(), 0);

        let stored = db::candidates::load_candidate(&pool, candidate.candidate_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.decision, Some(Decision::Blocked));
    }

    #[tokio::test]
    async fn test_manual_decision_input_validation() {
        let pool = test_pool().await;
        let bus = Arc::new(EventBus::new(16));

        // Operators cannot park a candidate back into needs_review
        let candidate = seed_candidate(&pool, Some("Jazz Night")).await;
        assert!(matches!(
            apply_manual_decision(&pool, &bus, candidate.candidate_id, "needs_review", None).await,
            Err(Error::InvalidInput(_))
        ));

        assert!(matches!(
            apply_manual_decision(&pool, &bus, Uuid::new_v4(), "published", None).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_publish_requires_a_title() {
        let pool = test_pool().await;
        let bus = Arc::new(EventBus::new(16));
        let candidate = seed_candidate(&pool, None).await;

        assert!(matches!(
            apply_manual_decision(&pool, &bus, candidate.candidate_id, "published", None).await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(db::events::count_approved_events(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unpublish_removes_event_from_listing() {
        let pool = test_pool().await;
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();

        let now = Utc::now();
        let event = Event {
            event_id: Uuid::new_v4(),
            canonical_key: "jazz night_2030-07-15".to_string(),
            title: "Jazz Night".to_string(),
            description: None,
            start_ts: now + chrono::Duration::days(30),
            end_ts: None,
            venue_id: None,
            price: None,
            organizer: None,
            url: None,
            category: None,
            moderation_state: ModerationState::Approved,
            quality_score: Some(0.9),
            published_via: Some(PublishedVia::Auto),
            created_at: now,
            updated_at: now,
        };
        db::events::insert_event(&pool, &event).await.unwrap();

        unpublish(&pool, &bus, event.event_id, "duplicate").await.unwrap();

        assert!(db::events::load_approved_event_with_venue(&pool, event.event_id)
            .await
            .unwrap()
            .is_none());
        match rx.recv().await.unwrap() {
            PipelineEvent::EventUnpublished { reason, .. } => {
                assert_eq!(reason, "duplicate");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unpublish_input_validation() {
        let pool = test_pool().await;
        let bus = Arc::new(EventBus::new(16));

        assert!(matches!(
            unpublish(&pool, &bus, Uuid::new_v4(), "because").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            unpublish(&pool, &bus, Uuid::new_v4(), "spam").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_statistics_counts() {
        let pool = test_pool().await;
        let bus = Arc::new(EventBus::new(16));
        let candidate = seed_candidate(&pool, Some("Jazz Night")).await;

        apply_manual_decision(&pool, &bus, candidate.candidate_id, "published", None)
            .await
            .unwrap();

        let stats = statistics(&pool).await.unwrap();
        assert_eq!(stats.submissions_by_status.get("uploaded"), Some(&1));
        assert_eq!(stats.candidates_needing_review, 0);
        assert_eq!(stats.approved_events, 1);
        assert_eq!(stats.events_published_today, 1);
        assert_eq!(stats.venues, 1);

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"approvedEvents\""));
        assert!(json.contains("\"submissionsByStatus\""));
    }
}
