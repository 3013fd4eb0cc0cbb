//! Event types for the Corkboard event system
//!
//! Provides shared event definitions and the EventBus used to broadcast
//! pipeline progress to in-process subscribers (CLI progress display,
//! future push transports).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Corkboard pipeline events
///
/// Events are broadcast via EventBus and can be serialized for transmission.
/// Status, decision and reason payloads are plain strings so that this enum
/// stays independent of the ingest crate's domain types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Submission moved to a new lifecycle state
    ///
    /// Emitted on every transition, including the move to `error`.
    SubmissionStatusChanged {
        /// Submission UUID
        submission_id: Uuid,
        /// State before the transition
        old_status: String,
        /// State after the transition
        new_status: String,
        /// When the transition happened
        timestamp: DateTime<Utc>,
    },

    /// Extraction finished and its output was persisted
    ExtractionCompleted {
        /// Submission UUID
        submission_id: Uuid,
        /// Number of flyer regions detected
        flyer_count: usize,
        /// Number of event candidates extracted
        candidate_count: usize,
        /// Overall image quality reported by the extractor
        image_quality: Option<String>,
        /// When extraction completed
        timestamp: DateTime<Utc>,
    },

    /// The decision engine ruled on one candidate
    CandidateDecided {
        /// Submission UUID
        submission_id: Uuid,
        /// Candidate UUID
        candidate_id: Uuid,
        /// Terminal decision (published / blocked / needs_review)
        decision: String,
        /// Composite quality score that drove the decision
        score: f64,
        /// When the decision was made
        timestamp: DateTime<Utc>,
    },

    /// A candidate was promoted into a public event
    EventPublished {
        /// Event UUID
        event_id: Uuid,
        /// Canonical dedup key of the event
        canonical_key: String,
        /// "auto" or "manual"
        published_via: String,
        /// When the event was published
        timestamp: DateTime<Utc>,
    },

    /// A published event was taken down
    EventUnpublished {
        /// Event UUID
        event_id: Uuid,
        /// Takedown reason (spam / duplicate / bad_location / inappropriate)
        reason: String,
        /// When the event was unpublished
        timestamp: DateTime<Utc>,
    },

    /// Submission processing failed terminally
    SubmissionFailed {
        /// Submission UUID
        submission_id: Uuid,
        /// Failure description surfaced to the caller
        message: String,
        /// When the failure occurred
        timestamp: DateTime<Utc>,
    },
}

/// Event bus for broadcasting pipeline events to all subscribers
///
/// Uses tokio broadcast channels. Events emitted while no subscriber is
/// listening are dropped; subscribers that fall behind lose the oldest
/// buffered events first.
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        let rx = self.tx.subscribe();
        tracing::debug!(
            subscribers = self.tx.receiver_count(),
            "New event bus subscriber"
        );
        rx
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Pipeline progress is advisory; processing never depends on a
    /// subscriber being present.
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let submission_id = Uuid::new_v4();
        bus.emit_lossy(PipelineEvent::SubmissionStatusChanged {
            submission_id,
            old_status: "uploaded".to_string(),
            new_status: "processing".to_string(),
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            PipelineEvent::SubmissionStatusChanged {
                submission_id: id,
                old_status,
                new_status,
                ..
            } => {
                assert_eq!(id, submission_id);
                assert_eq!(old_status, "uploaded");
                assert_eq!(new_status, "processing");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_not_fatal() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);

        // emit() reports the absence, emit_lossy() swallows it
        assert!(bus
            .emit(PipelineEvent::SubmissionFailed {
                submission_id: Uuid::new_v4(),
                message: "no listeners".to_string(),
                timestamp: Utc::now(),
            })
            .is_err());
        bus.emit_lossy(PipelineEvent::SubmissionFailed {
            submission_id: Uuid::new_v4(),
            message: "still fine".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = PipelineEvent::EventPublished {
            event_id: Uuid::new_v4(),
            canonical_key: "jazz night_2026-07-15".to_string(),
            published_via: "auto".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"EventPublished\""));
        assert!(json.contains("jazz night_2026-07-15"));
    }
}
