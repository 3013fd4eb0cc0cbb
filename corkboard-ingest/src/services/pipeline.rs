//! Submission pipeline orchestrator
//!
//! Runs one submission end-to-end: extraction, persistence, per-candidate
//! moderation and decision, then per-candidate geocoding. Extraction is
//! the only stage whose failure is terminal for the submission; after it,
//! each candidate is isolated and the submission reaches `done` with
//! whatever subset succeeded. Storage failures are fatal at any point.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use corkboard_common::{Error, EventBus, PipelineEvent, Result};

use crate::config::IngestConfig;
use crate::db;
use crate::models::{
    CandidateOutcome, Decision, EventCandidate, FlyerRegion, FlyerSummary, GeocodeResult,
    PipelineReport, PublishedVia, QualityAssessment, Submission, SubmissionStatus, Venue,
};

use super::decision::DecisionEngine;
use super::extraction::{self, FlyerDetection, FlyerExtractor, OpenAiVisionExtractor};
use super::geocoding::{self, Geocoder, MapboxGeocoder, StubGeocoder};
use super::moderation::{CandidateModerator, LlmModerator};
use super::promotion::Promoter;

/// Orchestrates one submission through every pipeline stage
pub struct SubmissionPipeline {
    db: SqlitePool,
    extractor: Arc<dyn FlyerExtractor>,
    moderator: Arc<dyn CandidateModerator>,
    geocoder: Arc<dyn Geocoder>,
    decision_engine: DecisionEngine,
    promoter: Promoter,
    event_bus: Arc<EventBus>,
    geo_confidence_threshold: f64,
    max_image_bytes: usize,
}

impl SubmissionPipeline {
    /// Build a pipeline over explicit capability implementations
    pub fn new(
        db: SqlitePool,
        extractor: Arc<dyn FlyerExtractor>,
        moderator: Arc<dyn CandidateModerator>,
        geocoder: Arc<dyn Geocoder>,
        event_bus: Arc<EventBus>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            promoter: Promoter::new(db.clone(), event_bus.clone()),
            db,
            extractor,
            moderator,
            geocoder,
            decision_engine: DecisionEngine::new(config.auto_publish_threshold),
            event_bus,
            geo_confidence_threshold: config.geo_confidence_threshold,
            max_image_bytes: config.max_image_bytes,
        }
    }

    /// Build a pipeline with capabilities selected from configuration
    ///
    /// Extraction has no credential-free mode and requires the OpenAI key.
    /// Moderation uses the same key, falling back internally to the field
    /// heuristic; geocoding uses Mapbox when a key is configured and the
    /// deterministic stub otherwise. Selection happens once, here.
    pub fn from_config(
        db: SqlitePool,
        event_bus: Arc<EventBus>,
        config: &IngestConfig,
    ) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is required for flyer extraction".to_string()))?;

        let extractor = OpenAiVisionExtractor::new(
            api_key.clone(),
            config.openai_vision_model.clone(),
            Duration::from_secs(config.extraction_timeout_secs),
        )
        .map_err(|e| Error::Config(format!("Failed to build vision extractor: {}", e)))?;

        let moderator = LlmModerator::new(
            api_key,
            config.openai_moderation_model.clone(),
            Duration::from_secs(config.moderation_timeout_secs),
        )
        .map_err(|e| Error::Config(format!("Failed to build moderator: {}", e)))?;

        let geocoder: Arc<dyn Geocoder> = match &config.mapbox_api_key {
            Some(key) => {
                tracing::info!("Geocoding via Mapbox");
                Arc::new(
                    MapboxGeocoder::new(
                        key.clone(),
                        Duration::from_secs(config.geocoding_timeout_secs),
                    )
                    .map_err(|e| Error::Config(format!("Failed to build geocoder: {}", e)))?,
                )
            }
            None => {
                tracing::info!("No Mapbox key configured; geocoding via deterministic stub");
                Arc::new(StubGeocoder)
            }
        };

        Ok(Self::new(
            db,
            Arc::new(extractor),
            Arc::new(moderator),
            geocoder,
            event_bus,
            config,
        ))
    }

    /// Ingest one uploaded image and run the full pipeline over it
    ///
    /// Upload validation happens before any Submission exists; a rejected
    /// image leaves no trace. After that, a terminal extraction failure is
    /// reported through the returned report (submission in `error`), while
    /// a storage failure is returned as an error after a best-effort move
    /// of the submission to `error`.
    pub async fn ingest_image(
        &self,
        image: &[u8],
        source_label: Option<String>,
    ) -> Result<PipelineReport> {
        let mime_type = extraction::validate_image(image, self.max_image_bytes)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        let mut submission = Submission::new(source_label);
        db::submissions::save_submission(&self.db, &submission).await?;
        tracing::info!(
            submission_id = %submission.submission_id,
            mime_type = mime_type,
            image_bytes = image.len(),
            "Submission created"
        );

        match self.run(&mut submission, image, mime_type).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let message = e.to_string();
                if let Err(fail_err) = self.fail_submission(&mut submission, &message).await {
                    tracing::error!(
                        submission_id = %submission.submission_id,
                        error = %fail_err,
                        "Failed to record submission failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        submission: &mut Submission,
        image: &[u8],
        mime_type: &str,
    ) -> Result<PipelineReport> {
        let started_at = Utc::now();

        self.advance(submission, SubmissionStatus::Processing).await?;

        // Extraction runs exactly once; its failure is terminal
        let detection = match self.extractor.extract(image, mime_type).await {
            Ok(detection) => detection,
            Err(e) => {
                let message = format!("Extraction failed: {}", e);
                tracing::error!(
                    submission_id = %submission.submission_id,
                    error = %e,
                    "Extraction failed; submission is terminal"
                );
                self.fail_submission(submission, &message).await?;
                return Ok(PipelineReport {
                    submission_id: submission.submission_id,
                    status: submission.status,
                    flyers: Vec::new(),
                    candidates: Vec::new(),
                    started_at,
                    finished_at: Utc::now(),
                });
            }
        };

        let (flyers, mut candidates) = self.persist_detection(submission, &detection).await?;
        self.advance(submission, SubmissionStatus::Parsed).await?;
        self.event_bus.emit_lossy(PipelineEvent::ExtractionCompleted {
            submission_id: submission.submission_id,
            flyer_count: flyers.len(),
            candidate_count: candidates.len(),
            image_quality: detection.image_quality.clone(),
            timestamp: Utc::now(),
        });

        self.advance(submission, SubmissionStatus::Moderating).await?;
        let mut outcomes = Vec::with_capacity(candidates.len());
        for candidate in &mut candidates {
            let outcome = self.moderate_and_decide(submission.submission_id, candidate).await?;
            outcomes.push(outcome);
        }

        self.advance(submission, SubmissionStatus::Geocoding).await?;
        for (candidate, outcome) in candidates.iter().zip(outcomes.iter_mut()) {
            self.geocode_candidate(candidate, outcome).await?;
        }

        self.advance(submission, SubmissionStatus::Done).await?;

        let report = PipelineReport {
            submission_id: submission.submission_id,
            status: submission.status,
            flyers,
            candidates: outcomes,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            submission_id = %submission.submission_id,
            flyers = report.flyers.len(),
            candidates = report.candidates.len(),
            published = report.decided(Decision::Published),
            needs_review = report.decided(Decision::NeedsReview),
            blocked = report.decided(Decision::Blocked),
            failed = report.failed(),
            "Submission processing complete"
        );

        Ok(report)
    }

    /// Persist regions and candidates from the detection output
    ///
    /// Both writes key on extraction-assigned identifiers, so re-running
    /// the same output returns the previously stored rows instead of
    /// duplicating them.
    async fn persist_detection(
        &self,
        submission: &Submission,
        detection: &FlyerDetection,
    ) -> Result<(Vec<FlyerSummary>, Vec<EventCandidate>)> {
        let mut flyers = Vec::new();
        let mut candidates = Vec::new();

        for detected in &detection.flyers_detected {
            let region = FlyerRegion {
                flyer_id: Uuid::new_v4(),
                submission_id: submission.submission_id,
                region_id: detected.region_id.to_string(),
                polygon: detected.polygon.clone(),
                rotation_deg: detected.rotation_deg,
                detection_confidence: detected.confidence,
                notes: detected.notes.clone(),
                created_at: Utc::now(),
            };
            let flyer_id = db::flyers::save_flyer_region(&self.db, &region).await?;

            for event in &detected.events {
                let now = Utc::now();
                let mut candidate = EventCandidate {
                    candidate_id: Uuid::new_v4(),
                    flyer_id,
                    extraction_event_id: event.event_id.clone(),
                    fields: event.fields.clone(),
                    confidences: event.confidences,
                    source_excerpt: event.source_excerpt.clone(),
                    geocode: None,
                    composite_score: None,
                    decision: None,
                    decision_reason: None,
                    event_id: None,
                    created_at: now,
                    updated_at: now,
                };
                candidate.candidate_id =
                    db::candidates::save_candidate(&self.db, &candidate).await?;
                candidates.push(candidate);
            }

            flyers.push(FlyerSummary {
                flyer_id,
                region_id: region.region_id,
                detection_confidence: detected.confidence,
                candidate_count: detected.events.len(),
            });
        }

        tracing::debug!(
            submission_id = %submission.submission_id,
            flyers = flyers.len(),
            candidates = candidates.len(),
            "Detection output persisted"
        );

        Ok((flyers, candidates))
    }

    /// Moderate one candidate, rule on it, and promote if it published
    ///
    /// Capability failures are absorbed: a moderator error degrades to the
    /// neutral assessment, a promotion error leaves the decision standing
    /// with no event. Only storage failures propagate.
    async fn moderate_and_decide(
        &self,
        submission_id: Uuid,
        candidate: &mut EventCandidate,
    ) -> Result<CandidateOutcome> {
        let mut outcome = CandidateOutcome::new(candidate.candidate_id);

        let assessment = match self.moderator.moderate(&candidate.fields).await {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::warn!(
                    candidate_id = %candidate.candidate_id,
                    error = %e,
                    "Moderation failed; using neutral assessment"
                );
                QualityAssessment::neutral()
            }
        };

        let ruled = self.decision_engine.decide(&assessment);

        db::candidates::update_candidate_review(
            &self.db,
            candidate.candidate_id,
            assessment.score,
            ruled.decision,
            Some(&ruled.reason),
        )
        .await?;

        candidate.composite_score = Some(assessment.score);
        candidate.decision = Some(ruled.decision);
        candidate.decision_reason = Some(ruled.reason.clone());

        outcome.decision = Some(ruled.decision);
        outcome.composite_score = Some(assessment.score);

        tracing::info!(
            candidate_id = %candidate.candidate_id,
            decision = %ruled.decision,
            score = assessment.score,
            "Candidate decided"
        );
        self.event_bus.emit_lossy(PipelineEvent::CandidateDecided {
            submission_id,
            candidate_id: candidate.candidate_id,
            decision: ruled.decision.to_string(),
            score: assessment.score,
            timestamp: Utc::now(),
        });

        if ruled.decision == Decision::Published {
            match self.promoter.promote(candidate, PublishedVia::Auto).await {
                Ok(event_id) => {
                    candidate.event_id = Some(event_id);
                    outcome.event_id = Some(event_id);
                }
                Err(e) => {
                    tracing::warn!(
                        candidate_id = %candidate.candidate_id,
                        error = %e,
                        "Promotion failed; decision stands without an event"
                    );
                }
            }
        }

        Ok(outcome)
    }

    /// Geocode one candidate's address and feed the venue table
    ///
    /// Runs for every candidate regardless of decision. A provider failure
    /// or an address-less candidate costs only the location data.
    async fn geocode_candidate(
        &self,
        candidate: &EventCandidate,
        outcome: &mut CandidateOutcome,
    ) -> Result<()> {
        let Some(query) = geocoding::compose_query(
            candidate.fields.venue.as_deref(),
            candidate.fields.address.as_deref(),
            None,
            None,
            None,
            None,
        ) else {
            tracing::debug!(candidate_id = %candidate.candidate_id, "No address to geocode");
            return Ok(());
        };

        let geocode = match self.geocoder.geocode(&query).await {
            Ok(geocode) => geocode,
            Err(e) => {
                tracing::warn!(
                    candidate_id = %candidate.candidate_id,
                    address = %query,
                    error = %e,
                    "Geocoding failed; candidate keeps no location"
                );
                return Ok(());
            }
        };

        db::candidates::update_candidate_geocode(&self.db, candidate.candidate_id, &geocode)
            .await?;
        outcome.geocoded = true;

        if geocode.confidence >= self.geo_confidence_threshold {
            self.upsert_venue_location(candidate, &geocode).await?;
        } else {
            tracing::debug!(
                candidate_id = %candidate.candidate_id,
                confidence = geocode.confidence,
                "Geocode below venue threshold; venue untouched"
            );
        }

        Ok(())
    }

    async fn upsert_venue_location(
        &self,
        candidate: &EventCandidate,
        geocode: &GeocodeResult,
    ) -> Result<()> {
        let Some(name) = candidate
            .fields
            .venue
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return Ok(());
        };

        if let Some(venue) = db::venues::find_venue_by_name(&self.db, name).await? {
            let upgraded =
                db::venues::upgrade_venue_location(&self.db, venue.venue_id, geocode).await?;
            if upgraded {
                tracing::info!(
                    venue_id = %venue.venue_id,
                    confidence = geocode.confidence,
                    "Venue location upgraded"
                );
            } else {
                tracing::debug!(
                    venue_id = %venue.venue_id,
                    "Stored venue location has equal or better confidence"
                );
            }
            return Ok(());
        }

        let mut venue = Venue::minimal(name, candidate.fields.address.clone());
        venue.latitude = Some(geocode.latitude);
        venue.longitude = Some(geocode.longitude);
        venue.geocode_confidence = Some(geocode.confidence);
        venue.city = geocode.components.city.clone();
        venue.state = geocode.components.state.clone();
        venue.postal_code = geocode.components.postal_code.clone();
        venue.country = geocode.components.country.clone();
        db::venues::save_venue(&self.db, &venue).await?;
        tracing::info!(
            venue_id = %venue.venue_id,
            name = name,
            confidence = geocode.confidence,
            "Venue created with geocoded location"
        );
        Ok(())
    }

    async fn advance(&self, submission: &mut Submission, status: SubmissionStatus) -> Result<()> {
        let transition = submission.transition_to(status);
        db::submissions::save_submission(&self.db, submission).await?;

        tracing::info!(
            submission_id = %submission.submission_id,
            from = %transition.old_status,
            to = %transition.new_status,
            "Submission state changed"
        );
        self.event_bus.emit_lossy(PipelineEvent::SubmissionStatusChanged {
            submission_id: transition.submission_id,
            old_status: transition.old_status.to_string(),
            new_status: transition.new_status.to_string(),
            timestamp: transition.transitioned_at,
        });
        Ok(())
    }

    async fn fail_submission(&self, submission: &mut Submission, message: &str) -> Result<()> {
        let transition = submission.fail(message);
        db::submissions::save_submission(&self.db, submission).await?;

        self.event_bus.emit_lossy(PipelineEvent::SubmissionStatusChanged {
            submission_id: transition.submission_id,
            old_status: transition.old_status.to_string(),
            new_status: transition.new_status.to_string(),
            timestamp: transition.transitioned_at,
        });
        self.event_bus.emit_lossy(PipelineEvent::SubmissionFailed {
            submission_id: submission.submission_id,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
