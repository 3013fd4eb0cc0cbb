//! Pipeline run report
//!
//! Per-candidate control flow is result-driven, not exception-driven: every
//! candidate's trip through moderation, decision, promotion and geocoding
//! lands in one `CandidateOutcome`, and the orchestrator inspects the
//! collected list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::candidate::Decision;
use crate::models::submission::SubmissionStatus;

/// Outcome of one candidate within a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub candidate_id: Uuid,

    /// Decision reached this run, absent if the candidate failed first
    pub decision: Option<Decision>,

    /// Composite score behind the decision
    pub composite_score: Option<f64>,

    /// Event the candidate was promoted into this run
    pub event_id: Option<Uuid>,

    /// Whether the geocoding pass stored a result for this candidate
    pub geocoded: bool,

    /// Failure description when the candidate was skipped
    pub error: Option<String>,
}

impl CandidateOutcome {
    pub fn new(candidate_id: Uuid) -> Self {
        Self {
            candidate_id,
            decision: None,
            composite_score: None,
            event_id: None,
            geocoded: false,
            error: None,
        }
    }

    /// Outcome for a candidate that failed before any decision
    pub fn failed(candidate_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(candidate_id)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Flyer summary carried in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlyerSummary {
    pub flyer_id: Uuid,
    pub region_id: String,
    pub detection_confidence: f64,
    pub candidate_count: usize,
}

/// Full result of one pipeline run over a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub submission_id: Uuid,

    /// Final lifecycle state after the run
    pub status: SubmissionStatus,

    pub flyers: Vec<FlyerSummary>,
    pub candidates: Vec<CandidateOutcome>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    /// Candidates that reached the given decision this run
    pub fn decided(&self, decision: Decision) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.decision == Some(decision))
            .count()
    }

    /// Candidates skipped due to a stage failure
    pub fn failed(&self) -> usize {
        self.candidates.iter().filter(|c| !c.is_success()).count()
    }

    /// Events actually promoted this run
    pub fn published_events(&self) -> Vec<Uuid> {
        self.candidates.iter().filter_map(|c| c.event_id).collect()
    }
}
