//! Submission status payload
//!
//! Status always reflects the furthest completed stage; a submission with
//! some failed candidates still reads `done` with partial results.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use corkboard_common::{Error, Result};

use crate::db;
use crate::models::SubmissionStatus;

/// Caller-facing step name for a lifecycle state
///
/// Coarser than the stored state: `parsed` already reads as `moderating`
/// because that is what runs next without further input.
pub fn step_for_status(status: SubmissionStatus) -> &'static str {
    match status {
        SubmissionStatus::Uploaded => "uploaded",
        SubmissionStatus::Processing => "extracting",
        SubmissionStatus::Parsed | SubmissionStatus::Moderating => "moderating",
        SubmissionStatus::Geocoding => "geocoding",
        SubmissionStatus::Done => "done",
        SubmissionStatus::Error => "error",
    }
}

/// Status object for one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStatusPayload {
    pub submission_id: Uuid,
    pub status: String,
    pub step: String,
    pub flyers: Vec<FlyerPayload>,
    pub candidates: Vec<CandidatePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlyerPayload {
    pub flyer_id: Uuid,
    pub region_id: String,
    pub detection_confidence: f64,
    pub candidate_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    pub candidate_id: Uuid,
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Assemble the status payload for one submission
pub async fn submission_status(
    pool: &SqlitePool,
    submission_id: Uuid,
) -> Result<SubmissionStatusPayload> {
    let submission = db::submissions::load_submission(pool, submission_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Submission {} not found", submission_id)))?;

    let flyers = db::flyers::load_flyers_for_submission(pool, submission_id).await?;
    let candidates = db::candidates::load_candidates_for_submission(pool, submission_id).await?;

    let flyer_payloads = flyers
        .iter()
        .map(|flyer| FlyerPayload {
            flyer_id: flyer.flyer_id,
            region_id: flyer.region_id.clone(),
            detection_confidence: flyer.detection_confidence,
            candidate_count: candidates
                .iter()
                .filter(|c| c.flyer_id == flyer.flyer_id)
                .count(),
        })
        .collect();

    let candidate_payloads = candidates
        .iter()
        .map(|candidate| CandidatePayload {
            candidate_id: candidate.candidate_id,
            title: candidate.fields.title.clone(),
            decision: candidate.decision.map(|d| d.to_string()),
            score: candidate.composite_score,
            event_id: candidate.event_id,
            reason: candidate.decision_reason.clone(),
        })
        .collect();

    Ok(SubmissionStatusPayload {
        submission_id,
        status: submission.status.to_string(),
        step: step_for_status(submission.status).to_string(),
        flyers: flyer_payloads,
        candidates: candidate_payloads,
        error: submission.error_message,
    })
}
