//! Submission lifecycle state machine
//!
//! A submission progresses through:
//! uploaded → processing → parsed → moderating → geocoding → done,
//! with `error` reachable from any non-terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Submission lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Image accepted, nothing processed yet
    Uploaded,
    /// Extraction call in flight
    Processing,
    /// Flyer regions and event candidates persisted
    Parsed,
    /// Per-candidate moderation + decision running
    Moderating,
    /// Per-candidate geocoding running
    Geocoding,
    /// Pipeline finished (possibly with partial results)
    Done,
    /// Terminal failure
    Error,
}

impl SubmissionStatus {
    /// Stable lowercase name used in storage and payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Uploaded => "uploaded",
            SubmissionStatus::Processing => "processing",
            SubmissionStatus::Parsed => "parsed",
            SubmissionStatus::Moderating => "moderating",
            SubmissionStatus::Geocoding => "geocoding",
            SubmissionStatus::Done => "done",
            SubmissionStatus::Error => "error",
        }
    }

    /// Parse a stored status name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(SubmissionStatus::Uploaded),
            "processing" => Some(SubmissionStatus::Processing),
            "parsed" => Some(SubmissionStatus::Parsed),
            "moderating" => Some(SubmissionStatus::Moderating),
            "geocoding" => Some(SubmissionStatus::Geocoding),
            "done" => Some(SubmissionStatus::Done),
            "error" => Some(SubmissionStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub submission_id: Uuid,
    pub old_status: SubmissionStatus,
    pub new_status: SubmissionStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One uploaded photograph and its processing lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Unique submission identifier
    pub submission_id: Uuid,

    /// Current lifecycle state
    pub status: SubmissionStatus,

    /// How the caller refers to the uploaded image (path or storage key)
    pub source_label: Option<String>,

    /// Failure description when status is `error`
    pub error_message: Option<String>,

    /// When the submission was created
    pub created_at: DateTime<Utc>,

    /// When the submission was last written
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    /// Create a new submission in the `uploaded` state
    pub fn new(source_label: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            submission_id: Uuid::new_v4(),
            status: SubmissionStatus::Uploaded,
            source_label,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new lifecycle state
    pub fn transition_to(&mut self, new_status: SubmissionStatus) -> StatusTransition {
        let transition = StatusTransition {
            submission_id: self.submission_id,
            old_status: self.status,
            new_status,
            transitioned_at: Utc::now(),
        };
        self.status = new_status;
        self.updated_at = transition.transitioned_at;
        transition
    }

    /// Transition to `error` with a caller-visible message
    pub fn fail(&mut self, message: impl Into<String>) -> StatusTransition {
        self.error_message = Some(message.into());
        self.transition_to(SubmissionStatus::Error)
    }

    /// Check if the submission is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            SubmissionStatus::Done | SubmissionStatus::Error
        )
    }
}
