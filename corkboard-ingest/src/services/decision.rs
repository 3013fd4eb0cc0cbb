//! Auto-publish decision engine
//!
//! Collapses a candidate's QualityAssessment into one of three terminal
//! decisions. Geocoding never feeds into this rule; a candidate with no
//! location can still publish.

use crate::models::{Decision, QualityAssessment};

/// Score at or above which an appropriate candidate publishes unattended
pub const DEFAULT_AUTO_PUBLISH_THRESHOLD: f64 = 0.80;

/// Outcome of the publish rule for one candidate
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub decision: Decision,
    /// Human-readable reason stored alongside the decision
    pub reason: String,
}

/// Applies the publish rule to moderated candidates
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    auto_publish_threshold: f64,
}

impl DecisionEngine {
    pub fn new(auto_publish_threshold: f64) -> Self {
        Self {
            auto_publish_threshold,
        }
    }

    /// Evaluate the rule, in order:
    /// 1. Inappropriate candidates are blocked, carrying the moderator's reason.
    /// 2. Score at or above the threshold publishes.
    /// 3. Everything else is parked for a human reviewer.
    pub fn decide(&self, assessment: &QualityAssessment) -> DecisionOutcome {
        if !assessment.appropriate {
            return DecisionOutcome {
                decision: Decision::Blocked,
                reason: assessment
                    .reason
                    .clone()
                    .unwrap_or_else(|| "flagged as inappropriate".to_string()),
            };
        }

        if assessment.score >= self.auto_publish_threshold {
            DecisionOutcome {
                decision: Decision::Published,
                reason: "auto-published (high quality score)".to_string(),
            }
        } else {
            DecisionOutcome {
                decision: Decision::NeedsReview,
                reason: "requires manual review (low quality score)".to_string(),
            }
        }
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_PUBLISH_THRESHOLD)
    }
}
