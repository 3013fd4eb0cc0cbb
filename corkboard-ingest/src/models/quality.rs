//! Candidate quality scoring
//!
//! The confidence scorer is a pure function: a six-dimension quality-factor
//! vector collapses into a single weighted score in [0,1] that drives the
//! auto-publish decision.

use serde::{Deserialize, Serialize};

/// Fixed factor weights; they sum to 1.0
const WEIGHT_COMPLETENESS: f64 = 0.25;
const WEIGHT_DATETIME: f64 = 0.20;
const WEIGHT_VENUE: f64 = 0.20;
const WEIGHT_CONTACT: f64 = 0.15;
const WEIGHT_PROFESSIONALISM: f64 = 0.15;
const WEIGHT_READABILITY: f64 = 0.05;

/// Quality factor vector, each dimension in [0,1]
///
/// Callers guarantee the range; the scorer does not clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityFactors {
    /// How complete the event details are
    pub completeness: f64,
    /// Confidence in the extracted date/time
    pub datetime: f64,
    /// Confidence in the extracted venue
    pub venue: f64,
    /// Whether contact information is present
    pub contact: f64,
    /// How professional the flyer looks
    pub professionalism: f64,
    /// How readable the flyer text is
    pub readability: f64,
}

impl QualityFactors {
    /// Weighted composite score
    pub fn composite_score(&self) -> f64 {
        self.completeness * WEIGHT_COMPLETENESS
            + self.datetime * WEIGHT_DATETIME
            + self.venue * WEIGHT_VENUE
            + self.contact * WEIGHT_CONTACT
            + self.professionalism * WEIGHT_PROFESSIONALISM
            + self.readability * WEIGHT_READABILITY
    }
}

/// Moderation verdict for one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Factor vector behind the score, when the moderator produced one
    pub factors: Option<QualityFactors>,

    /// Whether the candidate is appropriate for public listing
    pub appropriate: bool,

    /// Moderator's reason, present when the candidate is flagged
    pub reason: Option<String>,

    /// Composite quality score in [0,1]
    pub score: f64,
}

impl QualityAssessment {
    /// Build an assessment whose score is the weighted factor sum
    pub fn from_factors(factors: QualityFactors, appropriate: bool, reason: Option<String>) -> Self {
        let score = factors.composite_score();
        Self {
            factors: Some(factors),
            appropriate,
            reason,
            score,
        }
    }

    /// Neutral assessment used when moderation fails outright
    pub fn neutral() -> Self {
        Self {
            factors: None,
            appropriate: true,
            reason: None,
            score: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factors(values: [f64; 6]) -> QualityFactors {
        QualityFactors {
            completeness: values[0],
            datetime: values[1],
            venue: values[2],
            contact: values[3],
            professionalism: values[4],
            readability: values[5],
        }
    }

    #[test]
    fn score_spans_the_unit_interval() {
        assert_eq!(factors([0.0; 6]).composite_score(), 0.0);
        assert!((factors([1.0; 6]).composite_score() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn each_weight_is_applied() {
        assert!((factors([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).composite_score() - 0.25).abs() < 1e-9);
        assert!((factors([0.0, 1.0, 0.0, 0.0, 0.0, 0.0]).composite_score() - 0.20).abs() < 1e-9);
        assert!((factors([0.0, 0.0, 1.0, 0.0, 0.0, 0.0]).composite_score() - 0.20).abs() < 1e-9);
        assert!((factors([0.0, 0.0, 0.0, 1.0, 0.0, 0.0]).composite_score() - 0.15).abs() < 1e-9);
        assert!((factors([0.0, 0.0, 0.0, 0.0, 1.0, 0.0]).composite_score() - 0.15).abs() < 1e-9);
        assert!((factors([0.0, 0.0, 0.0, 0.0, 0.0, 1.0]).composite_score() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn score_is_monotonic_in_every_factor() {
        let base = [0.3, 0.4, 0.5, 0.6, 0.2, 0.1];
        let base_score = factors(base).composite_score();

        for i in 0..6 {
            let mut raised = base;
            raised[i] += 0.3;
            assert!(
                factors(raised).composite_score() > base_score,
                "raising factor {} did not raise the score",
                i
            );
        }
    }

    #[test]
    fn representative_vector_scores_as_expected() {
        let score = factors([0.8, 0.7, 0.7, 0.5, 0.8, 0.8]).composite_score();
        assert!((score - 0.715).abs() < 1e-9);
    }

    #[test]
    fn neutral_assessment_passes_moderation_at_half_score() {
        let neutral = QualityAssessment::neutral();
        assert!(neutral.appropriate);
        assert_eq!(neutral.score, 0.5);
        assert!(neutral.factors.is_none());
    }
}
