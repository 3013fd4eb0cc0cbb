//! Candidate moderation
//!
//! Turns one candidate's extracted fields into a QualityAssessment. The
//! live moderator asks a language model for a quality-factor vector and an
//! appropriateness call; on capability failure, timeout, or unparsable
//! output it falls back to the local heuristic rather than failing the
//! candidate. With no credential configured the heuristic runs alone.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::models::{ExtractedFields, QualityAssessment, QualityFactors};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const USER_AGENT: &str = "Corkboard/0.1.0 (https://corkboard.app)";

/// Moderation stage errors
///
/// Both shipped moderators absorb failures into the heuristic fallback, so
/// in practice these surface only from future implementations of the trait.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Moderation API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Moderation request timed out after {0}s")]
    Timeout(u64),
}

/// Candidate moderation capability
#[async_trait::async_trait]
pub trait CandidateModerator: Send + Sync {
    /// Assess one candidate's quality and appropriateness
    async fn moderate(&self, fields: &ExtractedFields)
        -> Result<QualityAssessment, ModerationError>;
}

/// Credential-free moderator
///
/// Scores from field presence alone: base 0.75, +0.10 for a title, +0.05
/// each for a venue and a date, capped at 1.0. Everything is considered
/// appropriate; this mode exists so the pipeline degrades rather than
/// stalls when no classification credential is configured.
pub struct HeuristicModerator;

impl HeuristicModerator {
    pub fn assess(fields: &ExtractedFields) -> QualityAssessment {
        let mut score: f64 = 0.75;
        if fields.trimmed_title().is_some() {
            score += 0.10;
        }
        if has_text(&fields.venue) {
            score += 0.05;
        }
        if has_text(&fields.date_time) {
            score += 0.05;
        }

        QualityAssessment {
            // Representative factors; the score above is authoritative
            factors: Some(QualityFactors {
                completeness: 0.8,
                datetime: 0.7,
                venue: 0.7,
                contact: 0.5,
                professionalism: 0.8,
                readability: 0.8,
            }),
            appropriate: true,
            reason: None,
            score: score.min(1.0),
        }
    }
}

#[async_trait::async_trait]
impl CandidateModerator for HeuristicModerator {
    async fn moderate(
        &self,
        fields: &ExtractedFields,
    ) -> Result<QualityAssessment, ModerationError> {
        Ok(Self::assess(fields))
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

const MODERATION_INSTRUCTIONS: &str = r#"You are moderating an event listing extracted from a photographed community flyer, deciding whether it is fit for a public event board.

Given the extracted fields below, respond with a single JSON object, no surrounding prose:

{
  "event_details_complete": 0.9,
  "datetime_confidence": 0.8,
  "venue_confidence": 0.7,
  "contact_info_present": 0.5,
  "professional_looking": 0.8,
  "text_readability": 0.9,
  "appropriate": true,
  "reason": null
}

All numeric values are between 0.0 and 1.0. Set "appropriate" to false only for listings that are spam, scams, adult content, or otherwise unfit for a general-audience community board, and then give a short "reason"."#;

/// Moderator backed by the OpenAI chat completions API
pub struct LlmModerator {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
}

impl LlmModerator {
    pub fn new(
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ModerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ModerationError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            model,
        })
    }

    async fn request_verdict(&self, fields: &ExtractedFields) -> Option<QualityAssessment> {
        let fields_json = match serde_json::to_string_pretty(fields) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize candidate fields for moderation");
                return None;
            }
        };

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": MODERATION_INSTRUCTIONS},
                {"role": "user", "content": fields_json}
            ],
            "max_tokens": 512,
            "temperature": 0.0,
            "response_format": {"type": "json_object"}
        });

        let response = match self
            .http_client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Moderation request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                error = %error_text,
                "Moderation API returned an error"
            );
            return None;
        }

        let chat: ChatResponse = match response.json().await {
            Ok(chat) => chat,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode moderation response");
                return None;
            }
        };

        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())?;

        parse_verdict(content)
    }
}

#[async_trait::async_trait]
impl CandidateModerator for LlmModerator {
    async fn moderate(
        &self,
        fields: &ExtractedFields,
    ) -> Result<QualityAssessment, ModerationError> {
        match self.request_verdict(fields).await {
            Some(assessment) => {
                tracing::debug!(
                    score = assessment.score,
                    appropriate = assessment.appropriate,
                    "Moderation verdict received"
                );
                Ok(assessment)
            }
            None => {
                tracing::warn!("Falling back to heuristic moderation");
                Ok(HeuristicModerator::assess(fields))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModerationVerdict {
    #[serde(default)]
    event_details_complete: f64,
    #[serde(default)]
    datetime_confidence: f64,
    #[serde(default)]
    venue_confidence: f64,
    #[serde(default)]
    contact_info_present: f64,
    #[serde(default)]
    professional_looking: f64,
    #[serde(default)]
    text_readability: f64,
    #[serde(default = "default_appropriate")]
    appropriate: bool,
    #[serde(default)]
    reason: Option<String>,
}

fn default_appropriate() -> bool {
    true
}

/// Parse the model's verdict JSON into an assessment
///
/// Returns None on any mismatch so the caller can take the heuristic path.
/// Factor values are clamped at this boundary; the scorer itself trusts
/// its inputs.
fn parse_verdict(content: &str) -> Option<QualityAssessment> {
    let json = super::strip_code_fences(content);
    let verdict: ModerationVerdict = match serde_json::from_str(json) {
        Ok(verdict) => verdict,
        Err(e) => {
            tracing::warn!(error = %e, "Unparsable moderation verdict");
            return None;
        }
    };

    let factors = QualityFactors {
        completeness: verdict.event_details_complete.clamp(0.0, 1.0),
        datetime: verdict.datetime_confidence.clamp(0.0, 1.0),
        venue: verdict.venue_confidence.clamp(0.0, 1.0),
        contact: verdict.contact_info_present.clamp(0.0, 1.0),
        professionalism: verdict.professional_looking.clamp(0.0, 1.0),
        readability: verdict.text_readability.clamp(0.0, 1.0),
    };

    Some(QualityAssessment::from_factors(
        factors,
        verdict.appropriate,
        verdict.reason,
    ))
}
