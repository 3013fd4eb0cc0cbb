//! Flyer extraction via a vision-capable model
//!
//! Takes one validated bulletin-board photograph and returns every flyer
//! region the model can see, with the event details printed on each one.
//! Non-JSON or schema-mismatched model output is a hard failure here; the
//! orchestrator turns that into a terminal `error` for the submission.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ExtractedFields, FieldConfidences, PolygonPoint};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const USER_AGENT: &str = "Corkboard/0.1.0 (https://corkboard.app)";

/// Upload size cap, matching the vision API's own payload limit
pub const MAX_IMAGE_BYTES: usize = 18 * 1024 * 1024;

/// Image types the pipeline accepts, verified by magic bytes
pub const ACCEPTED_IMAGE_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Extraction stage errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Upload rejected before any capability call
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Vision API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Vision request timed out after {0}s")]
    Timeout(u64),

    /// Model returned something other than the detection JSON
    #[error("Malformed extraction output: {0}")]
    MalformedOutput(String),

    #[error("Invalid API key")]
    InvalidApiKey,
}

/// Validate raw upload bytes before the pipeline is entered
///
/// Checks the size cap and the magic bytes; the client-supplied content
/// type is never trusted. Returns the detected MIME type.
pub fn validate_image(bytes: &[u8], max_bytes: usize) -> Result<&'static str, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::InvalidImage("empty upload".to_string()));
    }

    if bytes.len() > max_bytes {
        return Err(ExtractionError::InvalidImage(format!(
            "image is {} bytes, limit is {} bytes",
            bytes.len(),
            max_bytes
        )));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| ExtractionError::InvalidImage("unrecognized file type".to_string()))?;

    let mime = kind.mime_type();
    if !ACCEPTED_IMAGE_TYPES.contains(&mime) {
        return Err(ExtractionError::InvalidImage(format!(
            "unsupported content type: {}",
            mime
        )));
    }

    Ok(mime)
}

/// Full detection output for one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlyerDetection {
    #[serde(default)]
    pub flyers_detected: Vec<DetectedFlyer>,
    #[serde(default)]
    pub total_regions: Option<i64>,
    /// Overall photo quality as judged by the model ("good", "blurry", ...)
    #[serde(default)]
    pub image_quality: Option<String>,
    #[serde(default)]
    pub processing_notes: Option<String>,
}

impl FlyerDetection {
    /// Total candidates across all detected regions
    pub fn candidate_count(&self) -> usize {
        self.flyers_detected.iter().map(|f| f.events.len()).sum()
    }
}

/// One detected flyer region within the photograph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFlyer {
    /// Region number assigned by the model, unique within the image
    pub region_id: i64,
    /// Detection confidence for the region boundary
    #[serde(default)]
    pub confidence: f64,
    /// Four corners in image-relative coordinates
    #[serde(default)]
    pub polygon: Vec<PolygonPoint>,
    #[serde(default)]
    pub rotation_deg: Option<f64>,
    /// Event proposals read off this flyer
    #[serde(default)]
    pub events: Vec<DetectedEvent>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One event proposal read off a flyer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedEvent {
    /// Identifier assigned by the model, unique within the image
    pub event_id: String,
    #[serde(default)]
    pub fields: ExtractedFields,
    #[serde(default)]
    pub confidences: FieldConfidences,
    #[serde(default)]
    pub source_excerpt: Option<String>,
}

/// Flyer extraction capability
#[async_trait::async_trait]
pub trait FlyerExtractor: Send + Sync {
    /// Detect flyer regions and read event details from one image
    async fn extract(&self, image: &[u8], mime_type: &str)
        -> Result<FlyerDetection, ExtractionError>;
}

const EXTRACTION_INSTRUCTIONS: &str = r#"You are analyzing a photograph of a community bulletin board.

Identify every distinct event flyer or poster visible in the photograph, then read the event details printed on each one. Respond with a single JSON object, no surrounding prose, in exactly this shape:

{
  "flyers_detected": [
    {
      "region_id": 1,
      "confidence": 0.95,
      "polygon": [{"x": 0.10, "y": 0.15}, {"x": 0.45, "y": 0.15}, {"x": 0.45, "y": 0.80}, {"x": 0.10, "y": 0.80}],
      "rotation_deg": 0,
      "notes": "top-left corner occluded by a pushpin",
      "events": [
        {
          "event_id": "1-1",
          "fields": {
            "title": "Jazz Night",
            "date_time": "July 15, 2026 7pm",
            "start_time": "19:00",
            "end_time": null,
            "venue": "The Blue Room",
            "address": "123 Main St, Springfield, IL",
            "price": "$10",
            "description": null,
            "organizer": null,
            "url": null,
            "contact_info": null,
            "category": "music",
            "age_restriction": null
          },
          "confidences": {"title": 0.98, "date_time": 0.90, "location": 0.85, "overall": 0.92},
          "source_excerpt": "JAZZ NIGHT * July 15 * 7pm * The Blue Room"
        }
      ]
    }
  ],
  "total_regions": 1,
  "image_quality": "good",
  "processing_notes": null
}

Rules:
- "polygon" lists the four corners of the flyer in image-relative coordinates (0.0 to 1.0), clockwise from top-left.
- Transcribe field values exactly as printed. Use null for anything not printed on the flyer; never guess.
- A flyer advertising several events yields several entries in "events", each with its own "event_id".
- "event_id" must be a string, unique within the image.
- All confidence values are between 0.0 and 1.0.
- "image_quality" is one of "good", "fair", "blurry", "dark", "unusable"."#;

/// Vision extractor backed by the OpenAI chat completions API
pub struct OpenAiVisionExtractor {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiVisionExtractor {
    pub fn new(
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ExtractionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            model,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl FlyerExtractor for OpenAiVisionExtractor {
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<FlyerDetection, ExtractionError> {
        let data_url = format!(
            "data:{};base64,{}",
            mime_type,
            base64::engine::general_purpose::STANDARD.encode(image)
        );

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": EXTRACTION_INSTRUCTIONS},
                    {"type": "image_url", "image_url": {"url": data_url, "detail": "high"}}
                ]
            }],
            "max_tokens": 4096,
            "temperature": 0.1,
            "response_format": {"type": "json_object"}
        });

        tracing::debug!(
            model = %self.model,
            image_bytes = image.len(),
            mime_type = mime_type,
            "Requesting flyer extraction"
        );

        let response = self
            .http_client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractionError::Timeout(self.timeout.as_secs())
                } else {
                    ExtractionError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 401 {
            return Err(ExtractionError::InvalidApiKey);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::ApiError(status.as_u16(), error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::MalformedOutput(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| {
                ExtractionError::MalformedOutput("response contained no choices".to_string())
            })?;

        let detection = parse_detection(content)?;

        tracing::info!(
            regions = detection.flyers_detected.len(),
            candidates = detection.candidate_count(),
            image_quality = detection.image_quality.as_deref().unwrap_or("unreported"),
            "Flyer extraction complete"
        );

        Ok(detection)
    }
}

/// Parse the model's detection JSON, tolerating a code fence wrapper
pub fn parse_detection(content: &str) -> Result<FlyerDetection, ExtractionError> {
    let json = super::strip_code_fences(content);
    serde_json::from_str(json).map_err(|e| ExtractionError::MalformedOutput(e.to_string()))
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
