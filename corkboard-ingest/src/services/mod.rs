//! Service modules for the flyer ingest pipeline
//!
//! Stage implementations (extraction, moderation, geocoding), the publish
//! decision engine, candidate promotion, and the orchestrator that runs a
//! submission through all of them.

pub mod decision;
pub mod extraction;
pub mod geocoding;
pub mod moderation;
pub mod pipeline;
pub mod promotion;

pub use decision::{DecisionEngine, DecisionOutcome};
pub use extraction::{
    DetectedEvent, DetectedFlyer, ExtractionError, FlyerDetection, FlyerExtractor,
    OpenAiVisionExtractor,
};
pub use geocoding::{GeocodeError, Geocoder, MapboxGeocoder, StubGeocoder};
pub use moderation::{CandidateModerator, HeuristicModerator, LlmModerator, ModerationError};
pub use pipeline::SubmissionPipeline;
pub use promotion::{PromotionError, Promoter};

/// Strips a Markdown code fence from model output, if present.
///
/// Vision and moderation models occasionally wrap their JSON in
/// ```` ```json ... ``` ```` despite instructions not to.
pub(crate) fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start();
        return rest
            .strip_suffix("```")
            .map(str::trim_end)
            .unwrap_or(rest);
    }
    trimmed
}
