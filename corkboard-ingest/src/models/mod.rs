//! Data models for corkboard-ingest
//!
//! Domain types for the flyer ingestion pipeline: submissions and their
//! lifecycle, detected flyer regions, extracted event candidates, quality
//! assessments, geocode results, venues, and published events.

pub mod candidate;
pub mod event;
pub mod flyer;
pub mod geocode;
pub mod quality;
pub mod report;
pub mod submission;
pub mod venue;

pub use candidate::{Decision, EventCandidate, ExtractedFields, FieldConfidences};
pub use event::{DedupeLink, Event, ModerationState, PublishedVia, UnpublishReason};
pub use flyer::{FlyerRegion, PolygonPoint};
pub use geocode::{AddressComponents, GeocodeResult};
pub use quality::{QualityAssessment, QualityFactors};
pub use report::{CandidateOutcome, FlyerSummary, PipelineReport};
pub use submission::{StatusTransition, Submission, SubmissionStatus};
pub use venue::Venue;
