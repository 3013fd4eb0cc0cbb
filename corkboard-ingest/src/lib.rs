//! corkboard-ingest library interface
//!
//! Turns a photo of a physical bulletin board into published public events:
//! flyer detection and field extraction, per-candidate moderation and
//! decision, venue geocoding, and idempotent promotion into the events
//! table. The serving layer consumes the functions under [`api`]; the
//! pipeline itself lives under [`services`].

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

pub use crate::config::IngestConfig;
pub use crate::services::SubmissionPipeline;

pub use corkboard_common::{Error, Result};
