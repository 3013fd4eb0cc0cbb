//! # Corkboard Common Library
//!
//! Shared code for the Corkboard services including:
//! - Error types (Error enum, Result alias)
//! - Event types (PipelineEvent enum) and the EventBus
//! - Configuration and data folder resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, PipelineEvent};
