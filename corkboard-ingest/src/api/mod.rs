//! Boundary payloads consumed by serving layers
//!
//! Everything here reads through the relational store; the pipeline is
//! never invoked from this module. Payload field names are stable
//! contract, not internal naming.

pub mod calendar;
pub mod feed;
pub mod review;
pub mod status;

pub use calendar::event_ics;
pub use feed::{event_detail, event_feed};
pub use review::{apply_manual_decision, statistics, unpublish, IngestStatistics};
pub use status::{submission_status, SubmissionStatusPayload};
