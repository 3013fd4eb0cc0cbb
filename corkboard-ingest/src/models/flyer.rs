//! Flyer region model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One corner of a flyer boundary polygon, in image-relative coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolygonPoint {
    pub x: f64,
    pub y: f64,
}

/// One detected poster/flyer sub-image within a submission
///
/// Created once by the extraction stage; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlyerRegion {
    /// Unique flyer identifier
    pub flyer_id: Uuid,

    /// Owning submission
    pub submission_id: Uuid,

    /// Region identifier assigned by the extraction capability
    ///
    /// Stable across re-runs of the same extraction output; together with
    /// `submission_id` it keys the idempotent upsert.
    pub region_id: String,

    /// 4-point boundary polygon
    pub polygon: Vec<PolygonPoint>,

    /// Rotation of the flyer within the photograph, degrees
    pub rotation_deg: Option<f64>,

    /// Detector confidence in [0,1]
    pub detection_confidence: f64,

    /// Free-text extractor notes for this region
    pub notes: Option<String>,

    /// When the region was persisted
    pub created_at: DateTime<Utc>,
}
