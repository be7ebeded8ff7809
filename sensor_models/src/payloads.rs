//! Native detector payloads, as the detectors publish them.

use fusion_core::types::{CartesianPose, Modality};
use serde::{Deserialize, Serialize};

/// Cartesian leg positions from the laser leg detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseArray {
    pub frame_id: String,
    pub stamp: f64,
    pub poses: Vec<CartesianPose>,
}

/// Axis-aligned image box; `x`, `y` is the top-left corner in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }
}

/// Image-space detections (torso/face or periodic gesture).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetectionRecord {
    pub frame_id: String,
    pub stamp: f64,
    pub image_width: u32,
    pub image_height: u32,
    pub detections: Vec<BoundingBox>,
}

/// One localized sound source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoundSource {
    pub id: u32,
    /// Degrees, counter-clockwise from the array's forward axis
    pub azimuth: f64,
    pub power: f64,
}

/// Output of the microphone-array localizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoundSourceRecord {
    pub frame_id: String,
    pub stamp: f64,
    pub sources: Vec<SoundSource>,
}

/// Any detector payload, tagged by the detector that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawPayload {
    Legs(PoseArray),
    Torso(RawDetectionRecord),
    Sound(SoundSourceRecord),
    PeriodicGesture(RawDetectionRecord),
}

impl RawPayload {
    pub fn modality(&self) -> Modality {
        match self {
            RawPayload::Legs(_) => Modality::Leg,
            RawPayload::Torso(_) => Modality::Torso,
            RawPayload::Sound(_) => Modality::Sound,
            RawPayload::PeriodicGesture(_) => Modality::PeriodicGesture,
        }
    }

    pub fn stamp(&self) -> f64 {
        match self {
            RawPayload::Legs(p) => p.stamp,
            RawPayload::Torso(r) | RawPayload::PeriodicGesture(r) => r.stamp,
            RawPayload::Sound(s) => s.stamp,
        }
    }

    pub fn frame_id(&self) -> &str {
        match self {
            RawPayload::Legs(p) => &p.frame_id,
            RawPayload::Torso(r) | RawPayload::PeriodicGesture(r) => &r.frame_id,
            RawPayload::Sound(s) => &s.frame_id,
        }
    }
}
