//! Detection adapters: native detector payloads → sensor-frame polar
//! detection batches.
//!
//! # Models
//! - **Legs**: cartesian poses, converted straight to polar
//! - **Camera** (torso, periodic gesture): pinhole model. With focal length
//!   `f = W / (2·tan(hfov/2))` in pixels and image width `W`:
//!   - bearing = `−atan((cx − W/2) / f)` (image right is robot right)
//!   - range = `feature_width · f / box_width`
//! - **Sound**: azimuth only; range is a nominal value carried with a wide
//!   per-detection range stdev so the footprint covers the whole bearing ray

use crate::payloads::{PoseArray, RawDetectionRecord, RawPayload, SoundSourceRecord};
use fusion_core::{
    config::FusionConfig,
    types::{DetectionBatch, Modality, ModalityMap, PolarPose, PolarStdev, SensorDetection},
    PipelineInputs,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("{adapter} adapter cannot read a {payload} payload")]
    WrongPayload { adapter: Modality, payload: Modality },

    #[error("no adapter configured for {0}")]
    NoAdapter(Modality),

    #[error("image width must be positive, got {0}")]
    EmptyImage(u32),
}

/// Converts one detector's payloads into a [`DetectionBatch`].
pub trait DetectionAdapter: Send + Sync {
    fn modality(&self) -> Modality;
    fn adapt(&self, payload: &RawPayload) -> Result<DetectionBatch, AdapterError>;
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Intrinsics of a detector camera plus the size of what it detects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    pub horizontal_fov_deg: f64,
    /// Physical width of the detected feature (meters)
    pub feature_width: f64,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            horizontal_fov_deg: 70.0,
            feature_width: 0.45,
        }
    }
}

impl CameraParams {
    fn focal_px(&self, image_width: f64) -> f64 {
        image_width / (2.0 * (self.horizontal_fov_deg.to_radians() / 2.0).tan())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundParams {
    /// Sources quieter than this are dropped
    pub min_power: f64,
    /// Range assigned to every source (meters)
    pub nominal_range: f64,
    /// Range stdev carried by every source (meters)
    pub range_stdev: f64,
    pub angle_stdev_deg: f64,
}

impl Default for SoundParams {
    fn default() -> Self {
        Self {
            min_power: 25.0,
            nominal_range: 3.0,
            range_stdev: 3.0,
            angle_stdev_deg: 5.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub torso_camera: CameraParams,
    pub periodic_camera: CameraParams,
    pub sound: SoundParams,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            torso_camera: CameraParams::default(),
            // Wider-angle gesture camera tracking a waving hand
            periodic_camera: CameraParams {
                horizontal_fov_deg: 65.0,
                feature_width: 0.3,
            },
            sound: SoundParams::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct LegAdapter;

impl LegAdapter {
    fn convert(&self, p: &PoseArray) -> DetectionBatch {
        let zero = PolarStdev {
            range: 0.0,
            angle: 0.0,
        };
        DetectionBatch {
            modality: Modality::Leg,
            frame_id: p.frame_id.clone(),
            stamp: p.stamp,
            detections: p
                .poses
                .iter()
                .map(|&c| {
                    let polar = PolarPose::from_cartesian(c, zero);
                    SensorDetection::new(polar.range, polar.bearing)
                })
                .collect(),
        }
    }
}

impl DetectionAdapter for LegAdapter {
    fn modality(&self) -> Modality {
        Modality::Leg
    }

    fn adapt(&self, payload: &RawPayload) -> Result<DetectionBatch, AdapterError> {
        match payload {
            RawPayload::Legs(p) => Ok(self.convert(p)),
            other => Err(AdapterError::WrongPayload {
                adapter: Modality::Leg,
                payload: other.modality(),
            }),
        }
    }
}

/// Bounding-box adapter shared by the torso and periodic-gesture detectors.
#[derive(Clone, Debug)]
pub struct CameraAdapter {
    modality: Modality,
    params: CameraParams,
}

impl CameraAdapter {
    pub fn torso(params: CameraParams) -> Self {
        Self {
            modality: Modality::Torso,
            params,
        }
    }

    pub fn periodic_gesture(params: CameraParams) -> Self {
        Self {
            modality: Modality::PeriodicGesture,
            params,
        }
    }

    fn convert(&self, record: &RawDetectionRecord) -> Result<DetectionBatch, AdapterError> {
        if record.image_width == 0 {
            return Err(AdapterError::EmptyImage(record.image_width));
        }
        let w = record.image_width as f64;
        let f = self.params.focal_px(w);
        let detections = record
            .detections
            .iter()
            .filter(|b| b.width > 0.0)
            .map(|b| {
                let bearing = -((b.center_x() - w / 2.0) / f).atan();
                let range = self.params.feature_width * f / b.width;
                SensorDetection::new(range, bearing)
            })
            .collect();
        Ok(DetectionBatch {
            modality: self.modality,
            frame_id: record.frame_id.clone(),
            stamp: record.stamp,
            detections,
        })
    }
}

impl DetectionAdapter for CameraAdapter {
    fn modality(&self) -> Modality {
        self.modality
    }

    fn adapt(&self, payload: &RawPayload) -> Result<DetectionBatch, AdapterError> {
        match (self.modality, payload) {
            (Modality::Torso, RawPayload::Torso(r))
            | (Modality::PeriodicGesture, RawPayload::PeriodicGesture(r)) => self.convert(r),
            (adapter, other) => Err(AdapterError::WrongPayload {
                adapter,
                payload: other.modality(),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SoundAdapter {
    params: SoundParams,
}

impl SoundAdapter {
    pub fn new(params: SoundParams) -> Self {
        Self { params }
    }

    fn convert(&self, record: &SoundSourceRecord) -> DetectionBatch {
        let stdev = PolarStdev {
            range: self.params.range_stdev,
            angle: self.params.angle_stdev_deg.to_radians(),
        };
        let detections: Vec<SensorDetection> = record
            .sources
            .iter()
            .filter(|s| s.power >= self.params.min_power)
            .map(|s| SensorDetection {
                range: self.params.nominal_range,
                bearing: s.azimuth.to_radians(),
                stdev: Some(stdev),
            })
            .collect();
        if detections.len() < record.sources.len() {
            tracing::trace!(
                dropped = record.sources.len() - detections.len(),
                "sound sources below min_power"
            );
        }
        DetectionBatch {
            modality: Modality::Sound,
            frame_id: record.frame_id.clone(),
            stamp: record.stamp,
            detections,
        }
    }
}

impl DetectionAdapter for SoundAdapter {
    fn modality(&self) -> Modality {
        Modality::Sound
    }

    fn adapt(&self, payload: &RawPayload) -> Result<DetectionBatch, AdapterError> {
        match payload {
            RawPayload::Sound(s) => Ok(self.convert(s)),
            other => Err(AdapterError::WrongPayload {
                adapter: Modality::Sound,
                payload: other.modality(),
            }),
        }
    }
}

/// Adapter implementation for `modality`.
pub fn adapter_for(modality: Modality, config: &AdapterConfig) -> Box<dyn DetectionAdapter> {
    match modality {
        Modality::Leg => Box::new(LegAdapter),
        Modality::Torso => Box::new(CameraAdapter::torso(config.torso_camera.clone())),
        Modality::Sound => Box::new(SoundAdapter::new(config.sound.clone())),
        Modality::PeriodicGesture => {
            Box::new(CameraAdapter::periodic_gesture(config.periodic_camera.clone()))
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter set
// ---------------------------------------------------------------------------

/// One adapter per enabled modality; routes payloads into the pipeline's
/// mailboxes.
pub struct AdapterSet {
    adapters: ModalityMap<Box<dyn DetectionAdapter>>,
}

impl AdapterSet {
    pub fn new(fusion: &FusionConfig, config: &AdapterConfig) -> Self {
        Self {
            adapters: fusion
                .enabled_modalities()
                .map(|m| (m, adapter_for(m, config)))
                .collect(),
        }
    }

    pub fn adapt(&self, payload: &RawPayload) -> Result<DetectionBatch, AdapterError> {
        let modality = payload.modality();
        self.adapters
            .get(modality)
            .ok_or(AdapterError::NoAdapter(modality))?
            .adapt(payload)
    }

    /// Adapt `payload` and post it. Payloads of disabled modalities and
    /// malformed payloads are logged and dropped.
    pub fn dispatch(&self, payload: &RawPayload, inputs: &PipelineInputs) -> bool {
        match self.adapt(payload) {
            Ok(batch) => inputs.post_detections(batch),
            Err(err) => {
                tracing::debug!(%err, "dropping payload");
                false
            }
        }
    }
}
