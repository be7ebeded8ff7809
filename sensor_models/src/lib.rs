//! `sensor_models` — Detector payload adapters and sensor mount transforms.
//!
//! # Module layout
//! - [`payloads`] — Native detector messages (leg poses, image boxes, sound sources)
//! - [`adapters`] — `DetectionAdapter` trait and one implementation per modality
//! - [`mount`]    — Static sensor mount table implementing `CoordinateTransform`

pub mod adapters;
pub mod mount;
pub mod payloads;

pub use adapters::{adapter_for, AdapterConfig, AdapterError, AdapterSet, DetectionAdapter};
pub use mount::{SensorMount, StaticTransforms};
pub use payloads::{
    BoundingBox, PoseArray, RawDetectionRecord, RawPayload, SoundSource, SoundSourceRecord,
};

use serde::{Deserialize, Serialize};

/// Sensor-side configuration: adapter parameters and mount poses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSetup {
    pub adapters: AdapterConfig,
    pub mounts: Vec<SensorMount>,
}

impl Default for SensorSetup {
    fn default() -> Self {
        Self {
            adapters: AdapterConfig::default(),
            mounts: SensorMount::defaults(),
        }
    }
}

impl SensorSetup {
    /// Mount table resolving every configured frame into the base frame.
    pub fn transforms(&self) -> StaticTransforms {
        StaticTransforms::new(fusion_core::types::BASE_FRAME, &self.mounts)
    }
}
