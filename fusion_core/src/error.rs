//! Error taxonomy for the fusion core.
//!
//! - [`ConfigError`]: fatal, raised only while building the pipeline.
//! - [`SensorFault`]: transient, recovered inside a sensor grid for one tick.
//! - [`ConsistencyError`]: a broken adapter/transform contract; fatal to the
//!   current tick of one modality only.

use crate::types::Modality;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} = {value} is not a probability in [0, 1]")]
    ProbabilityOutOfRange { name: String, value: f64 },

    #[error("grid resolution must be positive, got {0}")]
    NonPositiveResolution(f64),

    #[error("{name}: min {min} exceeds max {max}")]
    InvalidRange { name: String, min: f64, max: f64 },

    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: String, value: f64 },

    #[error("neighbour connectivity must be 4 or 8, got {0}")]
    InvalidConnectivity(u8),

    #[error(
        "grid geometry of {modality} ({width}x{height} @ {resolution}) does not match the fusion grid ({expected_width}x{expected_height} @ {expected_resolution})"
    )]
    GridMismatch {
        modality: Modality,
        width: usize,
        height: usize,
        resolution: f64,
        expected_width: usize,
        expected_height: usize,
        expected_resolution: f64,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorFault {
    #[error("no transform from {source_frame} to {target_frame}: {reason}")]
    TransformUnavailable {
        source_frame: String,
        target_frame: String,
        reason: String,
    },

    #[error("transform lookup from {source_frame} exceeded its {timeout_ms} ms deadline")]
    TransformTimeout { source_frame: String, timeout_ms: u64 },

    #[error("no detection batch buffered for this tick")]
    MissingBatch,

    #[error("detection batch is {age:.3} s old (limit {limit:.3} s)")]
    StaleBatch { age: f64, limit: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    #[error("{modality}: {expected} detections in, {actual} after transform")]
    DetectionCountMismatch {
        modality: Modality,
        expected: usize,
        actual: usize,
    },
}
