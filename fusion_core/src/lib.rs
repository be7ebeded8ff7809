//! `fusion_core` — Human-presence occupancy grids.
//!
//! # Module layout
//! - [`types`]       — Modality tags, poses, velocity, detection batches
//! - [`config`]      — `FusionConfig` and per-modality settings
//! - [`error`]       — Config / sensor / consistency error taxonomy
//! - [`grid`]        — Robot-centred raster geometry
//! - [`motion`]      — Ego-motion compensation of poses and rasters
//! - [`transform`]   — Coordinate-transform collaborator trait
//! - [`sensor_grid`] — Per-modality Bayes filter
//! - [`fusion`]      — Cross-modality fusion operator
//! - [`maxima`]      — Local-maxima and global-maximum extraction
//! - [`mailbox`]     — Last-write-wins input slots
//! - [`pipeline`]    — Fusion cycle orchestrator
//! - [`snapshot`]    — Published message schema
//! - [`metrics`]     — RMSE and precision/recall against ground truth

pub mod config;
pub mod error;
pub mod fusion;
pub mod grid;
pub mod mailbox;
pub mod maxima;
pub mod metrics;
pub mod motion;
pub mod pipeline;
pub mod sensor_grid;
pub mod snapshot;
pub mod transform;
pub mod types;

pub use config::FusionConfig;
pub use error::{ConfigError, ConsistencyError, SensorFault};
pub use grid::{GridGeometry, OccupancyGrid};
pub use mailbox::{Mailbox, PipelineInputs};
pub use pipeline::{CycleOutput, FaultCounts, FusionPipeline};
pub use transform::CoordinateTransform;
pub use types::{
    CartesianPose, DetectionBatch, Modality, ModalityMap, OdometryReading, PolarPose,
    SensorDetection, Velocity,
};
