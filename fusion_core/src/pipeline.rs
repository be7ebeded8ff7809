//! Cycle orchestrator: one fusion tick per control-loop period.
//!
//! # Processing steps per tick
//! 1. Read the latest odometry (stale or missing → robot assumed still)
//! 2. Take every enabled modality's pending detection batch
//! 3. Per modality: ingest → predict → Bayes update
//! 4. Fuse the posteriors into the human grid
//! 5. Carry the previous human grid into the current robot frame
//! 6. Extract local maxima and the global maximum
//! 7. Return an owned [`CycleOutput`]
//!
//! Transient faults never abort a tick; they are logged and counted in
//! [`CycleOutput::faults`].

use crate::{
    config::FusionConfig,
    error::{ConfigError, SensorFault},
    fusion::GridFusion,
    grid::OccupancyGrid,
    mailbox::PipelineInputs,
    maxima::{self, Maxima},
    motion::MotionPredictor,
    sensor_grid::{DetectionSets, IngestReport, SensorGrid},
    transform::CoordinateTransform,
    types::{Modality, ModalityMap, Velocity},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Per-tick fault tally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultCounts {
    pub missing_batches: u32,
    pub stale_batches: u32,
    pub transform_unavailable: u32,
    pub transform_timeouts: u32,
    pub count_mismatches: u32,
    /// Odometry present but older than `max_odometry_age`
    pub stale_odometry: u32,
}

impl FaultCounts {
    fn record(&mut self, fault: &SensorFault) {
        match fault {
            SensorFault::TransformUnavailable { .. } => self.transform_unavailable += 1,
            SensorFault::TransformTimeout { .. } => self.transform_timeouts += 1,
            SensorFault::MissingBatch => self.missing_batches += 1,
            SensorFault::StaleBatch { .. } => self.stale_batches += 1,
        }
    }

    /// Sum of every counter.
    pub fn total(&self) -> u32 {
        self.missing_batches
            + self.stale_batches
            + self.transform_unavailable
            + self.transform_timeouts
            + self.count_mismatches
            + self.stale_odometry
    }

    pub fn accumulate(&mut self, other: &FaultCounts) {
        self.missing_batches += other.missing_batches;
        self.stale_batches += other.stale_batches;
        self.transform_unavailable += other.transform_unavailable;
        self.transform_timeouts += other.transform_timeouts;
        self.count_mismatches += other.count_mismatches;
        self.stale_odometry += other.stale_odometry;
    }
}

/// Wall-clock cost of each phase, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleTimings {
    pub ingest_us: u64,
    pub predict_us: u64,
    pub update_us: u64,
    pub fuse_us: u64,
    pub maxima_us: u64,
}

/// Everything one tick produced. Owned copies only.
#[derive(Clone, Debug)]
pub struct CycleOutput {
    /// Time passed to [`FusionPipeline::tick`]
    pub stamp: f64,
    /// Seconds since the previous tick (0 on the first)
    pub elapsed: f64,
    /// Velocity used for motion compensation
    pub velocity: Velocity,
    /// Posterior of every enabled modality
    pub modality_grids: ModalityMap<OccupancyGrid>,
    pub human_grid: OccupancyGrid,
    pub maxima: Maxima,
    pub faults: FaultCounts,
    /// Detection sets per modality (only with `collect_debug`)
    pub debug: ModalityMap<DetectionSets>,
    /// Previous human grid moved into this tick's frame, for display
    pub human_predicted: OccupancyGrid,
    pub timings: CycleTimings,
    pub total_time_us: u64,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Owns every grid and runs the fusion cycle.
pub struct FusionPipeline {
    config: Arc<FusionConfig>,
    inputs: Arc<PipelineInputs>,
    transform: Arc<dyn CoordinateTransform>,
    grids: ModalityMap<SensorGrid>,
    fusion: GridFusion,
    motion: MotionPredictor,
    human_grid: OccupancyGrid,
    last_tick: Option<f64>,
}

impl FusionPipeline {
    /// Validate `config` and build one grid per enabled modality.
    pub fn new(
        config: Arc<FusionConfig>,
        inputs: Arc<PipelineInputs>,
        transform: Arc<dyn CoordinateTransform>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let geometry = config.grid_geometry()?;

        let mut grids = ModalityMap::new();
        for modality in Modality::ALL {
            if let Some(grid) = SensorGrid::from_config(&config, modality)? {
                grids.insert(modality, grid);
            }
        }

        let unknown = config.cell_probability.unknown;
        let fusion = GridFusion::new(geometry, config.fuse_strategy.clone(), unknown);
        fusion.check(&grids.map(|_, g| g.posterior()))?;

        tracing::info!(
            modalities = grids.len(),
            size = geometry.size,
            resolution = geometry.resolution,
            "fusion pipeline ready"
        );

        Ok(Self {
            motion: MotionPredictor::new(config.motion.clone()),
            human_grid: OccupancyGrid::filled(geometry, unknown),
            config,
            inputs,
            transform,
            grids,
            fusion,
            last_tick: None,
        })
    }

    pub fn config(&self) -> &Arc<FusionConfig> {
        &self.config
    }

    /// Shared input slots; hand clones of this to producers.
    pub fn inputs(&self) -> &Arc<PipelineInputs> {
        &self.inputs
    }

    pub fn grid(&self, modality: Modality) -> Option<&SensorGrid> {
        self.grids.get(modality)
    }

    pub fn human_grid(&self) -> &OccupancyGrid {
        &self.human_grid
    }

    /// Run one fusion cycle at time `now` (seconds).
    pub fn tick(&mut self, now: f64) -> CycleOutput {
        let start_total = Instant::now();
        let mut faults = FaultCounts::default();
        let mut timings = CycleTimings::default();

        let elapsed = match self.last_tick {
            Some(last) => now - last,
            None => 0.0,
        };
        self.last_tick = Some(now);

        // ----------------------------------------------------------------
        // Step 1: Odometry
        // ----------------------------------------------------------------
        let velocity = match self.inputs.latest_odometry() {
            Some(reading) if now - reading.stamp <= self.config.motion.max_odometry_age => {
                reading.velocity
            }
            Some(reading) => {
                tracing::debug!(age = now - reading.stamp, "odometry too old, assuming still");
                faults.stale_odometry += 1;
                Velocity::ZERO
            }
            None => Velocity::ZERO,
        };

        // ----------------------------------------------------------------
        // Step 2-3: Ingest, predict, update per modality
        // ----------------------------------------------------------------
        let timeout = self.config.transform_timeout();
        let max_age = self.config.update_rate;
        for (modality, grid) in self.grids.iter_mut() {
            let t0 = Instant::now();
            match self.inputs.take_detections(modality) {
                Some(batch) if now - batch.stamp > max_age => {
                    let fault = SensorFault::StaleBatch {
                        age: now - batch.stamp,
                        limit: max_age,
                    };
                    tracing::warn!(%modality, %fault, "ignoring detection batch");
                    faults.record(&fault);
                    grid.clear_current();
                }
                Some(batch) => match grid.ingest(&batch, self.transform.as_ref(), timeout) {
                    IngestReport::Accepted(_) => {}
                    IngestReport::Degraded(fault) => faults.record(&fault),
                    IngestReport::Rejected(_) => faults.count_mismatches += 1,
                },
                None => {
                    tracing::trace!(%modality, "no detection batch this tick");
                    faults.record(&SensorFault::MissingBatch);
                    grid.clear_current();
                }
            }
            timings.ingest_us += t0.elapsed().as_micros() as u64;

            let t0 = Instant::now();
            grid.predict(&velocity, elapsed, &self.motion);
            timings.predict_us += t0.elapsed().as_micros() as u64;

            let t0 = Instant::now();
            grid.bayes_update();
            timings.update_us += t0.elapsed().as_micros() as u64;
        }

        // ----------------------------------------------------------------
        // Step 4-5: Fusion and human-grid prediction
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let posteriors = self.grids.map(|_, g| g.posterior());
        let fused = match self.fusion.fuse(&posteriors) {
            Ok(grid) => grid,
            Err(err) => {
                // Geometry is checked at construction, so this is a bug
                tracing::error!(%err, "fusion rejected its own grids");
                OccupancyGrid::filled(self.fusion.geometry(), self.config.cell_probability.unknown)
            }
        };
        let human_predicted = self.motion.warp(
            &self.human_grid,
            &velocity,
            elapsed,
            self.config.cell_probability.unknown,
        );
        self.human_grid = fused;
        timings.fuse_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 6: Candidates
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let lm = &self.config.local_maxima;
        let maxima = maxima::extract(&self.human_grid, lm.connectivity, lm.min_probability);
        timings.maxima_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 7: Output
        // ----------------------------------------------------------------
        let debug = if self.config.collect_debug {
            self.grids.map(|_, g| g.detections().clone())
        } else {
            ModalityMap::new()
        };

        if faults.total() > 0 {
            tracing::debug!(?faults, "tick completed with faults");
        }

        CycleOutput {
            stamp: now,
            elapsed,
            velocity,
            modality_grids: self.grids.map(|_, g| g.posterior().clone()),
            human_grid: self.human_grid.clone(),
            maxima,
            faults,
            debug,
            human_predicted,
            timings,
            total_time_us: start_total.elapsed().as_micros() as u64,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
