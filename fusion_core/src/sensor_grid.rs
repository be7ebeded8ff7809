//! Per-modality occupancy grid: detection history plus a binary Bayes
//! filter over a robot-centred raster.
//!
//! # Processing steps per tick
//! 1. [`SensorGrid::ingest`]: sensor-frame detections → base frame → `current`
//! 2. [`SensorGrid::predict`]: `past` moved by the robot's ego-motion →
//!    `predicted`, rasterized as the prior
//! 3. [`SensorGrid::bayes_update`]: prior × likelihood of `current` →
//!    posterior, then `past := current`
//!
//! # Likelihood footprint
//! A detection spreads a Gaussian over (range, bearing), evaluated in the
//! detection's local radial/tangential axes: the radial width is
//! `stdev.range` and the tangential width is `range · stdev.angle`, both
//! inflated by half a cell. The peak stays on the detection even when the
//! bearing is very uncertain. Only cells on the detection's side of the
//! robot receive weight.
//!
//! The footprint is scaled so the best cell gets weight 1; a detection
//! therefore always lands fully in some cell regardless of where it falls
//! within it. Footprints of several detections combine by noisy-OR:
//! `g = 1 − Π (1 − g_d)`.
//!
//! # Update
//! With `P_D` the target detection probability and `P_FA` the false
//! positive probability:
//! - `L_h = P_D·g + (1 − P_D)(1 − g)`
//! - `L_f = P_FA·g + (1 − P_FA)(1 − g)`
//! - `post = prior·L_h / (prior·L_h + (1 − prior)·L_f)`, floored at
//!   `free` and clipped to 1.
//!
//! Cells outside the FOV mask are always `unknown`.

use crate::{
    config::{FusionConfig, ModalitySettings},
    error::{ConfigError, ConsistencyError, SensorFault},
    grid::{GridGeometry, OccupancyGrid},
    motion::MotionPredictor,
    transform::CoordinateTransform,
    types::{
        CartesianPose, CellProbability, DetectionBatch, FieldOfView, Modality,
        PolarPose, Velocity, BASE_FRAME,
    },
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Footprints are cut off beyond this many (inflated) standard deviations.
const FOOTPRINT_SIGMAS: f64 = 4.0;

/// Detection probabilities shared by every modality.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionModel {
    pub target_detection_probability: f64,
    pub false_positive_probability: f64,
}

impl DetectionModel {
    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            target_detection_probability: config.target_detection_probability,
            false_positive_probability: config.false_positive_probability,
        }
    }
}

/// The three detection sets a grid carries between ticks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSets {
    /// This tick's detections, base frame
    pub current: Vec<PolarPose>,
    /// `past` after ego-motion compensation (basis of the prior)
    pub predicted: Vec<PolarPose>,
    /// Last tick's `current`
    pub past: Vec<PolarPose>,
}

/// What happened to this tick's batch.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestReport {
    /// Batch transformed; `current` holds this many detections
    Accepted(usize),
    /// Transient fault; `current` is empty for this tick
    Degraded(SensorFault),
    /// Broken adapter/transform contract; `current` is empty for this tick
    Rejected(ConsistencyError),
}

/// Cell centre plus its FOV membership.
#[derive(Clone, Copy, Debug)]
struct Cell {
    centre: CartesianPose,
    in_fov: bool,
}

/// Rolling occupancy grid of one modality.
pub struct SensorGrid {
    modality: Modality,
    settings: ModalitySettings,
    model: DetectionModel,
    geometry: GridGeometry,
    cells: Vec<Cell>,
    prior: OccupancyGrid,
    posterior: OccupancyGrid,
    detections: DetectionSets,
    /// Elapsed time used by the last prediction (seconds)
    diff_time: f64,
}

impl SensorGrid {
    /// Create a grid with every cell at the modality's `unknown` prior.
    pub fn new(settings: ModalitySettings, geometry: GridGeometry, model: DetectionModel) -> Self {
        let fov = settings.fov;
        let cells = (0..geometry.len())
            .map(|idx| {
                let c = geometry.index_center(idx);
                Cell {
                    centre: c,
                    in_fov: fov.contains(c.x.hypot(c.y), c.y.atan2(c.x)),
                }
            })
            .collect();
        let unknown = settings.cell_probability.unknown;
        Self {
            modality: settings.modality,
            settings,
            model,
            geometry,
            cells,
            prior: OccupancyGrid::filled(geometry, unknown),
            posterior: OccupancyGrid::filled(geometry, unknown),
            detections: DetectionSets::default(),
            diff_time: 0.0,
        }
    }

    /// Build the grid of `modality` from configuration, or `None` when the
    /// modality is disabled.
    pub fn from_config(config: &FusionConfig, modality: Modality) -> Result<Option<Self>, ConfigError> {
        let Some(settings) = config.modality_settings(modality) else {
            return Ok(None);
        };
        let geometry = config.grid_geometry()?;
        Ok(Some(Self::new(
            settings,
            geometry,
            DetectionModel::from_config(config),
        )))
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    pub fn fov(&self) -> &FieldOfView {
        &self.settings.fov
    }

    pub fn cell_probability(&self) -> &CellProbability {
        &self.settings.cell_probability
    }

    pub fn posterior(&self) -> &OccupancyGrid {
        &self.posterior
    }

    pub fn prior(&self) -> &OccupancyGrid {
        &self.prior
    }

    pub fn detections(&self) -> &DetectionSets {
        &self.detections
    }

    pub fn diff_time(&self) -> f64 {
        self.diff_time
    }

    /// True if the cell at `index` lies inside the FOV mask.
    pub fn in_fov(&self, index: usize) -> bool {
        self.cells[index].in_fov
    }

    // -----------------------------------------------------------------------
    // Step 1: ingestion
    // -----------------------------------------------------------------------

    /// Replace `current` with `batch`, transformed into the base frame.
    ///
    /// Faults never escape: the report says what happened, and on any
    /// fault `current` is left empty for this tick.
    pub fn ingest(
        &mut self,
        batch: &DetectionBatch,
        transform: &dyn CoordinateTransform,
        timeout: Duration,
    ) -> IngestReport {
        self.detections.current.clear();

        let sensor_points: Vec<CartesianPose> =
            batch.detections.iter().map(|d| d.to_cartesian()).collect();

        let started = Instant::now();
        let result = transform.transform(&sensor_points, &batch.frame_id, BASE_FRAME, timeout);
        let result = match result {
            Ok(_) if started.elapsed() > timeout => Err(SensorFault::TransformTimeout {
                source_frame: batch.frame_id.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            other => other,
        };

        let base_points = match result {
            Ok(points) => points,
            Err(fault) => {
                tracing::warn!(modality = %self.modality, %fault, "dropping detection batch");
                return IngestReport::Degraded(fault);
            }
        };

        if base_points.len() != batch.detections.len() {
            let err = ConsistencyError::DetectionCountMismatch {
                modality: self.modality,
                expected: batch.detections.len(),
                actual: base_points.len(),
            };
            tracing::error!(%err, "transform broke the detection count contract");
            return IngestReport::Rejected(err);
        }

        let default_stdev = self.settings.stdev;
        self.detections.current = base_points
            .into_iter()
            .zip(&batch.detections)
            .map(|(p, d)| PolarPose::from_cartesian(p, d.stdev.unwrap_or(default_stdev)))
            .collect();
        IngestReport::Accepted(self.detections.current.len())
    }

    /// Empty `current` for a tick without usable input.
    pub fn clear_current(&mut self) {
        self.detections.current.clear();
    }

    // -----------------------------------------------------------------------
    // Step 2: prediction
    // -----------------------------------------------------------------------

    /// Move `past` by the inverse ego-motion into `predicted` and rasterize
    /// it as this tick's prior.
    pub fn predict(&mut self, velocity: &Velocity, elapsed: f64, motion: &MotionPredictor) {
        self.diff_time = motion.effective_elapsed(elapsed);
        self.detections.predicted = motion.predict(&self.detections.past, velocity, elapsed);

        let weights = self.detection_weights(&self.detections.predicted);
        let cp = self.settings.cell_probability;
        let cells = &self.cells;
        self.prior
            .cells
            .par_iter_mut()
            .zip(weights.par_iter())
            .enumerate()
            .for_each(|(idx, (prior, &g))| {
                *prior = if cells[idx].in_fov {
                    cp.unknown + (cp.human - cp.unknown) * g
                } else {
                    cp.unknown
                };
            });
    }

    // -----------------------------------------------------------------------
    // Step 3: Bayes update
    // -----------------------------------------------------------------------

    /// Combine the prior with the likelihood of `current`, then retire
    /// `current` into `past`.
    pub fn bayes_update(&mut self) {
        let weights = self.detection_weights(&self.detections.current);

        let cp = self.settings.cell_probability;
        let pd = self.model.target_detection_probability;
        let pfa = self.model.false_positive_probability;
        let cells = &self.cells;
        let prior = &self.prior.cells;
        let size = self.geometry.size;

        self.posterior
            .cells
            .par_chunks_mut(size)
            .enumerate()
            .for_each(|(row, out)| {
                for (col, post) in out.iter_mut().enumerate() {
                    let idx = row * size + col;
                    if !cells[idx].in_fov {
                        *post = cp.unknown;
                        continue;
                    }
                    let g = weights[idx];
                    let p = prior[idx];
                    let l_h = pd * g + (1.0 - pd) * (1.0 - g);
                    let l_f = pfa * g + (1.0 - pfa) * (1.0 - g);
                    let num = p * l_h;
                    let den = num + (1.0 - p) * l_f;
                    let updated = if den > 0.0 { num / den } else { p };
                    *post = updated.max(cp.free).clamp(0.0, 1.0);
                }
            });

        self.detections.past = self.detections.current.clone();
    }

    // -----------------------------------------------------------------------
    // Likelihood footprint
    // -----------------------------------------------------------------------

    /// Noisy-OR of the normalized footprints of `detections`, per cell.
    /// Detections outside the FOV are skipped and only cells inside it
    /// receive weight.
    fn detection_weights(&self, detections: &[PolarPose]) -> Vec<f64> {
        let mut miss = vec![1.0_f64; self.cells.len()];
        let mut footprint: Vec<(usize, f64)> = Vec::new();
        let half_cell = self.geometry.resolution / 2.0;
        let fov = &self.settings.fov;

        for d in detections.iter().filter(|d| fov.contains(d.range, d.bearing)) {
            let sigma_r = d.stdev.range.hypot(half_cell);
            let sigma_t = (d.range * d.stdev.angle).hypot(half_cell);
            let (sin_b, cos_b) = d.bearing.sin_cos();
            let at = d.to_cartesian();

            footprint.clear();
            let mut peak = 0.0_f64;
            for (idx, cell) in self.cells.iter().enumerate() {
                if !cell.in_fov {
                    continue;
                }
                let c = cell.centre;
                if c.x * cos_b + c.y * sin_b <= 0.0 {
                    continue;
                }
                let (dx, dy) = (c.x - at.x, c.y - at.y);
                let zr = (dx * cos_b + dy * sin_b) / sigma_r;
                if zr.abs() > FOOTPRINT_SIGMAS {
                    continue;
                }
                let zt = (dy * cos_b - dx * sin_b) / sigma_t;
                if zt.abs() > FOOTPRINT_SIGMAS {
                    continue;
                }
                let k = (-0.5 * (zr * zr + zt * zt)).exp();
                peak = peak.max(k);
                footprint.push((idx, k));
            }
            if peak <= 0.0 {
                continue;
            }
            for &(idx, k) in &footprint {
                miss[idx] *= 1.0 - (k / peak).min(1.0);
            }
        }
        miss.into_iter().map(|m| 1.0 - m).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotionConfig;
    use crate::transform::IdentityTransform;
    use crate::types::{Interval, PolarStdev, SensorDetection};
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn settings(fov: FieldOfView) -> ModalitySettings {
        ModalitySettings {
            modality: Modality::Leg,
            fov,
            stdev: PolarStdev {
                range: 0.1,
                angle: 1f64.to_radians(),
            },
            cell_probability: CellProbability::default(),
        }
    }

    fn wide_fov() -> FieldOfView {
        FieldOfView {
            angle: Interval::new(-std::f64::consts::PI, std::f64::consts::PI),
            range: Interval::new(0.0, 20.0),
        }
    }

    fn narrow_fov() -> FieldOfView {
        FieldOfView {
            angle: Interval::new((-45f64).to_radians(), 45f64.to_radians()),
            range: Interval::new(1.0, 10.0),
        }
    }

    fn grid(fov: FieldOfView) -> SensorGrid {
        let geometry = GridGeometry::new(20.0, 0.5).unwrap();
        SensorGrid::new(
            settings(fov),
            geometry,
            DetectionModel {
                target_detection_probability: 0.9,
                false_positive_probability: 0.01,
            },
        )
    }

    fn batch(detections: &[(f64, f64)]) -> DetectionBatch {
        DetectionBatch {
            modality: Modality::Leg,
            frame_id: BASE_FRAME.into(),
            stamp: 0.0,
            detections: detections
                .iter()
                .map(|&(r, b)| SensorDetection::new(r, b))
                .collect(),
        }
    }

    fn run_tick(g: &mut SensorGrid, detections: &[(f64, f64)]) {
        let report = g.ingest(&batch(detections), &IdentityTransform, Duration::from_millis(50));
        assert_eq!(report, IngestReport::Accepted(detections.len()));
        g.predict(&Velocity::ZERO, 0.1, &MotionPredictor::new(MotionConfig::default()));
        g.bayes_update();
    }

    fn argmax(grid: &OccupancyGrid) -> usize {
        let mut best = 0;
        for (i, &v) in grid.cells.iter().enumerate() {
            if v > grid.cells[best] {
                best = i;
            }
        }
        best
    }

    /// Grid after one tick with a single detection at (3, 0).
    fn single_detection(stdev: PolarStdev) -> SensorGrid {
        let mut g = grid(wide_fov());
        let mut b = batch(&[(3.0, 0.0)]);
        b.detections[0].stdev = Some(stdev);
        g.ingest(&b, &IdentityTransform, Duration::from_millis(50));
        g.predict(&Velocity::ZERO, 0.0, &MotionPredictor::new(MotionConfig::default()));
        g.bayes_update();
        g
    }

    #[test]
    fn peak_lands_on_the_detection() {
        for angle in [1f64.to_radians(), 1.0] {
            let g = single_detection(PolarStdev { range: 0.1, angle });
            let best = argmax(g.posterior());
            let peak = g.geometry().index_center(best);
            assert!(
                peak.distance(&CartesianPose::new(3.0, 0.0)) <= 0.5,
                "angle stdev {angle}: peak at ({}, {})",
                peak.x,
                peak.y
            );
            assert!(g.posterior().cells[best] > 0.9);
        }
    }

    #[test]
    fn wide_bearing_noise_stays_off_the_range_ring() {
        let g = single_detection(PolarStdev { range: 0.1, angle: 1.0 });
        let near = g.posterior().value_at(CartesianPose::new(2.75, 0.25)).unwrap();
        let ring = g.posterior().value_at(CartesianPose::new(2.75, -1.25)).unwrap();
        assert!(near > ring, "near {near}, ring {ring}");
        // Nothing behind the robot
        let behind = g.posterior().value_at(CartesianPose::new(-3.0, 0.25)).unwrap();
        assert!(behind < 0.1);
    }

    #[test]
    fn posterior_stays_in_unit_interval() {
        let mut g = grid(narrow_fov());
        let ticks: [&[(f64, f64)]; 4] = [
            &[(3.0, 0.1), (3.2, 0.12), (3.1, 0.11)],
            &[(3.0, 0.1), (6.0, -0.5)],
            &[],
            &[(9.9, 0.7), (1.0, -0.7)],
        ];
        for dets in ticks {
            run_tick(&mut g, dets);
            assert!(g.posterior().cells.iter().all(|p| (0.0..=1.0).contains(p)));
            assert!(g.prior().cells.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn random_inputs_keep_posterior_in_unit_interval() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let mut g = SensorGrid::new(
            settings(wide_fov()),
            GridGeometry::new(10.0, 0.5).unwrap(),
            DetectionModel {
                target_detection_probability: 0.99,
                false_positive_probability: 0.2,
            },
        );
        let motion = MotionPredictor::new(MotionConfig::default());
        for _ in 0..20 {
            let n = rng.gen_range(0..6);
            let mut b = batch(&[]);
            for _ in 0..n {
                let mut d = SensorDetection::new(rng.gen_range(0.0..12.0), rng.gen_range(-4.0..4.0));
                d.stdev = Some(PolarStdev {
                    range: rng.gen_range(0.0..3.0),
                    angle: rng.gen_range(0.0..1.5),
                });
                b.detections.push(d);
            }
            g.ingest(&b, &IdentityTransform, Duration::from_millis(50));
            let v = Velocity::new(rng.gen_range(-1.0..1.0), 0.0, rng.gen_range(-1.0..1.0));
            g.predict(&v, rng.gen_range(0.0..0.5), &motion);
            g.bayes_update();
            assert!(g.posterior().cells.iter().all(|p| (0.0..=1.0).contains(p)));
            assert!(g.prior().cells.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn outside_fov_is_always_unknown() {
        let mut g = grid(narrow_fov());
        run_tick(&mut g, &[(3.0, 0.2), (5.0, 2.0), (12.0, 0.0)]);
        run_tick(&mut g, &[(3.1, 0.2)]);
        let unknown = CellProbability::default().unknown;
        for idx in 0..g.geometry().len() {
            if !g.in_fov(idx) {
                assert_eq!(g.posterior().cells[idx], unknown);
            }
        }
    }

    #[test]
    fn detection_outside_fov_is_ignored() {
        let mut with = grid(narrow_fov());
        run_tick(&mut with, &[(4.0, 2.0)]);
        let mut without = grid(narrow_fov());
        run_tick(&mut without, &[]);
        assert_eq!(with.posterior(), without.posterior());

        let (row, col) = with
            .geometry()
            .cell_of(PolarPose::new(4.0, 2.0, settings(narrow_fov()).stdev).to_cartesian())
            .unwrap();
        assert_eq!(with.posterior().get(row, col), CellProbability::default().unknown);
    }

    #[test]
    fn empty_space_decays_to_free() {
        let mut g = grid(narrow_fov());
        run_tick(&mut g, &[]);
        let (row, col) = g.geometry().cell_of(CartesianPose::new(4.0, 0.3)).unwrap();
        assert_abs_diff_eq!(g.posterior().get(row, col), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn repeated_detection_raises_belief() {
        let mut g = grid(narrow_fov());
        let target = CartesianPose::new(4.1, 0.6);
        let det = PolarPose::from_cartesian(target, settings(narrow_fov()).stdev);
        run_tick(&mut g, &[(det.range, det.bearing)]);
        let first = g.posterior().value_at(target).unwrap();
        run_tick(&mut g, &[(det.range, det.bearing)]);
        let second = g.posterior().value_at(target).unwrap();
        assert!(first > 0.9);
        assert!(second > first);
        assert_eq!(g.detections().past.len(), 1);
    }

    #[test]
    fn prior_follows_ego_motion() {
        let mut g = grid(wide_fov());
        run_tick(&mut g, &[(4.1, 0.0)]);
        let motion = MotionPredictor::new(MotionConfig::default());
        g.clear_current();
        g.predict(&Velocity::new(1.0, 0.0, 0.0), 0.5, &motion);

        let moved = g.detections().predicted[0].to_cartesian();
        assert_abs_diff_eq!(moved.x, 3.6, epsilon = 1e-9);
        let prior_at_new = g.prior().value_at(CartesianPose::new(3.6, 0.1)).unwrap();
        let prior_at_old = g.prior().value_at(CartesianPose::new(4.1, 0.1)).unwrap();
        assert!(prior_at_new > prior_at_old);
        assert_abs_diff_eq!(g.diff_time(), 0.5);
    }

    struct DroppingTransform;

    impl CoordinateTransform for DroppingTransform {
        fn transform(
            &self,
            points: &[CartesianPose],
            _source: &str,
            _target: &str,
            _timeout: Duration,
        ) -> Result<Vec<CartesianPose>, SensorFault> {
            Ok(points.iter().skip(1).copied().collect())
        }
    }

    #[test]
    fn transform_failure_empties_current() {
        let mut g = grid(wide_fov());
        run_tick(&mut g, &[(3.0, 0.1)]);
        let mut b = batch(&[(3.0, 0.1)]);
        b.frame_id = "laser".into();
        let report = g.ingest(&b, &IdentityTransform, Duration::from_millis(50));
        assert!(matches!(
            report,
            IngestReport::Degraded(SensorFault::TransformUnavailable { .. })
        ));
        assert!(g.detections().current.is_empty());
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let mut g = grid(wide_fov());
        let report = g.ingest(
            &batch(&[(3.0, 0.1), (4.0, 0.2)]),
            &DroppingTransform,
            Duration::from_millis(50),
        );
        assert_eq!(
            report,
            IngestReport::Rejected(ConsistencyError::DetectionCountMismatch {
                modality: Modality::Leg,
                expected: 2,
                actual: 1,
            })
        );
        assert!(g.detections().current.is_empty());
    }
}
