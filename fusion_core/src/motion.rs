//! Ego-motion compensation.
//!
//! The grid frame is the robot itself, so when the robot moves by Δ
//! everything it saw last tick appears displaced by Δ⁻¹. Δ is built from
//! the velocity estimate and the elapsed time of a single tick; nothing is
//! integrated across ticks.
//!
//! The translation is applied along the mid-tick heading, which is exact
//! for straight motion and pure rotation and second-order accurate for arcs.

use crate::{
    config::MotionConfig,
    grid::OccupancyGrid,
    types::{CartesianPose, PolarPose, Velocity},
};
use nalgebra::{Isometry2, Point2, Rotation2, Vector2};

/// Rigid displacement of the robot over `elapsed` seconds, expressed in
/// the robot frame at the start of the interval.
pub fn displacement(velocity: &Velocity, elapsed: f64) -> Isometry2<f64> {
    let dtheta = velocity.angular * elapsed;
    let travel = Vector2::new(velocity.linear_x * elapsed, velocity.linear_y * elapsed);
    let translation = Rotation2::new(dtheta / 2.0) * travel;
    Isometry2::new(translation, dtheta)
}

/// Where a pose observed before the motion appears after it.
pub fn compensate_point(delta: &Isometry2<f64>, pose: CartesianPose) -> CartesianPose {
    let p = delta.inverse_transform_point(&Point2::new(pose.x, pose.y));
    CartesianPose::new(p.x, p.y)
}

/// Transform every pose by the inverse of the robot displacement.
///
/// Exact identity at `elapsed == 0`.
pub fn predict_poses(poses: &[PolarPose], velocity: &Velocity, elapsed: f64) -> Vec<PolarPose> {
    if elapsed == 0.0 {
        return poses.to_vec();
    }
    let delta = displacement(velocity, elapsed);
    poses
        .iter()
        .map(|p| {
            let moved = compensate_point(&delta, p.to_cartesian());
            PolarPose::from_cartesian(moved, p.stdev)
        })
        .collect()
}

/// Resample a raster after the robot moved. Each destination cell reads
/// the source cell it was seen in before the motion; cells whose source
/// falls off the raster take `fill`.
pub fn warp_grid(
    grid: &OccupancyGrid,
    velocity: &Velocity,
    elapsed: f64,
    fill: f64,
) -> OccupancyGrid {
    if elapsed == 0.0 {
        return grid.clone();
    }
    let delta = displacement(velocity, elapsed);
    let geometry = grid.geometry;
    let cells = (0..geometry.len())
        .map(|idx| {
            let now = geometry.index_center(idx);
            let before = delta.transform_point(&Point2::new(now.x, now.y));
            grid.value_at(CartesianPose::new(before.x, before.y))
                .unwrap_or(fill)
        })
        .collect();
    OccupancyGrid { geometry, cells }
}

/// Applies the configured motion policy before delegating to the pure
/// functions above.
#[derive(Clone, Debug)]
pub struct MotionPredictor {
    config: MotionConfig,
}

impl MotionPredictor {
    pub fn new(config: MotionConfig) -> Self {
        Self { config }
    }

    /// Elapsed time actually used for prediction: zero when motion is
    /// disabled or `elapsed` is non-positive, non-finite or implausibly long.
    pub fn effective_elapsed(&self, elapsed: f64) -> f64 {
        if !self.config.enable
            || !elapsed.is_finite()
            || elapsed <= 0.0
            || elapsed > self.config.max_elapsed_time
        {
            0.0
        } else {
            elapsed
        }
    }

    pub fn predict(&self, poses: &[PolarPose], velocity: &Velocity, elapsed: f64) -> Vec<PolarPose> {
        predict_poses(poses, velocity, self.effective_elapsed(elapsed))
    }

    pub fn warp(
        &self,
        grid: &OccupancyGrid,
        velocity: &Velocity,
        elapsed: f64,
        fill: f64,
    ) -> OccupancyGrid {
        warp_grid(grid, velocity, self.effective_elapsed(elapsed), fill)
    }
}
