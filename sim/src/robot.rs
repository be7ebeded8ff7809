//! Robot ego-motion: a velocity schedule integrated into a world pose.

use fusion_core::{motion::displacement, types::CartesianPose, Velocity};
use nalgebra::{Isometry2, Point2};
use serde::{Deserialize, Serialize};

/// Piecewise-constant velocity commands. The active command is the last one
/// whose start time is at or before `t`; before the first, the robot is still.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotPath {
    pub segments: Vec<(f64, Velocity)>,
}

impl RobotPath {
    pub fn still() -> Self {
        Self::default()
    }

    pub fn constant(velocity: Velocity) -> Self {
        Self {
            segments: vec![(0.0, velocity)],
        }
    }

    pub fn velocity_at(&self, t: f64) -> Velocity {
        self.segments
            .iter()
            .filter(|(start, _)| *start <= t)
            .last()
            .map(|(_, v)| *v)
            .unwrap_or(Velocity::ZERO)
    }
}

/// Integrated robot pose in the world frame.
#[derive(Clone, Debug)]
pub struct Robot {
    pub path: RobotPath,
    pose: Isometry2<f64>,
}

impl Robot {
    pub fn new(path: RobotPath) -> Self {
        Self {
            path,
            pose: Isometry2::identity(),
        }
    }

    /// Drive for `dt` seconds with the command active at `t`, returning it.
    ///
    /// Uses the same displacement model as the fusion motion predictor, so a
    /// static world stays static in the compensated grids.
    pub fn step(&mut self, t: f64, dt: f64) -> Velocity {
        let v = self.path.velocity_at(t);
        self.pose *= displacement(&v, dt);
        v
    }

    pub fn pose(&self) -> &Isometry2<f64> {
        &self.pose
    }

    /// World point expressed in the robot base frame.
    pub fn to_base(&self, world: [f64; 2]) -> CartesianPose {
        let p = self
            .pose
            .inverse_transform_point(&Point2::new(world[0], world[1]));
        CartesianPose::new(p.x, p.y)
    }
}
