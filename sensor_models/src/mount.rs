//! Sensor mount table: fixed planar poses of each sensor frame on the robot.

use fusion_core::{error::SensorFault, transform::CoordinateTransform, types::CartesianPose};
use nalgebra::{Isometry2, Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

/// Pose of one sensor frame in the robot base frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorMount {
    pub frame_id: String,
    /// Mount position (meters)
    pub x: f64,
    pub y: f64,
    /// Boresight yaw (degrees, counter-clockwise)
    pub yaw_deg: f64,
}

impl SensorMount {
    pub fn new(frame_id: impl Into<String>, x: f64, y: f64, yaw_deg: f64) -> Self {
        Self {
            frame_id: frame_id.into(),
            x,
            y,
            yaw_deg,
        }
    }

    fn isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vector2::new(self.x, self.y), self.yaw_deg.to_radians())
    }

    /// Default mounts of the reference robot.
    pub fn defaults() -> Vec<SensorMount> {
        vec![
            SensorMount::new("base_laser_link", 0.2, 0.0, 0.0),
            SensorMount::new("head_camera", 0.05, 0.0, 0.0),
            SensorMount::new("mic_array", 0.0, 0.0, 0.0),
        ]
    }
}

/// [`CoordinateTransform`] over a fixed set of sensor mounts.
///
/// Lookups are in-memory, so the deadline can never be hit.
#[derive(Clone, Debug, Default)]
pub struct StaticTransforms {
    base_frame: String,
    to_base: HashMap<String, Isometry2<f64>>,
}

impl StaticTransforms {
    pub fn new(base_frame: impl Into<String>, mounts: &[SensorMount]) -> Self {
        Self {
            base_frame: base_frame.into(),
            to_base: mounts
                .iter()
                .map(|m| (m.frame_id.clone(), m.isometry()))
                .collect(),
        }
    }

    /// Transform taking points from `source` into `target`.
    fn lookup(&self, source: &str, target: &str) -> Option<Isometry2<f64>> {
        let to_base = |frame: &str| {
            if frame == self.base_frame {
                Some(Isometry2::identity())
            } else {
                self.to_base.get(frame).copied()
            }
        };
        Some(to_base(target)?.inverse() * to_base(source)?)
    }
}

impl CoordinateTransform for StaticTransforms {
    fn transform(
        &self,
        points: &[CartesianPose],
        source_frame: &str,
        target_frame: &str,
        _timeout: Duration,
    ) -> Result<Vec<CartesianPose>, SensorFault> {
        let iso = self
            .lookup(source_frame, target_frame)
            .ok_or_else(|| SensorFault::TransformUnavailable {
                source_frame: source_frame.to_string(),
                target_frame: target_frame.to_string(),
                reason: "frame not in mount table".into(),
            })?;
        Ok(points
            .iter()
            .map(|p| {
                let q = iso.transform_point(&Point2::new(p.x, p.y));
                CartesianPose::new(q.x, q.y)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use fusion_core::types::BASE_FRAME;

    fn table() -> StaticTransforms {
        StaticTransforms::new(
            BASE_FRAME,
            &[
                SensorMount::new("front_laser", 0.2, 0.0, 0.0),
                SensorMount::new("side_camera", 0.0, 0.1, 90.0),
            ],
        )
    }

    #[test]
    fn offset_mount_shifts_points() {
        let out = table()
            .transform(
                &[CartesianPose::new(1.0, 0.5)],
                "front_laser",
                BASE_FRAME,
                Duration::from_millis(10),
            )
            .unwrap();
        assert_abs_diff_eq!(out[0].x, 1.2, epsilon = 1e-12);
        assert_abs_diff_eq!(out[0].y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn rotated_mount_turns_points() {
        let out = table()
            .transform(
                &[CartesianPose::new(2.0, 0.0)],
                "side_camera",
                BASE_FRAME,
                Duration::from_millis(10),
            )
            .unwrap();
        assert_abs_diff_eq!(out[0].x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[0].y, 2.1, epsilon = 1e-12);
    }

    #[test]
    fn sensor_to_sensor_goes_through_base() {
        let p = CartesianPose::new(1.0, 1.0);
        let t = table();
        let timeout = Duration::from_millis(10);
        let in_base = t.transform(&[p], "side_camera", BASE_FRAME, timeout).unwrap();
        let in_laser = t.transform(&[p], "side_camera", "front_laser", timeout).unwrap();
        assert_abs_diff_eq!(in_laser[0].x, in_base[0].x - 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(in_laser[0].y, in_base[0].y, epsilon = 1e-12);
    }

    #[test]
    fn unknown_frame_is_unavailable() {
        let err = table()
            .transform(&[], "rear_sonar", BASE_FRAME, Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, SensorFault::TransformUnavailable { .. }));
    }
}
