//! Coordinate-transform collaborator boundary.

use crate::{error::SensorFault, types::CartesianPose};
use std::time::Duration;

/// Looks up a frame transform and applies it to a batch of points.
///
/// Called once per detection batch per modality per tick. Implementations
/// must give up once `timeout` has elapsed; the caller never retries within
/// the same tick.
pub trait CoordinateTransform: Send + Sync {
    fn transform(
        &self,
        points: &[CartesianPose],
        source_frame: &str,
        target_frame: &str,
        timeout: Duration,
    ) -> Result<Vec<CartesianPose>, SensorFault>;
}

/// Accepts points already expressed in the target frame and rejects
/// everything else.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTransform;

impl CoordinateTransform for IdentityTransform {
    fn transform(
        &self,
        points: &[CartesianPose],
        source_frame: &str,
        target_frame: &str,
        _timeout: Duration,
    ) -> Result<Vec<CartesianPose>, SensorFault> {
        if source_frame == target_frame {
            Ok(points.to_vec())
        } else {
            Err(SensorFault::TransformUnavailable {
                source_frame: source_frame.to_string(),
                target_frame: target_frame.to_string(),
                reason: "identity transform only maps a frame onto itself".into(),
            })
        }
    }
}
