//! Fundamental types used across the entire workspace.

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt;

/// Frame every grid, detection set and published pose is expressed in.
pub const BASE_FRAME: &str = "base_footprint";

/// Wrap an angle into `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let a = (angle + PI).rem_euclid(TAU) - PI;
    if a <= -PI {
        a + TAU
    } else {
        a
    }
}

// ---------------------------------------------------------------------------
// Modality tags
// ---------------------------------------------------------------------------

/// One detection channel feeding the fusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Leg,
    Torso,
    Sound,
    PeriodicGesture,
}

impl Modality {
    /// All modalities in their fixed slot order.
    pub const ALL: [Modality; 4] = [
        Modality::Leg,
        Modality::Torso,
        Modality::Sound,
        Modality::PeriodicGesture,
    ];

    fn slot(self) -> usize {
        match self {
            Modality::Leg => 0,
            Modality::Torso => 1,
            Modality::Sound => 2,
            Modality::PeriodicGesture => 3,
        }
    }

    /// Stream name used for published grids.
    pub fn topic(self) -> &'static str {
        match self {
            Modality::Leg => "leg_occupancy_grid",
            Modality::Torso => "torso_occupancy_grid",
            Modality::Sound => "sound_occupancy_grid",
            Modality::PeriodicGesture => "periodic_occupancy_grid",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modality::Leg => "leg",
            Modality::Torso => "torso",
            Modality::Sound => "sound",
            Modality::PeriodicGesture => "periodic_gesture",
        };
        f.write_str(name)
    }
}

/// Fixed mapping from modality tag to an optional value.
///
/// Absent slots are simply skipped by the iterators, so callers never
/// branch on per-modality enable flags.
#[derive(Clone, Debug)]
pub struct ModalityMap<T> {
    slots: [Option<T>; 4],
}

impl<T> Default for ModalityMap<T> {
    fn default() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }
}

impl<T> ModalityMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `value` in the slot for `modality`, returning the previous value.
    pub fn insert(&mut self, modality: Modality, value: T) -> Option<T> {
        self.slots[modality.slot()].replace(value)
    }

    pub fn get(&self, modality: Modality) -> Option<&T> {
        self.slots[modality.slot()].as_ref()
    }

    pub fn get_mut(&mut self, modality: Modality) -> Option<&mut T> {
        self.slots[modality.slot()].as_mut()
    }

    pub fn contains(&self, modality: Modality) -> bool {
        self.slots[modality.slot()].is_some()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupied slots in fixed modality order.
    pub fn iter(&self) -> impl Iterator<Item = (Modality, &T)> {
        Modality::ALL
            .into_iter()
            .zip(self.slots.iter())
            .filter_map(|(m, s)| s.as_ref().map(|v| (m, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Modality, &mut T)> {
        Modality::ALL
            .into_iter()
            .zip(self.slots.iter_mut())
            .filter_map(|(m, s)| s.as_mut().map(|v| (m, v)))
    }

    pub fn map<'a, U>(&'a self, mut f: impl FnMut(Modality, &'a T) -> U) -> ModalityMap<U> {
        let mut out = ModalityMap::new();
        for (m, v) in self.iter() {
            out.insert(m, f(m, v));
        }
        out
    }
}

impl<T> FromIterator<(Modality, T)> for ModalityMap<T> {
    fn from_iter<I: IntoIterator<Item = (Modality, T)>>(iter: I) -> Self {
        let mut map = ModalityMap::new();
        for (m, v) in iter {
            map.insert(m, v);
        }
        map
    }
}

// ---------------------------------------------------------------------------
// Field of view and cell priors
// ---------------------------------------------------------------------------

/// Closed interval `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Angular (radians, robot-frame bearing) and range (meters) coverage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldOfView {
    pub angle: Interval,
    pub range: Interval,
}

impl FieldOfView {
    /// True if a polar position lies inside the mask.
    pub fn contains(&self, range: f64, bearing: f64) -> bool {
        self.range.contains(range) && self.angle.contains(normalize_angle(bearing))
    }
}

/// Conditional occupancy priors used by the likelihood model.
///
/// The three values are independent and need not sum to one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellProbability {
    pub human: f64,
    pub free: f64,
    pub unknown: f64,
}

impl Default for CellProbability {
    fn default() -> Self {
        Self {
            human: 0.95,
            free: 0.05,
            unknown: 0.25,
        }
    }
}

// ---------------------------------------------------------------------------
// Poses
// ---------------------------------------------------------------------------

/// Planar position in the robot base frame (z is always 0).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CartesianPose {
    pub x: f64,
    pub y: f64,
}

impl CartesianPose {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &CartesianPose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Measurement-noise width of a polar detection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolarStdev {
    /// meters
    pub range: f64,
    /// radians
    pub angle: f64,
}

/// Position in robot-base polar coordinates plus the width of its
/// likelihood footprint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolarPose {
    pub range: f64,
    pub bearing: f64,
    pub stdev: PolarStdev,
}

impl PolarPose {
    pub fn new(range: f64, bearing: f64, stdev: PolarStdev) -> Self {
        Self {
            range,
            bearing,
            stdev,
        }
    }

    pub fn from_cartesian(pose: CartesianPose, stdev: PolarStdev) -> Self {
        Self {
            range: pose.x.hypot(pose.y),
            bearing: pose.y.atan2(pose.x),
            stdev,
        }
    }

    pub fn to_cartesian(&self) -> CartesianPose {
        CartesianPose::new(
            self.range * self.bearing.cos(),
            self.range * self.bearing.sin(),
        )
    }
}

// ---------------------------------------------------------------------------
// Robot motion and detector input
// ---------------------------------------------------------------------------

/// Robot ego-motion estimate, expressed in the base frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear_x: f64,
    pub linear_y: f64,
    /// rad/s, counter-clockwise positive
    pub angular: f64,
}

impl Velocity {
    pub const ZERO: Velocity = Velocity {
        linear_x: 0.0,
        linear_y: 0.0,
        angular: 0.0,
    };

    pub fn new(linear_x: f64, linear_y: f64, angular: f64) -> Self {
        Self {
            linear_x,
            linear_y,
            angular,
        }
    }
}

/// One odometry sample from the velocity feed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OdometryReading {
    pub velocity: Velocity,
    /// seconds, same clock as [`crate::pipeline::FusionPipeline::tick`]
    pub stamp: f64,
}

/// A batch of detections from one modality, expressed in the sensor's
/// own frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    pub modality: Modality,
    /// Frame the detections are expressed in
    pub frame_id: String,
    /// Acquisition time in seconds
    pub stamp: f64,
    pub detections: Vec<SensorDetection>,
}

/// A sensor-frame polar detection. `stdev` overrides the modality default
/// when present.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorDetection {
    pub range: f64,
    pub bearing: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdev: Option<PolarStdev>,
}

impl SensorDetection {
    pub fn new(range: f64, bearing: f64) -> Self {
        Self {
            range,
            bearing,
            stdev: None,
        }
    }

    /// Sensor-frame cartesian position.
    pub fn to_cartesian(&self) -> CartesianPose {
        CartesianPose::new(
            self.range * self.bearing.cos(),
            self.range * self.bearing.sin(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn normalize_wraps_into_half_open_interval() {
        assert_abs_diff_eq!(normalize_angle(2.5 * PI), 0.5 * PI, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_angle(0.5), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_angle(-0.5 - TAU), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn polar_cartesian_agree() {
        let stdev = PolarStdev {
            range: 0.1,
            angle: 0.02,
        };
        let p = PolarPose::from_cartesian(CartesianPose::new(0.0, 2.0), stdev);
        assert_abs_diff_eq!(p.range, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.bearing, PI / 2.0, epsilon = 1e-12);
        let c = p.to_cartesian();
        assert_abs_diff_eq!(c.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn modality_map_iterates_present_slots_in_order() {
        let mut map = ModalityMap::new();
        map.insert(Modality::Sound, 3);
        map.insert(Modality::Leg, 1);
        let keys: Vec<_> = map.iter().map(|(m, _)| m).collect();
        assert_eq!(keys, vec![Modality::Leg, Modality::Sound]);
        assert_eq!(map.len(), 2);
        assert!(!map.contains(Modality::Torso));
    }

    #[test]
    fn fov_checks_range_and_bearing() {
        let fov = FieldOfView {
            angle: Interval::new(-0.5, 0.5),
            range: Interval::new(1.0, 10.0),
        };
        assert!(fov.contains(3.0, 0.1));
        assert!(!fov.contains(3.0, 0.6));
        assert!(!fov.contains(0.5, 0.0));
        assert!(!fov.contains(12.0, 0.0));
    }
}
