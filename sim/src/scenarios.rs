//! Scenario definitions.
//!
//! Each scenario is a named configuration of humans, robot motion and
//! detectors. All scenarios are deterministic given the same seed.

use crate::{
    detector_sim::{DetectorParams, SimDetector},
    human::{Human, MotionSpec},
    robot::RobotPath,
};
use fusion_core::types::{Modality, Velocity};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which pre-defined scenario to load.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// One person standing in front of a parked robot
    Static,
    /// Two people walking across the robot's view
    Walking,
    /// Robot drives towards a standing person, then turns away
    Approach,
    /// Three people, noisy detectors with heavy clutter
    Cluttered,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub duration: f64, // seconds
    pub sim_dt: f64,   // fusion loop period (s)
    pub humans: Vec<Human>,
    pub robot: RobotPath,
    pub detectors: Vec<SimDetector>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Static => Self::static_person(seed),
            ScenarioKind::Walking => Self::walking(seed),
            ScenarioKind::Approach => Self::approach(seed),
            ScenarioKind::Cluttered => Self::cluttered(seed),
        }
    }

    /// Tick the fusion loop every `period` instead of the built-in 0.1 s.
    pub fn with_loop_period(mut self, period: Duration) -> Self {
        self.sim_dt = period.as_secs_f64();
        self
    }

    // -----------------------------------------------------------------------
    // Scenario 1: Static
    // -----------------------------------------------------------------------
    fn static_person(seed: u64) -> Self {
        Self {
            name: "static".into(),
            seed,
            duration: 10.0,
            sim_dt: 0.1,
            humans: vec![Human::new(0, 4.0, 0.8, MotionSpec::Stationary)],
            robot: RobotPath::still(),
            detectors: standard_detectors(1.0),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 2: Walking
    // -----------------------------------------------------------------------
    fn walking(seed: u64) -> Self {
        let humans = vec![
            Human::new(0, 5.0, -3.0, MotionSpec::ConstantVelocity { vx: 0.0, vy: 0.5 }),
            Human::new(
                1,
                3.0,
                2.5,
                MotionSpec::Waypoints {
                    waypoints: vec![[0.0, 3.0, -1.0], [8.0, 6.0, -1.0]],
                    speed: 0.8,
                },
            ),
        ];
        Self {
            name: "walking".into(),
            seed,
            duration: 15.0,
            sim_dt: 0.1,
            humans,
            robot: RobotPath::still(),
            detectors: standard_detectors(1.0),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 3: Approach
    // -----------------------------------------------------------------------
    fn approach(seed: u64) -> Self {
        let robot = RobotPath {
            segments: vec![
                (0.0, Velocity::new(0.3, 0.0, 0.0)),
                (8.0, Velocity::new(0.0, 0.0, 0.0)),
                (10.0, Velocity::new(0.0, 0.0, 0.25)),
                (13.0, Velocity::new(0.0, 0.0, 0.0)),
            ],
        };
        Self {
            name: "approach".into(),
            seed,
            duration: 16.0,
            sim_dt: 0.1,
            humans: vec![Human::new(0, 6.5, 0.5, MotionSpec::Stationary)],
            robot,
            detectors: standard_detectors(1.0),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 4: Cluttered
    // -----------------------------------------------------------------------
    fn cluttered(seed: u64) -> Self {
        let humans = vec![
            Human::new(0, 3.0, 1.5, MotionSpec::Stationary),
            Human::new(1, 5.5, -1.0, MotionSpec::ConstantVelocity { vx: -0.2, vy: 0.1 }),
            Human::new(2, 2.5, -2.5, MotionSpec::Stationary).between(Some(4.0), Some(12.0)),
        ];
        let mut detectors = standard_detectors(6.0);
        for d in &mut detectors {
            d.params.p_detection *= 0.8;
            d.params.range_noise *= 2.0;
        }
        Self {
            name: "cluttered".into(),
            seed,
            duration: 15.0,
            sim_dt: 0.1,
            humans,
            robot: RobotPath::constant(Velocity::new(0.1, 0.0, 0.05)),
            detectors,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder helpers
// ---------------------------------------------------------------------------

/// Laser legs, torso camera, microphone array and gesture camera, all at the
/// fusion loop rate. `clutter_scale` multiplies every false-alarm rate.
fn standard_detectors(clutter_scale: f64) -> Vec<SimDetector> {
    vec![
        sim_detector(Modality::Leg, "base_laser_link", 0.9, 0.2 * clutter_scale, 0.05, 1.0, (0.3, 10.0), 120.0),
        sim_detector(Modality::Torso, "head_camera", 0.8, 0.05 * clutter_scale, 0.2, 1.5, (1.0, 9.0), 35.0),
        sim_detector(Modality::Sound, "mic_array", 0.6, 0.1 * clutter_scale, 0.0, 5.0, (0.3, 10.0), 180.0),
        sim_detector(Modality::PeriodicGesture, "head_camera", 0.3, 0.02 * clutter_scale, 0.5, 1.0, (1.0, 30.0), 32.5),
    ]
}

#[allow(clippy::too_many_arguments)]
fn sim_detector(
    modality: Modality,
    frame_id: &str,
    p_detection: f64,
    lambda_clutter: f64,
    range_noise: f64,
    bearing_noise_deg: f64,
    range: (f64, f64),
    fov_half_deg: f64,
) -> SimDetector {
    SimDetector::new(
        modality,
        frame_id,
        DetectorParams {
            refresh_rate: 10.0,
            p_detection,
            lambda_clutter,
            range_noise,
            bearing_noise_deg,
            min_range: range.0,
            max_range: range.1,
            fov_half_deg,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn every_kind_builds() {
        for kind in ScenarioKind::value_variants() {
            let s = Scenario::build(kind.clone(), 1);
            assert!(!s.humans.is_empty());
            assert!(s.duration > 0.0 && s.sim_dt > 0.0);
            assert!(s.detectors.iter().any(|d| d.modality == Modality::Leg));
        }
    }

    #[test]
    fn loop_period_sets_the_tick() {
        let mut config = fusion_core::FusionConfig::default();
        config.loop_rate = 20.0;
        let s = Scenario::build(ScenarioKind::Static, 1).with_loop_period(config.loop_period());
        assert!((s.sim_dt - 0.05).abs() < 1e-12);
    }
}
