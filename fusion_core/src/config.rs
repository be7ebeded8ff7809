//! Fusion configuration: one immutable value built at startup and shared
//! by reference (`Arc<FusionConfig>`) into every component.
//!
//! Every field carries a default, so a configuration file only needs to
//! name what it changes. Angles are given in degrees and converted when
//! the per-modality settings are resolved.

use crate::{
    error::ConfigError,
    fusion::FuseStrategy,
    grid::GridGeometry,
    maxima::Connectivity,
    types::{CellProbability, FieldOfView, Interval, Modality, ModalityMap, PolarStdev},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Range forced on the whole grid when the periodic-gesture detector is on.
pub const PERIODIC_RANGE_MAX: f64 = 30.0;
const PERIODIC_RANGE_MIN: f64 = 10.0;
const PERIODIC_HALF_ANGLE_DEG: f64 = 65.0 / 2.0;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Extent and resolution of the robot-centred grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub angle_min_deg: f64,
    pub angle_max_deg: f64,
    pub range_min: f64,
    pub range_max: f64,
    /// Cell edge length (meters)
    pub resolution: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            angle_min_deg: -180.0,
            angle_max_deg: 180.0,
            range_min: 0.0,
            range_max: 20.0,
            resolution: 0.5,
        }
    }
}

/// Ego-motion compensation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub enable: bool,
    /// Elapsed times above this are treated as "no motion" (seconds)
    pub max_elapsed_time: f64,
    /// Odometry older than this is ignored and the robot assumed still (seconds)
    pub max_odometry_age: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            enable: true,
            max_elapsed_time: 1.0,
            max_odometry_age: 1.0,
        }
    }
}

/// Candidate extraction on the fused grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalMaximaConfig {
    pub connectivity: Connectivity,
    pub min_probability: f64,
}

impl Default for LocalMaximaConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Eight,
            min_probability: 0.5,
        }
    }
}

/// Per-modality overrides. Anything left out falls back to the modality's
/// built-in default (see [`ModalityDefaults`]).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_min_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_max_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_stdev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_stdev_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_probability: Option<CellProbability>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalitiesConfig {
    pub leg: ModalityConfig,
    pub torso: ModalityConfig,
    pub sound: ModalityConfig,
    pub periodic_gesture: ModalityConfig,
}

impl ModalitiesConfig {
    pub fn get(&self, modality: Modality) -> &ModalityConfig {
        match modality {
            Modality::Leg => &self.leg,
            Modality::Torso => &self.torso,
            Modality::Sound => &self.sound,
            Modality::PeriodicGesture => &self.periodic_gesture,
        }
    }

    pub fn get_mut(&mut self, modality: Modality) -> &mut ModalityConfig {
        match modality {
            Modality::Leg => &mut self.leg,
            Modality::Torso => &mut self.torso,
            Modality::Sound => &mut self.sound,
            Modality::PeriodicGesture => &mut self.periodic_gesture,
        }
    }
}

/// Built-in per-modality defaults. `None` bounds inherit the global grid.
#[derive(Clone, Copy, Debug)]
pub struct ModalityDefaults {
    pub enable: bool,
    pub range: Option<(f64, f64)>,
    pub angle_deg: Option<(f64, f64)>,
    pub range_stdev: f64,
    pub angle_stdev_deg: f64,
}

impl ModalityDefaults {
    pub fn of(modality: Modality) -> Self {
        match modality {
            Modality::Leg => Self {
                enable: true,
                range: Some((1.0, 10.0)),
                angle_deg: Some((-120.0, 120.0)),
                range_stdev: 0.1,
                angle_stdev_deg: 1.0,
            },
            Modality::Torso => Self {
                enable: true,
                range: Some((2.0, 8.0)),
                angle_deg: Some((-35.0, 35.0)),
                range_stdev: 0.2,
                angle_stdev_deg: 1.0,
            },
            Modality::Sound => Self {
                enable: true,
                range: Some((1.0, 10.0)),
                angle_deg: Some((-90.0, 90.0)),
                range_stdev: 0.5,
                angle_stdev_deg: 5.0,
            },
            Modality::PeriodicGesture => Self {
                enable: false,
                range: None,
                angle_deg: Some((-PERIODIC_HALF_ANGLE_DEG, PERIODIC_HALF_ANGLE_DEG)),
                range_stdev: 1.0,
                angle_stdev_deg: 1.0,
            },
        }
    }
}

/// Fully resolved settings for one enabled modality.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModalitySettings {
    pub modality: Modality,
    pub fov: FieldOfView,
    /// Default measurement noise for detections without their own
    pub stdev: PolarStdev,
    pub cell_probability: CellProbability,
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Complete configuration of the fusion node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub grid: GridConfig,
    /// Maximum age of a detection batch before it counts as stale (seconds)
    pub update_rate: f64,
    /// Control-loop frequency (Hz)
    pub loop_rate: f64,
    pub cell_probability: CellProbability,
    pub target_detection_probability: f64,
    pub false_positive_probability: f64,
    pub motion: MotionConfig,
    /// Deadline handed to each coordinate-transform lookup
    pub transform_timeout_ms: u64,
    pub fuse_strategy: FuseStrategy,
    pub local_maxima: LocalMaximaConfig,
    pub modalities: ModalitiesConfig,
    /// Include per-modality detection sets in every cycle output
    pub collect_debug: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            update_rate: 0.5,
            loop_rate: 10.0,
            cell_probability: CellProbability::default(),
            target_detection_probability: 0.9,
            false_positive_probability: 0.01,
            motion: MotionConfig::default(),
            transform_timeout_ms: 50,
            fuse_strategy: FuseStrategy::default(),
            local_maxima: LocalMaximaConfig::default(),
            modalities: ModalitiesConfig::default(),
            collect_debug: false,
        }
    }
}

impl FusionConfig {
    pub fn is_enabled(&self, modality: Modality) -> bool {
        self.modalities
            .get(modality)
            .enable
            .unwrap_or(ModalityDefaults::of(modality).enable)
    }

    pub fn enabled_modalities(&self) -> impl Iterator<Item = Modality> + '_ {
        Modality::ALL.into_iter().filter(|m| self.is_enabled(*m))
    }

    /// Grid range after the periodic-gesture override.
    pub fn effective_range_max(&self) -> f64 {
        if self.is_enabled(Modality::PeriodicGesture) {
            PERIODIC_RANGE_MAX
        } else {
            self.grid.range_max
        }
    }

    /// Field of view of the fused human grid.
    pub fn grid_fov(&self) -> FieldOfView {
        FieldOfView {
            angle: Interval::new(
                self.grid.angle_min_deg.to_radians(),
                self.grid.angle_max_deg.to_radians(),
            ),
            range: Interval::new(self.grid.range_min, self.effective_range_max()),
        }
    }

    /// Shared geometry of every grid built from this configuration.
    pub fn grid_geometry(&self) -> Result<GridGeometry, ConfigError> {
        GridGeometry::new(self.effective_range_max(), self.grid.resolution)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.loop_rate)
    }

    pub fn transform_timeout(&self) -> Duration {
        Duration::from_millis(self.transform_timeout_ms)
    }

    /// Resolve the settings of `modality`, or `None` when it is disabled.
    pub fn modality_settings(&self, modality: Modality) -> Option<ModalitySettings> {
        if !self.is_enabled(modality) {
            return None;
        }
        let defaults = ModalityDefaults::of(modality);
        let over = self.modalities.get(modality);
        let grid_fov = self.grid_fov();

        let (mut range_min, range_max) = defaults
            .range
            .unwrap_or((grid_fov.range.min, grid_fov.range.max));
        if modality == Modality::PeriodicGesture {
            range_min = PERIODIC_RANGE_MIN;
        }
        let (angle_min, angle_max) = defaults
            .angle_deg
            .unwrap_or((self.grid.angle_min_deg, self.grid.angle_max_deg));

        let fov = FieldOfView {
            angle: Interval::new(
                over.angle_min_deg.unwrap_or(angle_min).to_radians(),
                over.angle_max_deg.unwrap_or(angle_max).to_radians(),
            ),
            range: Interval::new(
                over.range_min.unwrap_or(range_min),
                over.range_max.unwrap_or(range_max),
            ),
        };
        let stdev = PolarStdev {
            range: over.range_stdev.unwrap_or(defaults.range_stdev),
            angle: over
                .angle_stdev_deg
                .unwrap_or(defaults.angle_stdev_deg)
                .to_radians(),
        };
        Some(ModalitySettings {
            modality,
            fov,
            stdev,
            cell_probability: over.cell_probability.unwrap_or(self.cell_probability),
        })
    }

    /// All enabled modalities with their resolved settings.
    pub fn resolved_modalities(&self) -> ModalityMap<ModalitySettings> {
        Modality::ALL
            .into_iter()
            .filter_map(|m| self.modality_settings(m).map(|s| (m, s)))
            .collect()
    }

    /// Reject configurations the filter cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.grid.resolution > 0.0 && self.grid.resolution.is_finite()) {
            return Err(ConfigError::NonPositiveResolution(self.grid.resolution));
        }
        positive("loop_rate", self.loop_rate)?;
        positive("update_rate", self.update_rate)?;
        positive("grid.range_max", self.grid.range_max)?;
        positive("motion.max_elapsed_time", self.motion.max_elapsed_time)?;
        ordered("grid.range", self.grid.range_min, self.grid.range_max)?;
        ordered("grid.angle", self.grid.angle_min_deg, self.grid.angle_max_deg)?;

        check_cells("cell_probability", &self.cell_probability)?;
        probability(
            "target_detection_probability",
            self.target_detection_probability,
        )?;
        probability(
            "false_positive_probability",
            self.false_positive_probability,
        )?;
        probability(
            "local_maxima.min_probability",
            self.local_maxima.min_probability,
        )?;
        self.fuse_strategy.validate()?;

        for (modality, settings) in self.resolved_modalities().iter() {
            let name = modality.to_string();
            ordered(
                &format!("{name}.range"),
                settings.fov.range.min,
                settings.fov.range.max,
            )?;
            ordered(
                &format!("{name}.angle"),
                settings.fov.angle.min,
                settings.fov.angle.max,
            )?;
            positive(&format!("{name}.range_stdev"), settings.stdev.range)?;
            positive(&format!("{name}.angle_stdev"), settings.stdev.angle)?;
            check_cells(
                &format!("{name}.cell_probability"),
                &settings.cell_probability,
            )?;
        }
        self.grid_geometry().map(|_| ())
    }
}

fn probability(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ProbabilityOutOfRange {
            name: name.to_string(),
            value,
        })
    }
}

fn check_cells(name: &str, cells: &CellProbability) -> Result<(), ConfigError> {
    probability(&format!("{name}.human"), cells.human)?;
    probability(&format!("{name}.free"), cells.free)?;
    probability(&format!("{name}.unknown"), cells.unknown)
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive {
            name: name.to_string(),
            value,
        })
    }
}

fn ordered(name: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::InvalidRange {
            name: name.to_string(),
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn defaults_are_valid() {
        let cfg = FusionConfig::default();
        cfg.validate().unwrap();
        let enabled: Vec<_> = cfg.enabled_modalities().collect();
        assert_eq!(
            enabled,
            vec![Modality::Leg, Modality::Torso, Modality::Sound]
        );
        assert_eq!(cfg.grid_geometry().unwrap().size, 80);
    }

    #[test]
    fn leg_defaults_resolve_to_radians() {
        let cfg = FusionConfig::default();
        let leg = cfg.modality_settings(Modality::Leg).unwrap();
        assert_abs_diff_eq!(leg.fov.angle.max, 120f64.to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(leg.fov.range.min, 1.0);
        assert_abs_diff_eq!(leg.stdev.angle, 1f64.to_radians(), epsilon = 1e-12);
        assert_eq!(leg.cell_probability, CellProbability::default());
    }

    #[test]
    fn periodic_gesture_widens_grid_and_narrows_itself() {
        let mut cfg = FusionConfig::default();
        cfg.modalities.periodic_gesture.enable = Some(true);
        cfg.validate().unwrap();
        assert_abs_diff_eq!(cfg.effective_range_max(), 30.0);
        assert_eq!(cfg.grid_geometry().unwrap().size, 120);

        let periodic = cfg.modality_settings(Modality::PeriodicGesture).unwrap();
        assert_abs_diff_eq!(periodic.fov.range.min, 10.0);
        assert_abs_diff_eq!(periodic.fov.range.max, 30.0);
        assert_abs_diff_eq!(
            periodic.fov.angle.min,
            (-32.5f64).to_radians(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn rejects_bad_probability() {
        let mut cfg = FusionConfig::default();
        cfg.modalities.torso.cell_probability = Some(CellProbability {
            human: 1.2,
            ..Default::default()
        });
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ProbabilityOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_resolution() {
        let mut cfg = FusionConfig::default();
        cfg.grid.resolution = 0.0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonPositiveResolution(0.0))
        );
    }

    #[test]
    fn rejects_bad_connectivity() {
        let json = r#"{ "local_maxima": { "connectivity": 6 } }"#;
        let err = serde_json::from_str::<FusionConfig>(json).unwrap_err();
        assert!(err.to_string().contains("connectivity must be 4 or 8"));

        let json = r#"{ "local_maxima": { "connectivity": 4 } }"#;
        let cfg: FusionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.local_maxima.connectivity, Connectivity::Four);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "grid": { "resolution": 0.25 },
            "modalities": { "sound": { "enable": false, "angle_stdev_deg": 10.0 } }
        }"#;
        let cfg: FusionConfig = serde_json::from_str(json).unwrap();
        assert_abs_diff_eq!(cfg.grid.resolution, 0.25);
        assert_abs_diff_eq!(cfg.grid.range_max, 20.0);
        assert!(!cfg.is_enabled(Modality::Sound));
        assert!(cfg.is_enabled(Modality::Leg));
        assert_eq!(cfg.grid_geometry().unwrap().size, 160);
    }
}
