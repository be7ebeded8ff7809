//! Cell-wise fusion of the per-modality posteriors into the human grid.
//!
//! The default strategy treats each modality as independent evidence and
//! multiplies odds:
//!
//! `fused = Π p_m / (Π p_m + Π (1 − p_m))`
//!
//! so agreeing modalities amplify each other and a modality sitting at its
//! `unknown` prior barely moves the result.

use crate::{
    error::ConfigError,
    grid::{GridGeometry, OccupancyGrid},
    types::{Modality, ModalityMap},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Relative trust placed in each modality by [`FuseStrategy::WeightedAverage`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalityWeights {
    pub leg: f64,
    pub torso: f64,
    pub sound: f64,
    pub periodic_gesture: f64,
}

impl Default for ModalityWeights {
    fn default() -> Self {
        Self {
            leg: 1.0,
            torso: 1.0,
            sound: 1.0,
            periodic_gesture: 1.0,
        }
    }
}

impl ModalityWeights {
    pub fn weight(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Leg => self.leg,
            Modality::Torso => self.torso,
            Modality::Sound => self.sound,
            Modality::PeriodicGesture => self.periodic_gesture,
        }
    }
}

/// How per-modality posteriors are combined.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FuseStrategy {
    /// Independent-evidence product of odds
    #[default]
    Multiply,
    /// Normalized weighted mean of the probabilities
    WeightedAverage { weights: ModalityWeights },
}

impl FuseStrategy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            FuseStrategy::Multiply => Ok(()),
            FuseStrategy::WeightedAverage { weights } => {
                for m in Modality::ALL {
                    let w = weights.weight(m);
                    if !(w >= 0.0 && w.is_finite()) {
                        return Err(ConfigError::NonPositive {
                            name: format!("fuse_strategy.weights.{m}"),
                            value: w,
                        });
                    }
                }
                Ok(())
            }
        }
    }

    /// Fuse the probabilities of one cell. `values` must not be empty.
    fn combine(&self, values: &[(Modality, f64)], unknown: f64) -> f64 {
        match self {
            FuseStrategy::Multiply => {
                let (mut occupied, mut empty) = (1.0_f64, 1.0_f64);
                for &(_, p) in values {
                    occupied *= p;
                    empty *= 1.0 - p;
                }
                let den = occupied + empty;
                if den > 0.0 {
                    occupied / den
                } else {
                    unknown
                }
            }
            FuseStrategy::WeightedAverage { weights } => {
                let (mut sum, mut total) = (0.0_f64, 0.0_f64);
                for &(m, p) in values {
                    let w = weights.weight(m);
                    sum += w * p;
                    total += w;
                }
                if total > 0.0 {
                    sum / total
                } else {
                    unknown
                }
            }
        }
    }
}

/// Combines the posteriors of every enabled modality.
#[derive(Clone, Debug)]
pub struct GridFusion {
    geometry: GridGeometry,
    strategy: FuseStrategy,
    /// Value of a cell nothing can be said about
    unknown: f64,
}

impl GridFusion {
    pub fn new(geometry: GridGeometry, strategy: FuseStrategy, unknown: f64) -> Self {
        Self {
            geometry,
            strategy,
            unknown,
        }
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    pub fn strategy(&self) -> &FuseStrategy {
        &self.strategy
    }

    /// Every grid must share the fusion geometry.
    pub fn check(&self, grids: &ModalityMap<&OccupancyGrid>) -> Result<(), ConfigError> {
        for (modality, grid) in grids.iter() {
            if grid.geometry != self.geometry || grid.cells.len() != self.geometry.len() {
                return Err(ConfigError::GridMismatch {
                    modality,
                    width: grid.width(),
                    height: grid.height(),
                    resolution: grid.resolution(),
                    expected_width: self.geometry.width(),
                    expected_height: self.geometry.height(),
                    expected_resolution: self.geometry.resolution,
                });
            }
        }
        Ok(())
    }

    /// Fuse `grids` cell by cell. With no grids every cell is `unknown`.
    pub fn fuse(&self, grids: &ModalityMap<&OccupancyGrid>) -> Result<OccupancyGrid, ConfigError> {
        self.check(grids)?;
        if grids.is_empty() {
            return Ok(OccupancyGrid::filled(self.geometry, self.unknown));
        }

        let inputs: Vec<(Modality, &[f64])> =
            grids.iter().map(|(m, g)| (m, g.cells.as_slice())).collect();
        let cells = (0..self.geometry.len())
            .into_par_iter()
            .map_init(
                || Vec::with_capacity(inputs.len()),
                |values, idx| {
                    values.clear();
                    values.extend(inputs.iter().map(|&(m, c)| (m, c[idx])));
                    self.strategy.combine(values, self.unknown)
                },
            )
            .collect();

        Ok(OccupancyGrid {
            geometry: self.geometry,
            cells,
        })
    }
}
