//! Human-candidate extraction from the fused grid.

use crate::{error::ConfigError, grid::OccupancyGrid, types::CartesianPose};
use serde::{Deserialize, Serialize};

const NEIGHBOURS_4: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const NEIGHBOURS_8: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Which cells count as neighbours. Serialized as the plain number 4 or 8.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

impl Connectivity {
    fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &NEIGHBOURS_4,
            Connectivity::Eight => &NEIGHBOURS_8,
        }
    }
}

impl TryFrom<u8> for Connectivity {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(Connectivity::Four),
            8 => Ok(Connectivity::Eight),
            other => Err(ConfigError::InvalidConnectivity(other)),
        }
    }
}

impl From<Connectivity> for u8 {
    fn from(c: Connectivity) -> u8 {
        match c {
            Connectivity::Four => 4,
            Connectivity::Eight => 8,
        }
    }
}

/// A local maximum with its probability.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub position: CartesianPose,
    pub probability: f64,
}

/// Everything extracted from one fused grid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Maxima {
    /// Local maxima, highest probability first
    pub local_maxima: Vec<Candidate>,
    /// Centre of the global maximum; `None` when every cell is 0
    pub highest: Option<CartesianPose>,
}

/// Find every positive cell that beats all its in-bounds neighbours and is
/// at least `min_probability`.
///
/// A cell must be strictly greater than neighbours that come before it in
/// row-major order and at least equal to those after it, so a run of equal
/// cells yields only its first cell. Results are sorted by probability,
/// descending; equal probabilities keep row-major order. The global
/// maximum resolves ties the same way.
pub fn extract(grid: &OccupancyGrid, connectivity: Connectivity, min_probability: f64) -> Maxima {
    let geometry = grid.geometry;
    let size = geometry.size as isize;

    let mut local_maxima = Vec::new();
    let mut best: Option<(usize, f64)> = None;

    for (idx, &value) in grid.cells.iter().enumerate() {
        if value > 0.0 && best.map_or(true, |(_, b)| value > b) {
            best = Some((idx, value));
        }
        if value <= 0.0 || value < min_probability {
            continue;
        }
        let (row, col) = geometry.row_col(idx);
        let is_peak = connectivity.offsets().iter().all(|&(dr, dc)| {
            let r = row as isize + dr;
            let c = col as isize + dc;
            if r < 0 || c < 0 || r >= size || c >= size {
                return true;
            }
            let other = grid.get(r as usize, c as usize);
            if (dr, dc) < (0, 0) {
                value > other
            } else {
                value >= other
            }
        });
        if is_peak {
            local_maxima.push(Candidate {
                position: geometry.index_center(idx),
                probability: value,
            });
        }
    }

    local_maxima.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    Maxima {
        local_maxima,
        highest: best.map(|(idx, _)| geometry.index_center(idx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridGeometry;

    fn grid() -> OccupancyGrid {
        // 8x8 raster, 0.5 m cells, origin at (-2, -2)
        OccupancyGrid::filled(GridGeometry::new(2.0, 0.5).unwrap(), 0.1)
    }

    #[test]
    fn single_peak_is_the_only_maximum() {
        let mut g = grid();
        g.set(4, 2, 0.9);
        let m = extract(&g, Connectivity::Eight, 0.5);
        assert_eq!(m.local_maxima.len(), 1);
        assert_eq!(Some(m.local_maxima[0].position), m.highest);
    }

    #[test]
    fn two_separated_peaks_sorted_descending() {
        let mut g = grid();
        g.set(1, 1, 0.7);
        g.set(5, 6, 0.9);
        let m = extract(&g, Connectivity::Eight, 0.5);
        assert_eq!(m.local_maxima.len(), 2);
        assert_eq!(m.local_maxima[0].probability, 0.9);
        assert_eq!(m.local_maxima[0].position, g.geometry.cell_center(5, 6));
        assert_eq!(m.local_maxima[1].position, g.geometry.cell_center(1, 1));
        assert_eq!(m.highest, Some(g.geometry.cell_center(5, 6)));
    }

    #[test]
    fn plateau_yields_its_first_cell() {
        let mut g = grid();
        g.set(3, 3, 0.8);
        g.set(3, 4, 0.8);
        g.set(4, 3, 0.8);
        let m = extract(&g, Connectivity::Eight, 0.5);
        assert_eq!(m.local_maxima.len(), 1);
        assert_eq!(m.local_maxima[0].position, g.geometry.cell_center(3, 3));
        assert_eq!(m.highest, Some(g.geometry.cell_center(3, 3)));
    }

    #[test]
    fn plateau_below_a_higher_cell_is_not_a_maximum() {
        let mut g = grid();
        g.set(3, 3, 0.8);
        g.set(3, 4, 0.8);
        g.set(3, 5, 0.9);
        let m = extract(&g, Connectivity::Eight, 0.5);
        assert_eq!(m.local_maxima.len(), 1);
        assert_eq!(m.local_maxima[0].position, g.geometry.cell_center(3, 5));
    }

    #[test]
    fn connectivity_reads_as_a_number() {
        let c: Connectivity = serde_json::from_str("4").unwrap();
        assert_eq!(c, Connectivity::Four);
        assert_eq!(serde_json::to_string(&Connectivity::Eight).unwrap(), "8");
        assert!(serde_json::from_str::<Connectivity>("6").is_err());
        assert_eq!(
            Connectivity::try_from(6),
            Err(ConfigError::InvalidConnectivity(6))
        );
    }

    #[test]
    fn connectivity_changes_diagonal_handling() {
        let mut g = grid();
        g.set(3, 3, 0.8);
        g.set(4, 4, 0.9);
        let four = extract(&g, Connectivity::Four, 0.5);
        assert_eq!(four.local_maxima.len(), 2);
        let eight = extract(&g, Connectivity::Eight, 0.5);
        assert_eq!(eight.local_maxima.len(), 1);
        assert_eq!(eight.local_maxima[0].probability, 0.9);
    }

    #[test]
    fn threshold_and_border_cells() {
        let mut g = grid();
        g.set(0, 0, 0.6);
        g.set(7, 7, 0.4);
        let m = extract(&g, Connectivity::Eight, 0.5);
        assert_eq!(m.local_maxima.len(), 1);
        assert_eq!(m.local_maxima[0].position, g.geometry.cell_center(0, 0));
    }

    #[test]
    fn all_zero_grid_has_no_highest_point() {
        let g = OccupancyGrid::filled(GridGeometry::new(2.0, 0.5).unwrap(), 0.0);
        let m = extract(&g, Connectivity::Eight, 0.0);
        assert_eq!(m.highest, None);
        assert!(m.local_maxima.is_empty());
    }

    #[test]
    fn every_maximum_beats_its_neighbours() {
        let mut g = grid();
        for (i, v) in g.cells.iter_mut().enumerate() {
            *v = ((i * 37) % 11) as f64 / 10.0;
        }
        let m = extract(&g, Connectivity::Eight, 0.0);
        for c in &m.local_maxima {
            let (row, col) = g.geometry.cell_of(c.position).unwrap();
            for dr in -1..=1isize {
                for dc in -1..=1isize {
                    let (r, cc) = (row as isize + dr, col as isize + dc);
                    if (dr, dc) == (0, 0) || r < 0 || cc < 0 || r >= 8 || cc >= 8 {
                        continue;
                    }
                    let other = g.get(r as usize, cc as usize);
                    if (dr, dc) < (0, 0) {
                        assert!(c.probability > other);
                    } else {
                        assert!(c.probability >= other);
                    }
                }
            }
        }
        assert!(m
            .local_maxima
            .windows(2)
            .all(|w| w[0].probability >= w[1].probability));
    }
}
