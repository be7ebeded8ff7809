//! Detection metrics: position RMSE and precision/recall of the extracted
//! candidates against ground-truth human positions.

use crate::types::CartesianPose;
use serde::{Deserialize, Serialize};

/// Ground-truth position of one human at a given time, base frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// Human ID (from simulator)
    pub human_id: u64,
    pub time: f64,
    pub position: CartesianPose,
}

/// Accumulated metric statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetrics {
    /// Number of ticks evaluated
    pub n_frames: u64,
    /// Candidates matched to a human
    pub true_positives: u64,
    /// Candidates with no human within the matching radius
    pub false_positives: u64,
    /// Humans with no candidate within the matching radius
    pub false_negatives: u64,
    /// Sum of squared position errors over matches (for RMSE)
    pub sum_sq_pos_err: f64,
    /// Ticks whose global maximum lies within the radius of some human
    pub highest_hits: u64,
}

impl DetectionMetrics {
    /// Root-mean-square position error of matched candidates (meters).
    pub fn rmse_position(&self) -> f64 {
        if self.true_positives == 0 {
            return 0.0;
        }
        (self.sum_sq_pos_err / self.true_positives as f64).sqrt()
    }

    /// Precision = TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        let denom = (self.true_positives + self.false_positives) as f64;
        if denom == 0.0 {
            1.0
        } else {
            self.true_positives as f64 / denom
        }
    }

    /// Recall = TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        let denom = (self.true_positives + self.false_negatives) as f64;
        if denom == 0.0 {
            1.0
        } else {
            self.true_positives as f64 / denom
        }
    }

    /// Accumulate one tick.
    ///
    /// Candidate/human pairs are matched greedily, closest first, each side
    /// used at most once and only within `radius` meters.
    pub fn accumulate(
        &mut self,
        candidates: &[CartesianPose],
        highest: Option<CartesianPose>,
        ground_truths: &[GroundTruth],
        radius: f64,
    ) {
        self.n_frames += 1;

        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (ci, c) in candidates.iter().enumerate() {
            for (gi, g) in ground_truths.iter().enumerate() {
                let d = c.distance(&g.position);
                if d <= radius {
                    pairs.push((d, ci, gi));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut candidate_used = vec![false; candidates.len()];
        let mut human_used = vec![false; ground_truths.len()];
        for (d, ci, gi) in pairs {
            if candidate_used[ci] || human_used[gi] {
                continue;
            }
            candidate_used[ci] = true;
            human_used[gi] = true;
            self.true_positives += 1;
            self.sum_sq_pos_err += d * d;
        }

        self.false_positives += candidate_used.iter().filter(|u| !**u).count() as u64;
        self.false_negatives += human_used.iter().filter(|u| !**u).count() as u64;

        if let Some(h) = highest {
            if ground_truths.iter().any(|g| h.distance(&g.position) <= radius) {
                self.highest_hits += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn truth(id: u64, x: f64, y: f64) -> GroundTruth {
        GroundTruth {
            human_id: id,
            time: 0.0,
            position: CartesianPose::new(x, y),
        }
    }

    #[test]
    fn greedy_matching_counts() {
        let mut m = DetectionMetrics::default();
        let candidates = [
            CartesianPose::new(3.0, 0.3),
            CartesianPose::new(-2.0, 4.0),
            CartesianPose::new(3.2, 0.0),
        ];
        let truths = [truth(1, 3.0, 0.0), truth(2, 8.0, 8.0)];
        m.accumulate(&candidates, Some(candidates[0]), &truths, 0.5);

        assert_eq!(m.true_positives, 1);
        assert_eq!(m.false_positives, 2);
        assert_eq!(m.false_negatives, 1);
        assert_eq!(m.highest_hits, 1);
        // Closest candidate wins the match
        assert_abs_diff_eq!(m.rmse_position(), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(m.precision(), 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.recall(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn empty_frames_are_perfect() {
        let mut m = DetectionMetrics::default();
        m.accumulate(&[], None, &[], 0.5);
        assert_eq!(m.n_frames, 1);
        assert_eq!(m.precision(), 1.0);
        assert_eq!(m.recall(), 1.0);
        assert_eq!(m.rmse_position(), 0.0);
    }
}
