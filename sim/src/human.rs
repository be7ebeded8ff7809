//! Scripted human trajectories in the world frame.

use serde::{Deserialize, Serialize};

/// How a human moves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MotionSpec {
    /// Standing still.
    Stationary,
    /// Walking at a constant velocity.
    ConstantVelocity { vx: f64, vy: f64 },
    /// Walk towards each `(t, x, y)` waypoint in turn at `speed`, starting
    /// once its time is reached and stopping on arrival.
    Waypoints { waypoints: Vec<[f64; 3]>, speed: f64 },
}

/// A simulated human with ground-truth position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Human {
    /// Unique human ID (used for metrics)
    pub id: u64,
    /// World position (meters)
    pub position: [f64; 2],
    pub motion: MotionSpec,
    /// Optional: human enters the scene at this time
    pub appear_at: Option<f64>,
    /// Optional: human leaves the scene at this time
    pub disappear_at: Option<f64>,
}

impl Human {
    pub fn new(id: u64, x: f64, y: f64, motion: MotionSpec) -> Self {
        Self {
            id,
            position: [x, y],
            motion,
            appear_at: None,
            disappear_at: None,
        }
    }

    pub fn between(mut self, appear_at: Option<f64>, disappear_at: Option<f64>) -> Self {
        self.appear_at = appear_at;
        self.disappear_at = disappear_at;
        self
    }

    /// Advance the position by `dt` seconds from time `t`.
    pub fn step(&mut self, t: f64, dt: f64) {
        let p = &mut self.position;
        match &self.motion {
            MotionSpec::Stationary => {}
            MotionSpec::ConstantVelocity { vx, vy } => {
                p[0] += vx * dt;
                p[1] += vy * dt;
            }
            MotionSpec::Waypoints { waypoints, speed } => {
                // Latest waypoint whose start time has passed
                if let Some(wp) = waypoints.iter().filter(|wp| wp[0] <= t).last() {
                    let dx = wp[1] - p[0];
                    let dy = wp[2] - p[1];
                    let dist = dx.hypot(dy);
                    let travel = speed * dt;
                    if dist <= travel {
                        p[0] = wp[1];
                        p[1] = wp[2];
                    } else {
                        p[0] += travel * dx / dist;
                        p[1] += travel * dy / dist;
                    }
                }
            }
        }
    }

    /// True if the human is in the scene at time `t`.
    pub fn is_active(&self, t: f64) -> bool {
        if let Some(appear) = self.appear_at {
            if t < appear {
                return false;
            }
        }
        if let Some(disappear) = self.disappear_at {
            if t >= disappear {
                return false;
            }
        }
        true
    }
}
