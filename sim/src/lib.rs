//! `sim` — Scenario simulator: human trajectories, robot motion, detector
//! payloads, replay and offline evaluation.

pub mod detector_sim;
pub mod human;
pub mod replay;
pub mod robot;
pub mod runner;
pub mod scenarios;

pub use detector_sim::{DetectorParams, DetectorSimulator, SimDetector};
pub use human::{Human, MotionSpec};
pub use replay::{load_replay, save_replay, ReplayFrame, ReplayLog};
pub use robot::{Robot, RobotPath};
pub use runner::{evaluate, simulate, RunSummary, MATCH_RADIUS};
pub use scenarios::{Scenario, ScenarioKind};
