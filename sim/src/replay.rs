//! Replay: serialize/deserialize simulation logs for offline evaluation.

use fusion_core::{metrics::GroundTruth, OdometryReading};
use sensor_models::RawPayload;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A full recorded simulation log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub sim_dt: f64,
    pub duration: f64,
    /// One frame per fusion tick, in chronological order
    pub frames: Vec<ReplayFrame>,
}

/// Everything the fusion node receives during one loop period, plus the
/// ground truth at the tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub time: f64,
    pub odometry: OdometryReading,
    pub payloads: Vec<RawPayload>,
    /// Base-frame positions of the humans present at `time`
    pub ground_truth: Vec<GroundTruth>,
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)?;
    Ok(log)
}
